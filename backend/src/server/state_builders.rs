//! Construction of port bundles and domain services for the server.
//!
//! Ports come in two flavours: Diesel adapters over a shared pool when
//! `DATABASE_URL` is configured, and the in-memory store otherwise. The
//! service wiring on top is identical either way.

use std::sync::Arc;

use actix_web::web;

use crate::domain::assessment_service::{AssessmentDeps, AssessmentService};
use crate::domain::broker::{BrokerDeps, OAuthBroker};
use crate::domain::ports::{
    AuditLog, CatalogRepository, ClinicalRepository, Clock, CommunicationRepository,
    ConsentRepository, InterventionRepository, Mailer, MessageTemplates, OAuthStore,
    QuestionnaireRepository, ResponseRepository, TaskQueue, TimelineRepository, UserRepository,
};
use crate::domain::scheduler::{CommunicationScheduler, SchedulerDeps};
use crate::inbound::http::state::HttpState;
use crate::outbound::cache::TtlTimelineCache;
use crate::outbound::mail::{BuiltinTemplates, LogMailer};
use crate::outbound::memory::MemoryStore;
use crate::outbound::persistence::{
    DbPool, DieselAuditLog, DieselCatalogRepository, DieselClinicalRepository,
    DieselCommunicationRepository, DieselConsentRepository, DieselInterventionRepository,
    DieselOAuthStore, DieselQuestionnaireRepository, DieselResponseRepository, DieselTaskQueue,
    DieselTimelineRepository, DieselUserRepository,
};
use crate::outbound::queue::{HttpCallbackTransport, TaskWorker, WorkerDeps};

/// One handle per port, regardless of backing store.
pub(crate) struct Ports {
    pub users: Arc<dyn UserRepository>,
    pub consents: Arc<dyn ConsentRepository>,
    pub clinical: Arc<dyn ClinicalRepository>,
    pub catalog: Arc<dyn CatalogRepository>,
    pub questionnaires: Arc<dyn QuestionnaireRepository>,
    pub responses: Arc<dyn ResponseRepository>,
    pub timelines: Arc<dyn TimelineRepository>,
    pub communications: Arc<dyn CommunicationRepository>,
    pub oauth: Arc<dyn OAuthStore>,
    pub interventions: Arc<dyn InterventionRepository>,
    pub audit: Arc<dyn AuditLog>,
    pub tasks: Arc<dyn TaskQueue>,
}

impl Ports {
    /// Diesel adapters sharing one connection pool.
    pub(crate) fn from_pool(pool: &DbPool) -> Self {
        Self {
            users: Arc::new(DieselUserRepository::new(pool.clone())),
            consents: Arc::new(DieselConsentRepository::new(pool.clone())),
            clinical: Arc::new(DieselClinicalRepository::new(pool.clone())),
            catalog: Arc::new(DieselCatalogRepository::new(pool.clone())),
            questionnaires: Arc::new(DieselQuestionnaireRepository::new(pool.clone())),
            responses: Arc::new(DieselResponseRepository::new(pool.clone())),
            timelines: Arc::new(DieselTimelineRepository::new(pool.clone())),
            communications: Arc::new(DieselCommunicationRepository::new(pool.clone())),
            oauth: Arc::new(DieselOAuthStore::new(pool.clone())),
            interventions: Arc::new(DieselInterventionRepository::new(pool.clone())),
            audit: Arc::new(DieselAuditLog::new(pool.clone())),
            tasks: Arc::new(DieselTaskQueue::new(pool.clone())),
        }
    }

    /// Every port backed by one in-memory store. Development only; nothing
    /// survives a restart.
    pub(crate) fn in_memory() -> Self {
        let store = MemoryStore::new();
        Self {
            users: Arc::clone(&store) as _,
            consents: Arc::clone(&store) as _,
            clinical: Arc::clone(&store) as _,
            catalog: Arc::clone(&store) as _,
            questionnaires: Arc::clone(&store) as _,
            responses: Arc::clone(&store) as _,
            timelines: Arc::clone(&store) as _,
            communications: Arc::clone(&store) as _,
            oauth: Arc::clone(&store) as _,
            interventions: Arc::clone(&store) as _,
            audit: Arc::clone(&store) as _,
            tasks: Arc::clone(&store) as _,
        }
    }
}

/// Services the server runs: handler state plus the background worker.
pub(crate) struct AppServices {
    pub http_state: web::Data<HttpState>,
    pub worker: TaskWorker,
}

/// Wire the domain services over a port bundle.
///
/// # Errors
/// Returns [`std::io::Error`] when the callback HTTP client cannot be built.
pub(crate) fn build_services(
    ports: Ports,
    clock: Arc<dyn Clock>,
    trusted_origins: Vec<String>,
) -> std::io::Result<AppServices> {
    let cache = Arc::new(TtlTimelineCache::new(Arc::clone(&clock)));
    let templates: Arc<dyn MessageTemplates> = Arc::new(BuiltinTemplates::new());
    let mailer: Arc<dyn Mailer> = Arc::new(LogMailer);

    let assessments = Arc::new(AssessmentService::new(AssessmentDeps {
        users: Arc::clone(&ports.users),
        consents: Arc::clone(&ports.consents),
        clinical: Arc::clone(&ports.clinical),
        catalog: Arc::clone(&ports.catalog),
        questionnaires: Arc::clone(&ports.questionnaires),
        responses: Arc::clone(&ports.responses),
        timelines: Arc::clone(&ports.timelines),
        cache,
        audit: Arc::clone(&ports.audit),
        clock: Arc::clone(&clock),
    }));

    let scheduler = Arc::new(CommunicationScheduler::new(SchedulerDeps {
        assessments: Arc::clone(&assessments),
        communications: Arc::clone(&ports.communications),
        timelines: Arc::clone(&ports.timelines),
        users: Arc::clone(&ports.users),
        consents: Arc::clone(&ports.consents),
        catalog: Arc::clone(&ports.catalog),
        templates,
        mailer,
        audit: Arc::clone(&ports.audit),
        clock: Arc::clone(&clock),
    }));

    let broker = Arc::new(OAuthBroker::new(BrokerDeps {
        oauth: Arc::clone(&ports.oauth),
        users: Arc::clone(&ports.users),
        consents: Arc::clone(&ports.consents),
        interventions: Arc::clone(&ports.interventions),
        audit: Arc::clone(&ports.audit),
        tasks: Arc::clone(&ports.tasks),
        clock: Arc::clone(&clock),
        trusted_origins,
    }));

    let transport = Arc::new(
        HttpCallbackTransport::new()
            .map_err(|err| std::io::Error::other(format!("callback transport: {err}")))?,
    );
    let worker = TaskWorker::new(WorkerDeps {
        tasks: Arc::clone(&ports.tasks),
        oauth: Arc::clone(&ports.oauth),
        transport,
        scheduler,
        clock: Arc::clone(&clock),
    });

    let http_state = web::Data::new(HttpState {
        assessments,
        broker,
        questionnaires: Arc::clone(&ports.questionnaires),
        audit: Arc::clone(&ports.audit),
        clock,
    });

    Ok(AppServices { http_state, worker })
}
