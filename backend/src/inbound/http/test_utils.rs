//! Test helpers for inbound HTTP components.

use std::sync::Arc;

use actix_session::{storage::CookieSessionStore, SessionMiddleware};
use actix_web::cookie::Key;
use chrono::{DateTime, TimeZone, Utc};

use crate::domain::assessment_service::{AssessmentDeps, AssessmentService};
use crate::domain::broker::{BrokerDeps, OAuthBroker};
use crate::domain::ports::FixedClock;
use crate::outbound::cache::TtlTimelineCache;
use crate::outbound::memory::MemoryStore;

use super::state::HttpState;

/// Build a session middleware configured for tests.
///
/// - Generates a fresh signing/encryption key per invocation.
/// - Sets the cookie name to `session` and disables the `Secure` flag for
///   local HTTP tests.
pub fn test_session_middleware() -> SessionMiddleware<CookieSessionStore> {
    SessionMiddleware::builder(CookieSessionStore::default(), Key::generate())
        .cookie_name("session".to_owned())
        .cookie_secure(false)
        .build()
}

/// Handler-test fixture: state over an in-memory store and a fixed clock.
pub struct TestContext {
    pub state: HttpState,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<FixedClock>,
}

/// Fixed instant the handler tests start from.
pub fn test_epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0)
        .single()
        .expect("valid test epoch")
}

/// Build [`HttpState`] over a fresh [`MemoryStore`] and [`FixedClock`].
pub fn test_context() -> TestContext {
    let store = MemoryStore::new();
    let clock = Arc::new(FixedClock::at(test_epoch()));
    let cache = Arc::new(TtlTimelineCache::new(Arc::clone(&clock) as _));
    let assessments = Arc::new(AssessmentService::new(AssessmentDeps {
        users: Arc::clone(&store) as _,
        consents: Arc::clone(&store) as _,
        clinical: Arc::clone(&store) as _,
        catalog: Arc::clone(&store) as _,
        questionnaires: Arc::clone(&store) as _,
        responses: Arc::clone(&store) as _,
        timelines: Arc::clone(&store) as _,
        cache,
        audit: Arc::clone(&store) as _,
        clock: Arc::clone(&clock) as _,
    }));
    let broker = Arc::new(OAuthBroker::new(BrokerDeps {
        oauth: Arc::clone(&store) as _,
        users: Arc::clone(&store) as _,
        consents: Arc::clone(&store) as _,
        interventions: Arc::clone(&store) as _,
        audit: Arc::clone(&store) as _,
        tasks: Arc::clone(&store) as _,
        clock: Arc::clone(&clock) as _,
        trusted_origins: vec!["https://portal.example".to_owned()],
    }));
    let state = HttpState {
        assessments,
        broker,
        questionnaires: Arc::clone(&store) as _,
        audit: Arc::clone(&store) as _,
        clock: Arc::clone(&clock) as _,
    };
    TestContext {
        state,
        store,
        clock,
    }
}
