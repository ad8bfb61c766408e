//! Service-level coverage over the in-memory adapters: consent-driven
//! scheduling, response submission, backdated queries, and the audited
//! mutations.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use super::*;
use crate::domain::audit::AuditContext;
use crate::domain::identity::User;
use crate::domain::organization::Organization;
use crate::domain::ports::{FixedClock, TimelineRepository};
use crate::domain::protocol::{OrgProtocolRow, ProtocolId};
use crate::domain::questionnaire::{
    Classification, QbQuestionnaire, Questionnaire, QuestionnaireBankId, RelativeDelta,
};
use crate::domain::response::{QnrBankRef, QnrStatus};
use crate::domain::timeline::TimelineState;
use crate::domain::ErrorCode;
use crate::outbound::cache::TtlTimelineCache;
use crate::outbound::memory::MemoryStore;

const PATIENT: UserId = UserId::new(1);
const STAFF: UserId = UserId::new(9);
const ORG: OrganizationId = OrganizationId::new(10);
const STUDY: StudyId = StudyId::new(0);

fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

struct Harness {
    store: Arc<MemoryStore>,
    clock: Arc<FixedClock>,
    service: AssessmentService,
}

fn harness(now: DateTime<Utc>) -> Harness {
    let store = MemoryStore::new();
    let clock = Arc::new(FixedClock::at(now));
    let cache = Arc::new(TtlTimelineCache::new(Arc::clone(&clock) as Arc<dyn Clock>));
    let service = AssessmentService::new(AssessmentDeps {
        users: Arc::clone(&store) as Arc<dyn UserRepository>,
        consents: Arc::clone(&store) as Arc<dyn ConsentRepository>,
        clinical: Arc::clone(&store) as Arc<dyn ClinicalRepository>,
        catalog: Arc::clone(&store) as Arc<dyn CatalogRepository>,
        questionnaires: Arc::clone(&store) as Arc<dyn QuestionnaireRepository>,
        responses: Arc::clone(&store) as Arc<dyn ResponseRepository>,
        timelines: Arc::clone(&store) as Arc<dyn TimelineRepository>,
        cache,
        audit: Arc::clone(&store) as Arc<dyn AuditLog>,
        clock: Arc::clone(&clock) as Arc<dyn Clock>,
    });
    Harness {
        store,
        clock,
        service,
    }
}

fn baseline_bank(start: RelativeDelta) -> QuestionnaireBank {
    QuestionnaireBank {
        id: QuestionnaireBankId::new(0),
        name: "crv-baseline".to_owned(),
        classification: Classification::Baseline,
        research_protocol_id: Some(ProtocolId::new(1)),
        intervention_id: None,
        start,
        due: RelativeDelta::days(7),
        overdue: RelativeDelta::days(30),
        expired: RelativeDelta::days(90),
        recurs: Vec::new(),
        questionnaires: vec![
            QbQuestionnaire {
                rank: 0,
                questionnaire_name: "epic26".to_owned(),
            },
            QbQuestionnaire {
                rank: 1,
                questionnaire_name: "eproms_add".to_owned(),
            },
        ],
    }
}

async fn seed_study(h: &Harness, bank: QuestionnaireBank) {
    let mut patient = User::with_id(PATIENT);
    patient.email = Some("patient@example.com".to_owned());
    h.store.seed_user(patient, vec![ORG]);
    h.store
        .save_organization(Organization {
            id: ORG,
            name: "truenth-clinic".to_owned(),
            parent_id: None,
            email: None,
            default_locale: None,
            inherit_codings: false,
        })
        .await
        .expect("seed organization");
    h.store
        .save_protocol_row(OrgProtocolRow {
            organization_id: ORG,
            protocol_id: ProtocolId::new(1),
            retired_as_of: None,
        })
        .await
        .expect("seed protocol row");
    for name in ["epic26", "eproms_add"] {
        h.store.seed_questionnaire(Questionnaire {
            id: 0,
            name: name.to_owned(),
            identifiers: Vec::new(),
        });
    }
    h.store.register_bank(bank).await.expect("seed bank");
}

async fn accept(h: &Harness, when: DateTime<Utc>) {
    h.service
        .accept_consent(
            STAFF,
            PATIENT,
            ORG,
            STUDY,
            when,
            ConsentOptions::standard(),
            "https://portal.example/agreements/v3".to_owned(),
        )
        .await
        .expect("accept consent");
}

fn qnr(instrument: &str, status: QnrStatus, authored: DateTime<Utc>) -> QuestionnaireResponse {
    QuestionnaireResponse {
        id: 0,
        user_id: PATIENT,
        bank_ref: QnrBankRef {
            bank_name: "crv-baseline".to_owned(),
            iteration: 0,
            protocol_id: Some(ProtocolId::new(1)),
        },
        questionnaire_name: instrument.to_owned(),
        authored,
        status,
        document: serde_json::json!({}),
    }
}

#[tokio::test]
async fn consent_acceptance_schedules_and_audits() {
    let consented = at(2025, 1, 1);
    let h = harness(consented);
    seed_study(&h, baseline_bank(RelativeDelta::default())).await;
    accept(&h, consented).await;

    let report = h
        .service
        .assessment_status(PATIENT, STUDY, consented)
        .await
        .expect("status");
    assert_eq!(report.overall_status, crate::domain::assessment::OverallStatus::Due);
    assert_eq!(report.qb_name, "crv-baseline");
    assert_eq!(report.due, consented + Duration::days(7));

    let rows = h.store.rows(PATIENT, STUDY).await.expect("persisted rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].state, TimelineState::Due);

    let audits = h.store.for_subject(PATIENT).await.expect("audits");
    assert!(audits.iter().any(|a| a.context == AuditContext::Consent));
}

#[tokio::test]
async fn responses_move_status_through_in_progress_to_completed() {
    let consented = at(2025, 1, 1);
    let h = harness(consented);
    seed_study(&h, baseline_bank(RelativeDelta::default())).await;
    accept(&h, consented).await;

    h.clock.set(consented + Duration::days(3));
    h.service
        .submit_response(PATIENT, STUDY, qnr("epic26", QnrStatus::InProgress, consented + Duration::days(3)))
        .await
        .expect("in-progress response");
    let report = h
        .service
        .assessment_status(PATIENT, STUDY, consented + Duration::days(3))
        .await
        .expect("status");
    assert_eq!(
        report.overall_status,
        crate::domain::assessment::OverallStatus::InProgress
    );
    assert_eq!(report.instruments_in_progress, vec!["epic26".to_owned()]);

    h.clock.set(consented + Duration::days(5));
    h.service
        .submit_response(PATIENT, STUDY, qnr("epic26", QnrStatus::Completed, consented + Duration::days(4)))
        .await
        .expect("first completion");
    h.service
        .submit_response(PATIENT, STUDY, qnr("eproms_add", QnrStatus::Completed, consented + Duration::days(5)))
        .await
        .expect("second completion");

    let report = h
        .service
        .assessment_status(PATIENT, STUDY, consented + Duration::days(5))
        .await
        .expect("status");
    assert_eq!(
        report.overall_status,
        crate::domain::assessment::OverallStatus::Completed
    );
    assert_eq!(report.completed_date, Some(consented + Duration::days(5)));

    let rows = h.store.rows(PATIENT, STUDY).await.expect("persisted rows");
    assert_eq!(rows[0].state, TimelineState::Completed);
}

/// Backdated queries recompute against the requested instant and never
/// rewrite the persisted rows.
#[tokio::test]
async fn backdated_queries_leave_persisted_rows_alone() {
    let consented = at(2025, 1, 1);
    let h = harness(consented);
    seed_study(&h, baseline_bank(RelativeDelta::default())).await;
    accept(&h, consented).await;

    h.clock.set(consented + Duration::days(100));
    h.service
        .refresh_timeline(PATIENT, STUDY)
        .await
        .expect("refresh");
    let persisted = h.store.rows(PATIENT, STUDY).await.expect("rows");
    assert_eq!(persisted[0].state, TimelineState::Expired);

    let report = h
        .service
        .assessment_status(PATIENT, STUDY, consented + Duration::days(1))
        .await
        .expect("backdated status");
    assert_eq!(report.overall_status, crate::domain::assessment::OverallStatus::Due);

    let after = h.store.rows(PATIENT, STUDY).await.expect("rows");
    assert_eq!(after, persisted);
}

#[tokio::test]
async fn replacement_consent_deactivates_the_predecessor() {
    let first = at(2025, 1, 1);
    let h = harness(first);
    seed_study(&h, baseline_bank(RelativeDelta::default())).await;
    accept(&h, first).await;

    h.clock.set(first + Duration::days(5));
    accept(&h, first + Duration::days(5)).await;

    let latest = h
        .store
        .latest_for_study(PATIENT, STUDY)
        .await
        .expect("lookup")
        .expect("latest consent");
    assert!(latest.is_active());
    assert_eq!(latest.acceptance_date, first + Duration::days(5));

    let all = h.store.consents_for(PATIENT).await.expect("all consents");
    assert_eq!(all.len(), 2);
    let old = all
        .iter()
        .find(|c| c.acceptance_date == first)
        .expect("old row kept");
    assert_eq!(old.status, crate::domain::consent::ConsentStatus::Deleted);
    assert_eq!(old.deleted_by, Some(STAFF));
}

#[tokio::test]
async fn withdrawal_before_a_window_opens_reports_withdrawn() {
    let consented = at(2025, 1, 1);
    let h = harness(consented);
    // Window opens 30 days after the trigger.
    seed_study(&h, baseline_bank(RelativeDelta::days(30))).await;
    accept(&h, consented).await;

    h.clock.set(consented + Duration::days(1));
    h.service
        .withdraw_consent(STAFF, PATIENT, STUDY)
        .await
        .expect("withdraw");

    let report = h
        .service
        .assessment_status(PATIENT, STUDY, consented + Duration::days(31))
        .await
        .expect("status");
    assert_eq!(
        report.overall_status,
        crate::domain::assessment::OverallStatus::Withdrawn
    );

    // Withdrawing twice is a conflict: no active consent remains.
    let err = h
        .service
        .withdraw_consent(STAFF, PATIENT, STUDY)
        .await
        .expect_err("second withdrawal refused");
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[tokio::test]
async fn unknown_questionnaire_and_unknown_user_are_not_found() {
    let consented = at(2025, 1, 1);
    let h = harness(consented);
    seed_study(&h, baseline_bank(RelativeDelta::default())).await;
    accept(&h, consented).await;

    let mut unknown = qnr("epic26", QnrStatus::Completed, consented);
    unknown.questionnaire_name = "unregistered".to_owned();
    let err = h
        .service
        .submit_response(PATIENT, STUDY, unknown)
        .await
        .expect_err("unregistered instrument refused");
    assert_eq!(err.code(), ErrorCode::NotFound);

    let err = h
        .service
        .assessment_status(UserId::new(99), STUDY, consented)
        .await
        .expect_err("missing user refused");
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[tokio::test]
async fn timeline_reads_are_served_from_the_cache() {
    let consented = at(2025, 1, 1);
    let h = harness(consented);
    seed_study(&h, baseline_bank(RelativeDelta::default())).await;
    accept(&h, consented).await;

    let cached = h
        .service
        .timeline_rows(PATIENT, STUDY)
        .await
        .expect("first read");
    assert_eq!(cached.len(), 1);

    // Clobber the persisted rows behind the cache's back: the read keeps
    // returning the cached rows until something invalidates.
    h.store
        .replace(PATIENT, STUDY, Vec::new())
        .await
        .expect("clobber");
    let still_cached = h
        .service
        .timeline_rows(PATIENT, STUDY)
        .await
        .expect("second read");
    assert_eq!(still_cached, cached);

    // A response submission invalidates and rebuilds.
    h.service
        .submit_response(PATIENT, STUDY, qnr("epic26", QnrStatus::Completed, consented))
        .await
        .expect("submit");
    let rebuilt = h
        .service
        .timeline_rows(PATIENT, STUDY)
        .await
        .expect("third read");
    assert_eq!(rebuilt, h.store.rows(PATIENT, STUDY).await.expect("rows"));
}

#[tokio::test]
async fn clearing_the_deceased_flag_is_audited_and_explicit() {
    let now = at(2025, 1, 1);
    let h = harness(now);
    let mut patient = User::with_id(PATIENT);
    patient.deceased = true;
    h.store.seed_user(patient, vec![ORG]);

    h.service
        .clear_deceased(STAFF, PATIENT)
        .await
        .expect("clear flag");
    let audits = h.store.for_subject(PATIENT).await.expect("audits");
    assert!(audits
        .iter()
        .any(|a| a.context == AuditContext::User
            && a.comment.as_deref() == Some("deceased flag cleared")));

    let err = h
        .service
        .clear_deceased(STAFF, PATIENT)
        .await
        .expect_err("already cleared");
    assert_eq!(err.code(), ErrorCode::Conflict);
}
