//! Assessment-status and questionnaire-response handlers.
//!
//! ```text
//! GET /api/patient/{id}/assessment-status   Status report at an instant
//! PUT /api/patient/{id}/assessment          Submit a questionnaire response
//! GET /api/patient/{id}/timeline            Materialised timeline rows
//! GET /api/user/{id}/questionnaire_bank     Governing bank descriptor only
//! ```
//!
//! A backdated `as_of` recomputes on the fly and never rewrites the
//! persisted timeline.

use actix_web::{get, put, web, HttpRequest, HttpResponse};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::consent::StudyId;
use crate::domain::identity::UserId;
use crate::domain::protocol::ProtocolId;
use crate::domain::response::{QnrBankRef, QnrStatus, QuestionnaireResponse};
use crate::inbound::http::auth::require_actor;
use crate::inbound::http::session::SessionContext;
use crate::inbound::http::state::HttpState;
use crate::inbound::http::ApiResult;

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct StatusQuery {
    /// Instant the report is computed at; defaults to now.
    pub as_of: Option<DateTime<Utc>>,
    /// Research study; defaults to the base study.
    pub study: Option<i64>,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct GoverningQuery {
    /// Calendar date the governing bank is resolved at; defaults to today.
    pub as_of_date: Option<NaiveDate>,
    pub study: Option<i64>,
}

/// Questionnaire response submission body.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct QnrSubmission {
    /// Instrument name, e.g. `epic26`.
    pub questionnaire_name: String,
    /// Owning bank reference.
    pub bank_name: String,
    pub iteration: u32,
    #[serde(default)]
    pub protocol_id: Option<i64>,
    pub authored: DateTime<Utc>,
    pub status: QnrStatus,
    /// Raw response document; stored verbatim.
    #[serde(default)]
    pub document: Value,
    #[serde(default)]
    pub study: Option<i64>,
}

fn study_or_base(study: Option<i64>) -> StudyId {
    StudyId::new(study.unwrap_or(0))
}

/// Assessment status report for one patient.
#[utoipa::path(
    get,
    path = "/api/patient/{id}/assessment-status",
    params(
        ("id" = i64, Path, description = "Patient user id"),
        StatusQuery
    ),
    responses(
        (status = 200, description = "Status report"),
        (status = 401, description = "Unauthorised", body = crate::domain::Error),
        (status = 404, description = "Unknown user or no scheduled bank", body = crate::domain::Error)
    ),
    tags = ["assessments"],
    operation_id = "assessmentStatus"
)]
#[get("/patient/{id}/assessment-status")]
pub async fn assessment_status(
    state: web::Data<HttpState>,
    session: SessionContext,
    req: HttpRequest,
    path: web::Path<i64>,
    query: web::Query<StatusQuery>,
) -> ApiResult<HttpResponse> {
    require_actor(&state, &session, &req, &[]).await?;
    let user = UserId::new(path.into_inner());
    let as_of = query.as_of.unwrap_or_else(|| state.clock.now());
    let report = state
        .assessments
        .assessment_status(user, study_or_base(query.study), as_of)
        .await?;
    Ok(HttpResponse::Ok().json(report))
}

/// Submit a questionnaire response for one patient.
#[utoipa::path(
    put,
    path = "/api/patient/{id}/assessment",
    request_body = QnrSubmission,
    params(("id" = i64, Path, description = "Patient user id")),
    responses(
        (status = 200, description = "Response persisted"),
        (status = 401, description = "Unauthorised", body = crate::domain::Error),
        (status = 404, description = "Unknown user or instrument", body = crate::domain::Error)
    ),
    tags = ["assessments"],
    operation_id = "submitAssessment"
)]
#[put("/patient/{id}/assessment")]
pub async fn submit_assessment(
    state: web::Data<HttpState>,
    session: SessionContext,
    req: HttpRequest,
    path: web::Path<i64>,
    payload: web::Json<QnrSubmission>,
) -> ApiResult<HttpResponse> {
    let actor = require_actor(&state, &session, &req, &[]).await?;
    let user = UserId::new(path.into_inner());
    let submission = payload.into_inner();
    let study = study_or_base(submission.study);
    let response = QuestionnaireResponse {
        id: 0,
        user_id: user,
        bank_ref: QnrBankRef {
            bank_name: submission.bank_name,
            iteration: submission.iteration,
            protocol_id: submission.protocol_id.map(ProtocolId::new),
        },
        questionnaire_name: submission.questionnaire_name,
        authored: submission.authored,
        status: submission.status,
        document: submission.document,
    };
    let saved = state
        .assessments
        .submit_response(actor, study, response)
        .await?;
    Ok(HttpResponse::Ok().json(saved))
}

/// Materialised timeline rows for one patient.
#[utoipa::path(
    get,
    path = "/api/patient/{id}/timeline",
    params(
        ("id" = i64, Path, description = "Patient user id"),
        ("study" = Option<i64>, Query, description = "Research study")
    ),
    responses(
        (status = 200, description = "Timeline rows"),
        (status = 401, description = "Unauthorised", body = crate::domain::Error),
        (status = 404, description = "Unknown user", body = crate::domain::Error)
    ),
    tags = ["assessments"],
    operation_id = "patientTimeline"
)]
#[get("/patient/{id}/timeline")]
pub async fn patient_timeline(
    state: web::Data<HttpState>,
    session: SessionContext,
    req: HttpRequest,
    path: web::Path<i64>,
    query: web::Query<StatusQuery>,
) -> ApiResult<HttpResponse> {
    require_actor(&state, &session, &req, &[]).await?;
    let user = UserId::new(path.into_inner());
    let rows = state
        .assessments
        .timeline_rows(user, study_or_base(query.study))
        .await?;
    Ok(HttpResponse::Ok().json(rows))
}

/// Governing questionnaire-bank descriptor for one user.
#[utoipa::path(
    get,
    path = "/api/user/{id}/questionnaire_bank",
    params(
        ("id" = i64, Path, description = "User id"),
        GoverningQuery
    ),
    responses(
        (status = 200, description = "Governing descriptor"),
        (status = 401, description = "Unauthorised", body = crate::domain::Error),
        (status = 404, description = "No scheduled bank at the requested date", body = crate::domain::Error)
    ),
    tags = ["assessments"],
    operation_id = "governingQuestionnaireBank"
)]
#[get("/user/{id}/questionnaire_bank")]
pub async fn governing_questionnaire_bank(
    state: web::Data<HttpState>,
    session: SessionContext,
    req: HttpRequest,
    path: web::Path<i64>,
    query: web::Query<GoverningQuery>,
) -> ApiResult<HttpResponse> {
    require_actor(&state, &session, &req, &[]).await?;
    let user = UserId::new(path.into_inner());
    let as_of = match query.as_of_date {
        Some(date) => date
            .and_hms_opt(0, 0, 0)
            .map(|naive| naive.and_utc())
            .ok_or_else(|| crate::domain::Error::invalid_request("invalid as_of_date"))?,
        None => state.clock.now(),
    };
    let row = state
        .assessments
        .governing_row(user, study_or_base(query.study), as_of)
        .await?;
    Ok(HttpResponse::Ok().json(row))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::{test as actix_test, App};
    use chrono::Duration;
    use serde_json::{json, Value};

    use crate::domain::consent::ConsentOptions;
    use crate::domain::identity::User;
    use crate::domain::ports::{CatalogRepository, QuestionnaireRepository};
    use crate::domain::organization::{Organization, OrganizationId};
    use crate::domain::protocol::OrgProtocolRow;
    use crate::domain::questionnaire::{
        Classification, QbQuestionnaire, Questionnaire, QuestionnaireBank, QuestionnaireBankId,
        RelativeDelta,
    };
    use crate::inbound::http::test_utils::{test_context, test_epoch, TestContext};

    const PATIENT: i64 = 1;
    const ORG: i64 = 10;

    fn test_app(
        ctx: &TestContext,
    ) -> App<
        impl actix_web::dev::ServiceFactory<
            actix_web::dev::ServiceRequest,
            Config = (),
            Response = actix_web::dev::ServiceResponse,
            Error = actix_web::Error,
            InitError = (),
        > + use<>,
    > {
        App::new()
            .app_data(web::Data::new(ctx.state.clone()))
            .wrap(crate::inbound::http::test_utils::test_session_middleware())
            .route(
                "/test/login/{id}",
                web::post().to(
                    |session: SessionContext, path: web::Path<i64>| async move {
                        session.persist_user(UserId::new(path.into_inner()))?;
                        Ok::<_, crate::domain::Error>(HttpResponse::Ok())
                    },
                ),
            )
            .service(
                web::scope("/api")
                    .service(assessment_status)
                    .service(submit_assessment)
                    .service(patient_timeline)
                    .service(governing_questionnaire_bank),
            )
    }

    async fn login(
        app: &impl actix_web::dev::Service<
            actix_http::Request,
            Response = actix_web::dev::ServiceResponse,
            Error = actix_web::Error,
        >,
        user: i64,
    ) -> actix_web::cookie::Cookie<'static> {
        let res = actix_test::call_service(
            app,
            actix_test::TestRequest::post()
                .uri(&format!("/test/login/{user}"))
                .to_request(),
        )
        .await;
        assert!(res.status().is_success());
        res.response()
            .cookies()
            .find(|c| c.name() == "session")
            .expect("session cookie")
            .into_owned()
    }

    fn baseline_bank() -> QuestionnaireBank {
        QuestionnaireBank {
            id: QuestionnaireBankId::new(1),
            name: "crv-baseline".to_owned(),
            classification: Classification::Baseline,
            research_protocol_id: Some(crate::domain::protocol::ProtocolId::new(1)),
            intervention_id: None,
            start: RelativeDelta::default(),
            due: RelativeDelta {
                days: 7,
                ..RelativeDelta::default()
            },
            overdue: RelativeDelta {
                days: 30,
                ..RelativeDelta::default()
            },
            expired: RelativeDelta {
                days: 90,
                ..RelativeDelta::default()
            },
            recurs: Vec::new(),
            questionnaires: vec![QbQuestionnaire {
                rank: 0,
                questionnaire_name: "epic26".to_owned(),
            }],
        }
    }

    async fn seed_consented_patient(ctx: &TestContext) {
        let mut patient = User::with_id(UserId::new(PATIENT));
        patient.email = Some("patient@example.com".to_owned());
        ctx.store
            .seed_user(patient, vec![OrganizationId::new(ORG)]);
        ctx.store
            .save_organization(Organization {
                id: OrganizationId::new(ORG),
                name: "truenth-clinic".to_owned(),
                parent_id: None,
                email: None,
                default_locale: None,
                inherit_codings: false,
            })
            .await
            .expect("seed organization");
        ctx.store
            .save_protocol_row(OrgProtocolRow {
                organization_id: OrganizationId::new(ORG),
                protocol_id: crate::domain::protocol::ProtocolId::new(1),
                retired_as_of: None,
            })
            .await
            .expect("seed protocol row");
        ctx.store.seed_questionnaire(Questionnaire {
            id: 1,
            name: "epic26".to_owned(),
            identifiers: Vec::new(),
        });
        ctx.store
            .register_bank(baseline_bank())
            .await
            .expect("seed bank");
        ctx.state
            .assessments
            .accept_consent(
                UserId::new(PATIENT),
                UserId::new(PATIENT),
                OrganizationId::new(ORG),
                StudyId::new(0),
                test_epoch(),
                ConsentOptions::standard(),
                "https://portal.example/agreements/v3".to_owned(),
            )
            .await
            .expect("consent accepted");
    }

    #[actix_web::test]
    async fn status_report_round_trips() {
        let ctx = test_context();
        seed_consented_patient(&ctx).await;
        let app = actix_test::init_service(test_app(&ctx)).await;
        let cookie = login(&app, PATIENT).await;

        let res = actix_test::call_service(
            &app,
            actix_test::TestRequest::get()
                .uri(&format!("/api/patient/{PATIENT}/assessment-status"))
                .cookie(cookie)
                .to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = actix_test::read_body_json(res).await;
        assert_eq!(body["overall_status"], "Due");
        assert_eq!(body["qb_name"], "crv-baseline");
        assert_eq!(
            body["instruments_needing_full"],
            json!(["epic26"])
        );
    }

    #[actix_web::test]
    async fn submission_completes_the_visit() {
        let ctx = test_context();
        seed_consented_patient(&ctx).await;
        let app = actix_test::init_service(test_app(&ctx)).await;
        let cookie = login(&app, PATIENT).await;

        let authored = test_epoch() + Duration::days(1);
        let res = actix_test::call_service(
            &app,
            actix_test::TestRequest::put()
                .uri(&format!("/api/patient/{PATIENT}/assessment"))
                .cookie(cookie.clone())
                .set_json(json!({
                    "questionnaire_name": "epic26",
                    "bank_name": "crv-baseline",
                    "iteration": 0,
                    "authored": authored,
                    "status": "completed",
                    "document": {"item": []}
                }))
                .to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);

        let res = actix_test::call_service(
            &app,
            actix_test::TestRequest::get()
                .uri(&format!(
                    "/api/patient/{PATIENT}/assessment-status?as_of=2024-03-05T00:00:00Z"
                ))
                .cookie(cookie)
                .to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = actix_test::read_body_json(res).await;
        assert_eq!(body["overall_status"], "Completed");
    }

    #[actix_web::test]
    async fn unknown_instrument_is_not_found() {
        let ctx = test_context();
        seed_consented_patient(&ctx).await;
        let app = actix_test::init_service(test_app(&ctx)).await;
        let cookie = login(&app, PATIENT).await;

        let res = actix_test::call_service(
            &app,
            actix_test::TestRequest::put()
                .uri(&format!("/api/patient/{PATIENT}/assessment"))
                .cookie(cookie)
                .set_json(json!({
                    "questionnaire_name": "no_such_instrument",
                    "bank_name": "crv-baseline",
                    "iteration": 0,
                    "authored": test_epoch(),
                    "status": "completed"
                }))
                .to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn governing_bank_honours_as_of_date() {
        let ctx = test_context();
        seed_consented_patient(&ctx).await;
        let app = actix_test::init_service(test_app(&ctx)).await;
        let cookie = login(&app, PATIENT).await;

        let res = actix_test::call_service(
            &app,
            actix_test::TestRequest::get()
                .uri(&format!(
                    "/api/user/{PATIENT}/questionnaire_bank?as_of_date=2024-03-02"
                ))
                .cookie(cookie.clone())
                .to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = actix_test::read_body_json(res).await;
        assert_eq!(body["qb_name"], "crv-baseline");
        assert_eq!(body["state"], "due");

        // Before the trigger there is nothing scheduled.
        let res = actix_test::call_service(
            &app,
            actix_test::TestRequest::get()
                .uri(&format!(
                    "/api/user/{PATIENT}/questionnaire_bank?as_of_date=2024-01-01"
                ))
                .cookie(cookie)
                .to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn timeline_requires_credentials() {
        let ctx = test_context();
        seed_consented_patient(&ctx).await;
        let app = actix_test::init_service(test_app(&ctx)).await;

        let res = actix_test::call_service(
            &app,
            actix_test::TestRequest::get()
                .uri(&format!("/api/patient/{PATIENT}/timeline"))
                .to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
