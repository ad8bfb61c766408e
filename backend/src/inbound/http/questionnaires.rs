//! Questionnaire-bank registry handlers.
//!
//! ```text
//! GET  /api/questionnaire_bank      Full bank catalog
//! POST /api/questionnaire_bank      Register a validated bank
//! GET  /api/questionnaire/{name}    Instrument lookup, optionally by system
//! ```

use actix_web::{get, post, web, HttpRequest, HttpResponse};
use serde::Deserialize;

use crate::domain::protocol::ProtocolId;
use crate::domain::questionnaire::{
    Classification, InterventionId, QbQuestionnaire, QuestionnaireBank, QuestionnaireBankId,
    Recur, RelativeDelta,
};
use crate::inbound::http::auth::require_actor;
use crate::inbound::http::session::SessionContext;
use crate::inbound::http::state::HttpState;
use crate::inbound::http::ApiResult;

/// Bank registration body: a [`QuestionnaireBank`] before id assignment.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct BankDefinition {
    pub name: String,
    pub classification: Classification,
    #[serde(default)]
    pub research_protocol_id: Option<i64>,
    #[serde(default)]
    pub intervention_id: Option<i64>,
    #[serde(default)]
    pub start: RelativeDelta,
    pub due: RelativeDelta,
    pub overdue: RelativeDelta,
    pub expired: RelativeDelta,
    #[serde(default)]
    pub recurs: Vec<Recur>,
    pub questionnaires: Vec<QbQuestionnaire>,
}

impl BankDefinition {
    fn into_bank(self) -> QuestionnaireBank {
        QuestionnaireBank {
            id: QuestionnaireBankId::new(0),
            name: self.name,
            classification: self.classification,
            research_protocol_id: self.research_protocol_id.map(ProtocolId::new),
            intervention_id: self.intervention_id.map(InterventionId::new),
            start: self.start,
            due: self.due,
            overdue: self.overdue,
            expired: self.expired,
            recurs: self.recurs,
            questionnaires: self.questionnaires,
        }
    }
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct InstrumentQuery {
    /// Identifier system constraining the lookup.
    pub system: Option<String>,
}

/// Full questionnaire-bank catalog.
#[utoipa::path(
    get,
    path = "/api/questionnaire_bank",
    responses(
        (status = 200, description = "Registered banks"),
        (status = 401, description = "Unauthorised", body = crate::domain::Error)
    ),
    tags = ["questionnaires"],
    operation_id = "listQuestionnaireBanks"
)]
#[get("/questionnaire_bank")]
pub async fn list_banks(
    state: web::Data<HttpState>,
    session: SessionContext,
    req: HttpRequest,
) -> ApiResult<HttpResponse> {
    require_actor(&state, &session, &req, &[]).await?;
    let banks = state.questionnaires.banks().await?;
    let banks: Vec<QuestionnaireBank> = banks.iter().map(|bank| (**bank).clone()).collect();
    Ok(HttpResponse::Ok().json(banks))
}

/// Register a questionnaire bank.
#[utoipa::path(
    post,
    path = "/api/questionnaire_bank",
    request_body = BankDefinition,
    responses(
        (status = 201, description = "Bank registered"),
        (status = 400, description = "Validation failed", body = crate::domain::Error),
        (status = 401, description = "Unauthorised", body = crate::domain::Error),
        (status = 409, description = "Duplicate bank name", body = crate::domain::Error)
    ),
    tags = ["questionnaires"],
    operation_id = "registerQuestionnaireBank"
)]
#[post("/questionnaire_bank")]
pub async fn register_bank(
    state: web::Data<HttpState>,
    session: SessionContext,
    req: HttpRequest,
    payload: web::Json<BankDefinition>,
) -> ApiResult<HttpResponse> {
    require_actor(&state, &session, &req, &[]).await?;
    let bank = payload.into_inner().into_bank();
    bank.validate()?;
    let saved = state.questionnaires.register_bank(bank).await?;
    Ok(HttpResponse::Created().json((*saved).clone()))
}

/// Instrument lookup by name.
#[utoipa::path(
    get,
    path = "/api/questionnaire/{name}",
    params(
        ("name" = String, Path, description = "Instrument name"),
        InstrumentQuery
    ),
    responses(
        (status = 200, description = "Instrument"),
        (status = 401, description = "Unauthorised", body = crate::domain::Error),
        (status = 404, description = "Unknown instrument", body = crate::domain::Error)
    ),
    tags = ["questionnaires"],
    operation_id = "questionnaireByName"
)]
#[get("/questionnaire/{name}")]
pub async fn questionnaire_by_name(
    state: web::Data<HttpState>,
    session: SessionContext,
    req: HttpRequest,
    path: web::Path<String>,
    query: web::Query<InstrumentQuery>,
) -> ApiResult<HttpResponse> {
    require_actor(&state, &session, &req, &[]).await?;
    let name = path.into_inner();
    let found = state
        .questionnaires
        .questionnaire_by_name(&name, query.system.as_deref())
        .await?
        .ok_or_else(|| {
            crate::domain::Error::not_found(format!("questionnaire {name} is not registered"))
        })?;
    Ok(HttpResponse::Ok().json(found))
}
