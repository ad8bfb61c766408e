//! Consent lifecycle handlers.
//!
//! ```text
//! POST   /api/patient/{id}/consent   Accept a consent for one study
//! DELETE /api/patient/{id}/consent   Withdraw the active consent
//! ```
//!
//! Acceptance deactivates any active predecessor for the study; withdrawal
//! suspends the schedule at the withdrawal instant. Both invalidate the
//! user's materialised timeline.

use actix_web::{delete, post, web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::consent::{ConsentOptions, StudyId};
use crate::domain::identity::UserId;
use crate::domain::organization::OrganizationId;
use crate::inbound::http::auth::require_actor;
use crate::inbound::http::session::SessionContext;
use crate::inbound::http::state::HttpState;
use crate::inbound::http::ApiResult;

/// Consent acceptance body.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ConsentRequest {
    pub organization_id: i64,
    #[serde(default)]
    pub study: Option<i64>,
    /// Defaults to now; backdating shifts the whole schedule.
    #[serde(default)]
    pub acceptance_date: Option<DateTime<Utc>>,
    /// Raw option bitmask; defaults to the standard set.
    #[serde(default)]
    pub options: Option<u32>,
    pub agreement_url: String,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct WithdrawQuery {
    pub study: Option<i64>,
}

/// Accept a consent on behalf of one patient.
#[utoipa::path(
    post,
    path = "/api/patient/{id}/consent",
    request_body = ConsentRequest,
    params(("id" = i64, Path, description = "Patient user id")),
    responses(
        (status = 200, description = "Consent recorded"),
        (status = 401, description = "Unauthorised", body = crate::domain::Error),
        (status = 404, description = "Unknown user", body = crate::domain::Error)
    ),
    tags = ["consents"],
    operation_id = "acceptConsent"
)]
#[post("/patient/{id}/consent")]
pub async fn accept_consent(
    state: web::Data<HttpState>,
    session: SessionContext,
    req: HttpRequest,
    path: web::Path<i64>,
    payload: web::Json<ConsentRequest>,
) -> ApiResult<HttpResponse> {
    let actor = require_actor(&state, &session, &req, &[]).await?;
    let user = UserId::new(path.into_inner());
    let body = payload.into_inner();
    let options = body
        .options
        .map_or_else(ConsentOptions::standard, ConsentOptions::from_bits);
    let saved = state
        .assessments
        .accept_consent(
            actor,
            user,
            OrganizationId::new(body.organization_id),
            StudyId::new(body.study.unwrap_or(0)),
            body.acceptance_date.unwrap_or_else(|| state.clock.now()),
            options,
            body.agreement_url,
        )
        .await?;
    Ok(HttpResponse::Ok().json(saved))
}

/// Withdraw the active consent for one study.
#[utoipa::path(
    delete,
    path = "/api/patient/{id}/consent",
    params(
        ("id" = i64, Path, description = "Patient user id"),
        WithdrawQuery
    ),
    responses(
        (status = 200, description = "Consent suspended"),
        (status = 401, description = "Unauthorised", body = crate::domain::Error),
        (status = 404, description = "No active consent", body = crate::domain::Error)
    ),
    tags = ["consents"],
    operation_id = "withdrawConsent"
)]
#[delete("/patient/{id}/consent")]
pub async fn withdraw_consent(
    state: web::Data<HttpState>,
    session: SessionContext,
    req: HttpRequest,
    path: web::Path<i64>,
    query: web::Query<WithdrawQuery>,
) -> ApiResult<HttpResponse> {
    let actor = require_actor(&state, &session, &req, &[]).await?;
    let user = UserId::new(path.into_inner());
    let saved = state
        .assessments
        .withdraw_consent(actor, user, StudyId::new(query.study.unwrap_or(0)))
        .await?;
    Ok(HttpResponse::Ok().json(saved))
}
