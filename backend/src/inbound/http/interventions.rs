//! Intervention access handlers, called by satellite services.
//!
//! ```text
//! POST /api/intervention/{name}              Set one user's access row
//! POST /api/intervention/{name}/access_rule  Append a ranked strategy
//! ```
//!
//! Both require a service token (or a portal session). A supplied link URL
//! must validate as a known origin.

use actix_web::{post, web, HttpRequest, HttpResponse};
use serde::Deserialize;

use crate::domain::identity::UserId;
use crate::domain::intervention::{AccessStrategy, InterventionAccess};
use crate::inbound::http::auth::require_actor;
use crate::inbound::http::session::SessionContext;
use crate::inbound::http::state::HttpState;
use crate::inbound::http::ApiResult;

/// Per-user access update body.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UserAccessRequest {
    pub user_id: i64,
    pub access: InterventionAccess,
    #[serde(default)]
    pub card_html: Option<String>,
    #[serde(default)]
    pub link_url: Option<String>,
    #[serde(default)]
    pub status_text: Option<String>,
}

/// Set one user's access row for an intervention.
#[utoipa::path(
    post,
    path = "/api/intervention/{name}",
    request_body = UserAccessRequest,
    params(("name" = String, Path, description = "Intervention name")),
    responses(
        (status = 200, description = "Access row saved"),
        (status = 401, description = "Unauthorised or unknown link origin", body = crate::domain::Error),
        (status = 404, description = "Unknown intervention or user", body = crate::domain::Error)
    ),
    tags = ["interventions"],
    operation_id = "setInterventionAccess"
)]
#[post("/intervention/{name}")]
pub async fn set_user_access(
    state: web::Data<HttpState>,
    session: SessionContext,
    req: HttpRequest,
    path: web::Path<String>,
    payload: web::Json<UserAccessRequest>,
) -> ApiResult<HttpResponse> {
    let actor = require_actor(&state, &session, &req, &[]).await?;
    let name = path.into_inner();
    let body = payload.into_inner();
    let saved = state
        .broker
        .set_user_access(
            actor,
            &name,
            UserId::new(body.user_id),
            body.access,
            body.card_html,
            body.link_url,
            body.status_text,
        )
        .await?;
    Ok(HttpResponse::Ok().json(saved))
}

/// Append a ranked access strategy to an intervention.
#[utoipa::path(
    post,
    path = "/api/intervention/{name}/access_rule",
    request_body = AccessStrategy,
    params(("name" = String, Path, description = "Intervention name")),
    responses(
        (status = 200, description = "Strategy appended"),
        (status = 401, description = "Unauthorised", body = crate::domain::Error),
        (status = 404, description = "Unknown intervention", body = crate::domain::Error),
        (status = 409, description = "Duplicate rank", body = crate::domain::Error)
    ),
    tags = ["interventions"],
    operation_id = "appendAccessRule"
)]
#[post("/intervention/{name}/access_rule")]
pub async fn append_access_rule(
    state: web::Data<HttpState>,
    session: SessionContext,
    req: HttpRequest,
    path: web::Path<String>,
    payload: web::Json<AccessStrategy>,
) -> ApiResult<HttpResponse> {
    let actor = require_actor(&state, &session, &req, &[]).await?;
    let saved = state
        .broker
        .append_access_rule(actor, &path.into_inner(), payload.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(saved))
}
