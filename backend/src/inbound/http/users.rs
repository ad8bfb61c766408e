//! User-administration and logout handlers.
//!
//! ```text
//! POST /api/user/{id}/clear_deceased   Audited reversal of the deceased flag
//! GET  /api/user/{id}/audit            Audit entries for one subject
//! POST /api/logout                     End the session and fan out the event
//! ```

use actix_web::{get, post, web, HttpRequest, HttpResponse};
use serde::Serialize;

use crate::domain::identity::UserId;
use crate::domain::oauth::CallbackEvent;
use crate::inbound::http::auth::require_actor;
use crate::inbound::http::session::SessionContext;
use crate::inbound::http::state::HttpState;
use crate::inbound::http::ApiResult;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct LogoutResponse {
    /// Subscribed clients a callback was enqueued for.
    pub notified: usize,
}

/// Clear a user's deceased flag through the audited transition.
#[utoipa::path(
    post,
    path = "/api/user/{id}/clear_deceased",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 204, description = "Flag cleared"),
        (status = 401, description = "Unauthorised", body = crate::domain::Error),
        (status = 404, description = "Unknown user", body = crate::domain::Error),
        (status = 409, description = "User is not marked deceased", body = crate::domain::Error)
    ),
    tags = ["users"],
    operation_id = "clearDeceased"
)]
#[post("/user/{id}/clear_deceased")]
pub async fn clear_deceased(
    state: web::Data<HttpState>,
    session: SessionContext,
    req: HttpRequest,
    path: web::Path<i64>,
) -> ApiResult<HttpResponse> {
    let actor = require_actor(&state, &session, &req, &[]).await?;
    state
        .assessments
        .clear_deceased(actor, UserId::new(path.into_inner()))
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Audit entries recorded against one subject, oldest first.
#[utoipa::path(
    get,
    path = "/api/user/{id}/audit",
    params(("id" = i64, Path, description = "Subject user id")),
    responses(
        (status = 200, description = "Audit entries"),
        (status = 401, description = "Unauthorised", body = crate::domain::Error)
    ),
    tags = ["users"],
    operation_id = "auditForSubject"
)]
#[get("/user/{id}/audit")]
pub async fn audit_for_subject(
    state: web::Data<HttpState>,
    session: SessionContext,
    req: HttpRequest,
    path: web::Path<i64>,
) -> ApiResult<HttpResponse> {
    require_actor(&state, &session, &req, &[]).await?;
    let entries = state
        .audit
        .for_subject(UserId::new(path.into_inner()))
        .await?;
    Ok(HttpResponse::Ok().json(entries))
}

/// End the portal session, revoke tokens, and notify subscribed clients.
#[utoipa::path(
    post,
    path = "/api/logout",
    responses(
        (status = 200, description = "Session ended", body = LogoutResponse),
        (status = 401, description = "No session", body = crate::domain::Error)
    ),
    tags = ["users"],
    operation_id = "logout"
)]
#[post("/logout")]
pub async fn logout(
    state: web::Data<HttpState>,
    session: SessionContext,
) -> ApiResult<HttpResponse> {
    let user = session.require_user_id()?;
    let notified = state.broker.notify_event(CallbackEvent::Logout, user).await?;
    session.purge();
    Ok(HttpResponse::Ok().json(LogoutResponse { notified }))
}
