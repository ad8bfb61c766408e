//! Authentication helpers used by HTTP handlers.
//!
//! Keeps the HTTP modules focused on request/response mapping by
//! concentrating credential checks here. Protected APIs accept either an
//! authenticated portal session or a bearer token covering the required
//! scopes; the session wins when both are present.

use actix_web::http::header;
use actix_web::HttpRequest;

use crate::domain::identity::UserId;

use super::session::SessionContext;
use super::state::HttpState;
use super::ApiResult;

/// Extract the bearer token from the `Authorization` header, if any.
pub fn bearer_token(req: &HttpRequest) -> Option<String> {
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_owned)
}

/// Resolve the acting user for a protected API request.
pub async fn require_actor(
    state: &HttpState,
    session: &SessionContext,
    req: &HttpRequest,
    scopes: &[String],
) -> ApiResult<UserId> {
    let session_user = session.user_id()?;
    let bearer = bearer_token(req);
    state
        .broker
        .authenticate(session_user, bearer.as_deref(), scopes)
        .await
}
