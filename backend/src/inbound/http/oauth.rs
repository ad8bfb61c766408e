//! OAuth2 authorization-code endpoints and service-token minting.
//!
//! ```text
//! POST /oauth/authorize      Mint a single-use code for a logged-in user
//! POST /oauth/token          Exchange a code for a bearer token
//! POST /oauth/service_token  Mint a long-lived sponsor service token
//! ```
//!
//! Redirect URIs are compared by origin only (scheme, host, port); an
//! unknown origin is refused with 401 and an access-context audit entry.

use actix_web::{post, web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::domain::identity::UserId;
use crate::domain::oauth::Token;
use crate::inbound::http::auth::require_actor;
use crate::inbound::http::session::SessionContext;
use crate::inbound::http::state::HttpState;
use crate::inbound::http::ApiResult;

/// Authorization request, posted by the portal front-end.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct AuthorizeForm {
    pub client_id: String,
    pub redirect_uri: String,
    /// Space-separated scope list, per RFC 6749.
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

/// Token request, posted by the client's backend.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct TokenForm {
    pub grant_type: String,
    pub code: String,
    pub redirect_uri: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ServiceTokenRequest {
    pub client_id: String,
    /// Sponsored service account receiving the token.
    pub user_id: i64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AuthorizeResponse {
    pub code: String,
    pub redirect_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// RFC 6749 §5.1 access-token response.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub refresh_token: String,
    pub scope: String,
}

impl TokenResponse {
    fn from_token(minted: Token, now: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            access_token: minted.access_token,
            token_type: "Bearer".to_owned(),
            expires_in: (minted.expires - now).num_seconds(),
            refresh_token: minted.refresh_token,
            scope: minted.scopes.join(" "),
        }
    }
}

fn split_scopes(scope: Option<&str>) -> Vec<String> {
    scope
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_owned)
        .collect()
}

/// Mint an authorization code for the logged-in user.
#[utoipa::path(
    post,
    path = "/oauth/authorize",
    request_body(content = AuthorizeForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Code issued", body = AuthorizeResponse),
        (status = 401, description = "No session or unknown redirect origin", body = crate::domain::Error)
    ),
    tags = ["oauth"],
    operation_id = "oauthAuthorize"
)]
#[post("/authorize")]
pub async fn authorize(
    state: web::Data<HttpState>,
    session: SessionContext,
    form: web::Form<AuthorizeForm>,
) -> ApiResult<HttpResponse> {
    // Codes are only minted against an interactive portal session.
    let user = session.require_user_id()?;
    let form = form.into_inner();
    let grant = state
        .broker
        .authorize(
            user,
            &form.client_id,
            &form.redirect_uri,
            split_scopes(form.scope.as_deref()),
        )
        .await?;
    Ok(HttpResponse::Ok().json(AuthorizeResponse {
        code: grant.code,
        redirect_uri: grant.redirect_uri,
        state: form.state,
    }))
}

/// Exchange an authorization code for a bearer token.
#[utoipa::path(
    post,
    path = "/oauth/token",
    request_body(content = TokenForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 400, description = "Unsupported grant type", body = crate::domain::Error),
        (status = 401, description = "Bad code, secret, or redirect origin", body = crate::domain::Error)
    ),
    tags = ["oauth"],
    operation_id = "oauthToken"
)]
#[post("/token")]
pub async fn token(
    state: web::Data<HttpState>,
    form: web::Form<TokenForm>,
) -> ApiResult<HttpResponse> {
    let form = form.into_inner();
    if form.grant_type != "authorization_code" {
        return Err(crate::domain::Error::invalid_request(format!(
            "unsupported grant_type {}",
            form.grant_type
        )));
    }
    let minted = state
        .broker
        .exchange(
            &form.client_id,
            &form.client_secret,
            &form.code,
            &form.redirect_uri,
        )
        .await?;
    let now = state.clock.now();
    Ok(HttpResponse::Ok().json(TokenResponse::from_token(minted, now)))
}

/// Mint a service token for a sponsored service account.
#[utoipa::path(
    post,
    path = "/oauth/service_token",
    request_body = ServiceTokenRequest,
    responses(
        (status = 200, description = "Service token issued", body = TokenResponse),
        (status = 401, description = "Unauthorised", body = crate::domain::Error),
        (status = 403, description = "Caller does not own the client or sponsor the user", body = crate::domain::Error),
        (status = 409, description = "A live service token already exists", body = crate::domain::Error)
    ),
    tags = ["oauth"],
    operation_id = "mintServiceToken"
)]
#[post("/service_token")]
pub async fn service_token(
    state: web::Data<HttpState>,
    session: SessionContext,
    req: HttpRequest,
    payload: web::Json<ServiceTokenRequest>,
) -> ApiResult<HttpResponse> {
    let actor = require_actor(&state, &session, &req, &[]).await?;
    let body = payload.into_inner();
    let minted = state
        .broker
        .mint_service_token(actor, &body.client_id, UserId::new(body.user_id))
        .await?;
    let now = state.clock.now();
    Ok(HttpResponse::Ok().json(TokenResponse::from_token(minted, now)))
}
