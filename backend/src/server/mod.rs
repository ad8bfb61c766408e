//! Server construction and middleware wiring.

mod config;
mod state_builders;

pub use config::ServerConfig;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use actix_session::{
    SessionMiddleware,
    config::{CookieContentSecurity, PersistentSession},
    storage::CookieSessionStore,
};
use actix_web::cookie::{Key, SameSite};
use actix_web::dev::{Server, ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{App, HttpServer, web};
#[cfg(debug_assertions)]
use utoipa::OpenApi;
#[cfg(debug_assertions)]
use utoipa_swagger_ui::SwaggerUi;

#[cfg(debug_assertions)]
use crate::doc::ApiDoc;
use crate::domain::ports::{Clock, SystemClock};
use crate::inbound::http::assessments::{
    assessment_status, governing_questionnaire_bank, patient_timeline, submit_assessment,
};
use crate::inbound::http::consents::{accept_consent, withdraw_consent};
use crate::inbound::http::interventions::{append_access_rule, set_user_access};
use crate::inbound::http::oauth::{authorize, service_token, token};
use crate::inbound::http::questionnaires::{list_banks, questionnaire_by_name, register_bank};
use crate::inbound::http::state::HttpState;
use crate::inbound::http::users::{audit_for_subject, clear_deceased, logout};
use crate::middleware::Trace;
use crate::outbound::persistence::{DbPool, PoolConfig};
use state_builders::{AppServices, Ports, build_services};

#[derive(Clone)]
struct AppDependencies {
    http_state: web::Data<HttpState>,
    key: Key,
    cookie_secure: bool,
}

fn build_app(
    deps: AppDependencies,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let AppDependencies {
        http_state,
        key,
        cookie_secure,
    } = deps;

    // SessionMiddleware<CookieSessionStore> is not Clone, so build one
    // identically configured instance per scope.
    let session = move || {
        SessionMiddleware::builder(CookieSessionStore::default(), key.clone())
            .cookie_name("session".into())
            .cookie_path("/".into())
            .cookie_secure(cookie_secure)
            .cookie_http_only(true)
            .cookie_content_security(CookieContentSecurity::Private)
            .cookie_same_site(SameSite::Lax)
            .session_lifecycle(
                PersistentSession::default()
                    .session_ttl(actix_web::cookie::time::Duration::hours(2)),
            )
            .build()
    };

    let api = web::scope("/api")
        .wrap(session())
        .service(assessment_status)
        .service(submit_assessment)
        .service(patient_timeline)
        .service(governing_questionnaire_bank)
        .service(accept_consent)
        .service(withdraw_consent)
        .service(list_banks)
        .service(register_bank)
        .service(questionnaire_by_name)
        .service(set_user_access)
        .service(append_access_rule)
        .service(clear_deceased)
        .service(audit_for_subject)
        .service(logout);

    // Code and token minting share the session middleware: /oauth/authorize
    // needs the interactive portal session to identify the resource owner.
    let oauth = web::scope("/oauth")
        .wrap(session())
        .service(authorize)
        .service(token)
        .service(service_token);

    let app = App::new()
        .app_data(http_state)
        .wrap(Trace)
        .service(api)
        .service(oauth);

    #[cfg(debug_assertions)]
    let app = app.service(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));
    #[cfg(not(debug_assertions))]
    let app = app;

    app
}

/// Construct the HTTP server and start the background task worker.
///
/// Builds Diesel adapters over a connection pool when `DATABASE_URL` is
/// configured, otherwise serves from the in-memory store. The task worker
/// runs on the same runtime and paces reminder scheduling at the configured
/// interval.
///
/// # Errors
/// Propagates [`std::io::Error`] when the session key cannot be loaded, the
/// database pool cannot be built, or binding the socket fails.
pub async fn create_server(config: ServerConfig) -> std::io::Result<Server> {
    let key = config.session_key()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let ports = match &config.database_url {
        Some(url) => {
            let pool = DbPool::new(PoolConfig::new(url.clone()))
                .await
                .map_err(|err| std::io::Error::other(format!("database pool: {err}")))?;
            Ports::from_pool(&pool)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; serving from the in-memory store");
            Ports::in_memory()
        }
    };

    let AppServices { http_state, worker } =
        build_services(ports, clock, config.trusted_origins.clone())?;

    let poll = StdDuration::from_secs(config.worker_poll_seconds);
    let tick_every = chrono::Duration::minutes(i64::from(config.reminder_tick_minutes));
    tokio::spawn(async move {
        worker.run(poll, tick_every).await;
    });

    let cookie_secure = config.cookie_secure;
    let server = HttpServer::new(move || {
        build_app(AppDependencies {
            http_state: http_state.clone(),
            key: key.clone(),
            cookie_secure,
        })
    })
    .bind(config.bind_addr)?
    .run();

    Ok(server)
}
