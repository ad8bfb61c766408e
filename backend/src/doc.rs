//! OpenAPI documentation configuration.
//!
//! [`ApiDoc`] generates the OpenAPI specification for the REST surface:
//! assessment status, timelines, consents, the questionnaire-bank registry,
//! intervention access, user administration, and the OAuth broker. Swagger
//! UI serves the document in debug builds.

use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::domain::{Error, ErrorCode};
use crate::inbound::http::consents::ConsentRequest;
use crate::inbound::http::interventions::UserAccessRequest;
use crate::inbound::http::oauth::{
    AuthorizeForm, AuthorizeResponse, ServiceTokenRequest, TokenForm, TokenResponse,
};
use crate::inbound::http::questionnaires::BankDefinition;
use crate::inbound::http::users::LogoutResponse;

/// Register the session-cookie and bearer-token security schemes.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi
            .components
            .get_or_insert_with(utoipa::openapi::Components::default);

        components.add_security_scheme(
            "SessionCookie",
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                "session",
                "Portal session cookie. Takes precedence over a bearer token.",
            ))),
        );
        components.add_security_scheme(
            "BearerToken",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .description(Some("Access token issued by POST /oauth/token."))
                    .build(),
            ),
        );
    }
}

/// OpenAPI document for the portal backend.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Patient portal backend API",
        description = "Questionnaire scheduling, assessment status, consents, \
                       and the OAuth broker for satellite interventions."
    ),
    servers(
        (url = "/", description = "Relative to the deployment base URL")
    ),
    security(("SessionCookie" = []), ("BearerToken" = [])),
    paths(
        crate::inbound::http::assessments::assessment_status,
        crate::inbound::http::assessments::submit_assessment,
        crate::inbound::http::assessments::patient_timeline,
        crate::inbound::http::assessments::governing_questionnaire_bank,
        crate::inbound::http::consents::accept_consent,
        crate::inbound::http::consents::withdraw_consent,
        crate::inbound::http::questionnaires::list_banks,
        crate::inbound::http::questionnaires::register_bank,
        crate::inbound::http::questionnaires::questionnaire_by_name,
        crate::inbound::http::interventions::set_user_access,
        crate::inbound::http::interventions::append_access_rule,
        crate::inbound::http::users::clear_deceased,
        crate::inbound::http::users::audit_for_subject,
        crate::inbound::http::users::logout,
        crate::inbound::http::oauth::authorize,
        crate::inbound::http::oauth::token,
        crate::inbound::http::oauth::service_token,
    ),
    components(schemas(
        Error,
        ErrorCode,
        ConsentRequest,
        BankDefinition,
        UserAccessRequest,
        LogoutResponse,
        AuthorizeForm,
        AuthorizeResponse,
        TokenForm,
        TokenResponse,
        ServiceTokenRequest,
    )),
    tags(
        (name = "assessments", description = "Assessment status and questionnaire timelines"),
        (name = "consents", description = "Consent acceptance and withdrawal"),
        (name = "questionnaires", description = "Instrument and bank registry"),
        (name = "interventions", description = "Per-user intervention access"),
        (name = "users", description = "User administration, audit, and logout"),
        (name = "oauth", description = "Authorization-code and service-token flows")
    )
)]
pub struct ApiDoc;
