//! HTTP inbound adapter exposing the portal REST endpoints.

pub mod assessments;
pub mod auth;
pub mod consents;
pub mod error;
pub mod interventions;
pub mod oauth;
pub mod questionnaires;
pub mod session;
pub mod state;
#[cfg(test)]
pub mod test_utils;
pub mod users;

pub use error::ApiResult;
