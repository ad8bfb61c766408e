//! Outbound ports: the traits the domain needs implemented by adapters.
//!
//! Every port is object safe and `Send + Sync` so services can hold
//! `Arc<dyn Port>` handles. Persistence ports share [`StoreError`]; delivery
//! ports (mail, callbacks) share [`DispatchError`]. Adapters translate their
//! native failures into these before the domain sees them.

pub mod audit_log;
pub mod catalog_repository;
pub mod clinical_repository;
pub mod clock;
pub mod communication_repository;
pub mod consent_repository;
pub mod dispatch;
pub mod intervention_repository;
pub mod oauth_store;
pub mod questionnaire_repository;
pub mod response_repository;
pub mod task_queue;
pub mod timeline_repository;
pub mod user_repository;

pub use audit_log::AuditLog;
pub use catalog_repository::CatalogRepository;
pub use clinical_repository::ClinicalRepository;
pub use clock::{Clock, FixedClock, SystemClock};
pub use communication_repository::CommunicationRepository;
pub use consent_repository::ConsentRepository;
pub use dispatch::{CallbackTransport, DispatchError, Mailer, MessageTemplates};
pub use intervention_repository::InterventionRepository;
pub use oauth_store::OAuthStore;
pub use questionnaire_repository::QuestionnaireRepository;
pub use response_repository::ResponseRepository;
pub use task_queue::TaskQueue;
pub use timeline_repository::{TimelineCache, TimelineRepository};
pub use user_repository::UserRepository;

use super::error::Error;

/// Failure surfaced by a persistence port.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The referenced record does not exist.
    #[error("record not found: {0}")]
    NotFound(String),
    /// A uniqueness or state invariant was violated.
    #[error("conflicting record: {0}")]
    Conflict(String),
    /// The backing store could not be reached or timed out.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// A stored value failed to deserialise into its domain shape.
    #[error("malformed stored value: {0}")]
    Malformed(String),
}

impl StoreError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        Self::Conflict(what.into())
    }

    pub fn unavailable(what: impl Into<String>) -> Self {
        Self::Unavailable(what.into())
    }

    pub fn malformed(what: impl Into<String>) -> Self {
        Self::Malformed(what.into())
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Error::not_found(what),
            StoreError::Conflict(what) => Error::conflict(what),
            StoreError::Unavailable(what) => Error::unavailable(what),
            StoreError::Malformed(what) => Error::internal(what),
        }
    }
}
