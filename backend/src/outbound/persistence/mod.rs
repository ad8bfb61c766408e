//! Postgres persistence adapters.
//!
//! One repository per port, each a thin `Clone`-able handle over the shared
//! [`pool::DbPool`]. Row shapes and their domain mappings live in [`models`];
//! pool and Diesel failures funnel through [`error_mapping`] into the store
//! error taxonomy.

pub mod error_mapping;
pub mod models;
pub mod pool;
pub mod schema;

mod diesel_audit_log;
mod diesel_catalog_repository;
mod diesel_clinical_repository;
mod diesel_communication_repository;
mod diesel_consent_repository;
mod diesel_intervention_repository;
mod diesel_oauth_store;
mod diesel_questionnaire_repository;
mod diesel_response_repository;
mod diesel_task_queue;
mod diesel_timeline_repository;
mod diesel_user_repository;

pub use diesel_audit_log::DieselAuditLog;
pub use diesel_catalog_repository::DieselCatalogRepository;
pub use diesel_clinical_repository::DieselClinicalRepository;
pub use diesel_communication_repository::DieselCommunicationRepository;
pub use diesel_consent_repository::DieselConsentRepository;
pub use diesel_intervention_repository::DieselInterventionRepository;
pub use diesel_oauth_store::DieselOAuthStore;
pub use diesel_questionnaire_repository::DieselQuestionnaireRepository;
pub use diesel_response_repository::DieselResponseRepository;
pub use diesel_task_queue::DieselTaskQueue;
pub use diesel_timeline_repository::DieselTimelineRepository;
pub use diesel_user_repository::DieselUserRepository;
pub use pool::{DbPool, PoolConfig, PoolError};
