//! Domain layer: entities, scheduling and assessment logic, services, and
//! the ports adapters implement.
//!
//! Nothing in this module touches a transport or a database. Services hold
//! `Arc<dyn Port>` handles and compose the pure functions in the entity
//! modules; inbound and outbound adapters live in their own trees.

pub mod assessment;
pub mod assessment_service;
pub mod audit;
pub mod broker;
pub mod clinical;
pub mod communication;
pub mod concept;
pub mod consent;
pub mod error;
pub mod identity;
pub mod intervention;
pub mod oauth;
pub mod organization;
pub mod ports;
pub mod protocol;
pub mod questionnaire;
pub mod response;
pub mod scheduler;
pub mod task;
pub mod timeline;
pub mod trace_id;
pub mod trigger;

pub use error::{Error, ErrorCode};
pub use trace_id::{TraceId, TRACE_ID_HEADER};
