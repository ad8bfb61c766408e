//! Shared HTTP adapter state.
//!
//! HTTP handlers accept this state via `actix_web::web::Data` so they only
//! depend on the domain services and ports, and remain testable without
//! I/O.

use std::sync::Arc;

use crate::domain::assessment_service::AssessmentService;
use crate::domain::broker::OAuthBroker;
use crate::domain::ports::{AuditLog, Clock, QuestionnaireRepository};

/// Dependency bundle for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub assessments: Arc<AssessmentService>,
    pub broker: Arc<OAuthBroker>,
    pub questionnaires: Arc<dyn QuestionnaireRepository>,
    pub audit: Arc<dyn AuditLog>,
    pub clock: Arc<dyn Clock>,
}
