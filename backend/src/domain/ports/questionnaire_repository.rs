//! Port for questionnaires and questionnaire-bank definitions.

use std::sync::Arc;

use async_trait::async_trait;

use super::StoreError;
use crate::domain::protocol::ProtocolId;
use crate::domain::questionnaire::{Questionnaire, QuestionnaireBank};

/// Banks are shared immutable definitions, so lookups hand out `Arc`s.
#[async_trait]
pub trait QuestionnaireRepository: Send + Sync {
    /// Instrument by unique name, optionally constrained to an identifier
    /// system.
    async fn questionnaire_by_name(
        &self,
        name: &str,
        system: Option<&str>,
    ) -> Result<Option<Questionnaire>, StoreError>;

    /// The full bank catalog.
    async fn banks(&self) -> Result<Vec<Arc<QuestionnaireBank>>, StoreError>;

    /// Banks attached to one research protocol.
    async fn banks_for_protocol(
        &self,
        protocol: ProtocolId,
    ) -> Result<Vec<Arc<QuestionnaireBank>>, StoreError>;

    async fn bank_by_name(&self, name: &str)
        -> Result<Option<Arc<QuestionnaireBank>>, StoreError>;

    /// Insert a validated bank. Duplicate names are a conflict.
    async fn register_bank(
        &self,
        bank: QuestionnaireBank,
    ) -> Result<Arc<QuestionnaireBank>, StoreError>;
}
