//! Port for questionnaire responses.

use async_trait::async_trait;

use super::StoreError;
use crate::domain::identity::UserId;
use crate::domain::response::QuestionnaireResponse;

#[async_trait]
pub trait ResponseRepository: Send + Sync {
    /// Every response the user authored, any bank, any iteration.
    async fn responses_for(&self, user: UserId)
        -> Result<Vec<QuestionnaireResponse>, StoreError>;

    /// Insert or update (an in-progress document may be re-submitted);
    /// returns the stored row with its assigned id.
    async fn save(
        &self,
        response: QuestionnaireResponse,
    ) -> Result<QuestionnaireResponse, StoreError>;
}
