//! Port for intervention applications, per-user rows, and access strategies.

use async_trait::async_trait;

use super::StoreError;
use crate::domain::identity::UserId;
use crate::domain::intervention::{AccessStrategy, Intervention, UserIntervention};
use crate::domain::questionnaire::InterventionId;

#[async_trait]
pub trait InterventionRepository: Send + Sync {
    async fn by_name(&self, name: &str) -> Result<Option<Intervention>, StoreError>;

    async fn by_id(&self, id: InterventionId) -> Result<Option<Intervention>, StoreError>;

    async fn save(&self, intervention: Intervention) -> Result<Intervention, StoreError>;

    async fn user_row(
        &self,
        user: UserId,
        intervention: InterventionId,
    ) -> Result<Option<UserIntervention>, StoreError>;

    /// Insert or update the per-user row; one row per (user, intervention).
    async fn save_user_row(&self, row: UserIntervention)
        -> Result<UserIntervention, StoreError>;

    /// Access strategies for the intervention, unordered; callers sort by
    /// rank before evaluation.
    async fn strategies_for(
        &self,
        intervention: InterventionId,
    ) -> Result<Vec<AccessStrategy>, StoreError>;

    async fn append_strategy(
        &self,
        intervention: InterventionId,
        strategy: AccessStrategy,
    ) -> Result<AccessStrategy, StoreError>;
}
