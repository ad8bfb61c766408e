//! Port for clinical events feeding the trigger resolver.

use async_trait::async_trait;

use super::StoreError;
use crate::domain::clinical::{Observation, Procedure};
use crate::domain::identity::UserId;

#[async_trait]
pub trait ClinicalRepository: Send + Sync {
    async fn observations_for(&self, user: UserId) -> Result<Vec<Observation>, StoreError>;

    async fn procedures_for(&self, user: UserId) -> Result<Vec<Procedure>, StoreError>;

    async fn save_observation(&self, observation: Observation)
        -> Result<Observation, StoreError>;

    async fn save_procedure(&self, procedure: Procedure) -> Result<Procedure, StoreError>;
}
