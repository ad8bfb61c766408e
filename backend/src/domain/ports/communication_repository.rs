//! Port for reminder requests and emitted communications.

use async_trait::async_trait;

use super::StoreError;
use crate::domain::communication::{
    Communication, CommunicationRequest, CommunicationStatus,
};
use crate::domain::identity::UserId;

#[async_trait]
pub trait CommunicationRepository: Send + Sync {
    /// Requests still scheduling reminders.
    async fn active_requests(&self) -> Result<Vec<CommunicationRequest>, StoreError>;

    /// Every communication recorded for the user, any request.
    async fn communications_for(&self, user: UserId)
        -> Result<Vec<Communication>, StoreError>;

    /// Insert a new communication. A second row for the same
    /// (user, request, iteration) is a conflict; the at-most-once guarantee
    /// rests on this constraint.
    async fn insert(&self, communication: Communication)
        -> Result<Communication, StoreError>;

    /// Move an existing communication to a new status.
    async fn update_status(
        &self,
        id: i64,
        status: CommunicationStatus,
        message_ref: Option<String>,
    ) -> Result<(), StoreError>;

    async fn save_request(
        &self,
        request: CommunicationRequest,
    ) -> Result<CommunicationRequest, StoreError>;
}
