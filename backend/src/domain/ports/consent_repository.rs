//! Port for consent rows.

use async_trait::async_trait;

use super::StoreError;
use crate::domain::consent::{StudyId, UserConsent};
use crate::domain::identity::UserId;

/// Access to consent rows. Rows are never removed; withdrawal and
/// deactivation are recorded in place.
#[async_trait]
pub trait ConsentRepository: Send + Sync {
    /// Every consent row for the user, all statuses.
    async fn consents_for(&self, user: UserId) -> Result<Vec<UserConsent>, StoreError>;

    /// Most recent non-deactivated consent for one study, if any. A
    /// suspended row is returned so withdrawal semantics stay visible.
    async fn latest_for_study(
        &self,
        user: UserId,
        study: StudyId,
    ) -> Result<Option<UserConsent>, StoreError>;

    /// Insert or update; returns the stored row with its assigned id.
    async fn save(&self, consent: UserConsent) -> Result<UserConsent, StoreError>;
}
