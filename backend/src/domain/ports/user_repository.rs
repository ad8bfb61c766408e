//! Port for user accounts and their associations.

use async_trait::async_trait;

use super::StoreError;
use crate::domain::identity::{User, UserId};
use crate::domain::organization::OrganizationId;

/// Access to user rows. Deletion is a soft flag; deleted users never come
/// back from lookups.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find(&self, id: UserId) -> Result<Option<User>, StoreError>;

    /// Look up by an external identifier, unique per (system, value).
    async fn find_by_identifier(
        &self,
        system: &str,
        value: &str,
    ) -> Result<Option<User>, StoreError>;

    /// Insert or update; returns the stored row with its assigned id.
    async fn save(&self, user: User) -> Result<User, StoreError>;

    /// Organizations the user is directly associated with.
    async fn organizations_of(&self, user: UserId) -> Result<Vec<OrganizationId>, StoreError>;

    /// Service accounts sponsored by `sponsor`, for service-token minting.
    async fn sponsored_service_users(&self, sponsor: UserId) -> Result<Vec<UserId>, StoreError>;
}
