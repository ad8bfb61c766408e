//! Port for the append-only audit log.

use async_trait::async_trait;

use super::StoreError;
use crate::domain::audit::Audit;
use crate::domain::identity::UserId;

#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Append an entry; returns the stored row with its assigned id.
    async fn append(&self, audit: Audit) -> Result<Audit, StoreError>;

    /// Entries recorded against one subject, oldest first.
    async fn for_subject(&self, user: UserId) -> Result<Vec<Audit>, StoreError>;
}
