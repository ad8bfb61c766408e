//! Ports for the persisted timeline and its read-through cache.

use async_trait::async_trait;

use super::StoreError;
use crate::domain::consent::StudyId;
use crate::domain::identity::UserId;
use crate::domain::timeline::QbTimelineRow;

/// Persisted, rebuildable timeline rows.
#[async_trait]
pub trait TimelineRepository: Send + Sync {
    /// Atomically replace every row for one (user, study).
    async fn replace(
        &self,
        user: UserId,
        study: StudyId,
        rows: Vec<QbTimelineRow>,
    ) -> Result<(), StoreError>;

    async fn rows(&self, user: UserId, study: StudyId)
        -> Result<Vec<QbTimelineRow>, StoreError>;

    /// Users holding a materialised row for the named bank, for the
    /// communication scheduler's sweep.
    async fn users_with_bank(&self, qb_name: &str)
        -> Result<Vec<(UserId, StudyId)>, StoreError>;
}

/// Process-local cache over computed timelines.
///
/// Entries expire on their own; writes that change scheduling inputs call
/// [`TimelineCache::invalidate`] so the next read recomputes.
pub trait TimelineCache: Send + Sync {
    fn get(&self, user: UserId, study: StudyId) -> Option<Vec<QbTimelineRow>>;

    fn put(&self, user: UserId, study: StudyId, rows: Vec<QbTimelineRow>);

    /// Drop every cached timeline for the user, all studies.
    fn invalidate(&self, user: UserId);
}
