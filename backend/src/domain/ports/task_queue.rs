//! Port for the persisted background-task queue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::StoreError;
use crate::domain::task::Task;

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Persist a task; returns the stored row with its assigned id.
    async fn enqueue(&self, task: Task) -> Result<Task, StoreError>;

    /// Claim up to `limit` tasks whose `next_attempt_at` has passed. Claimed
    /// tasks are invisible to concurrent claimers until completed,
    /// rescheduled, or abandoned.
    async fn claim_due(&self, now: DateTime<Utc>, limit: usize)
        -> Result<Vec<Task>, StoreError>;

    /// Acknowledge successful execution; the task row is removed.
    async fn complete(&self, id: i64) -> Result<(), StoreError>;

    /// Write back a failed task with its bumped attempt count and next
    /// attempt instant.
    async fn reschedule(&self, task: Task) -> Result<(), StoreError>;

    /// Drop a task whose attempt budget is spent.
    async fn abandon(&self, id: i64) -> Result<(), StoreError>;
}
