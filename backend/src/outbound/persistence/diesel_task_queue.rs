//! Diesel-backed task queue with lease-based claiming.
//!
//! `claim_due` selects due rows `FOR UPDATE SKIP LOCKED` and stamps a
//! claim lease, so concurrent workers never execute the same task. A task
//! whose worker dies becomes claimable again once its lease lapses.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};

use super::error_mapping::{map_diesel_error, map_pool_error};
use super::models::{row_to_task, task_to_row, TaskRow};
use super::pool::DbPool;
use super::schema::tasks;
use crate::domain::ports::{StoreError, TaskQueue};
use crate::domain::task::Task;

/// How long a claimed task stays invisible to other workers.
const CLAIM_LEASE_SECONDS: i64 = 300;

#[derive(Clone)]
pub struct DieselTaskQueue {
    pool: DbPool,
}

impl DieselTaskQueue {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskQueue for DieselTaskQueue {
    async fn enqueue(&self, task: Task) -> Result<Task, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let stored: TaskRow = diesel::insert_into(tasks::table)
            .values(&task_to_row(&task))
            .returning(TaskRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        row_to_task(stored)
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Task>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let lease_until = now + Duration::seconds(CLAIM_LEASE_SECONDS);
        let rows: Vec<TaskRow> = conn
            .transaction(|conn| {
                async move {
                    let rows: Vec<TaskRow> = tasks::table
                        .filter(tasks::next_attempt_at.le(now))
                        .filter(
                            tasks::claimed_until
                                .is_null()
                                .or(tasks::claimed_until.lt(now)),
                        )
                        .order(tasks::next_attempt_at.asc())
                        .limit(limit)
                        .select(TaskRow::as_select())
                        .for_update()
                        .skip_locked()
                        .load(conn)
                        .await?;
                    let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
                    diesel::update(tasks::table.filter(tasks::id.eq_any(&ids)))
                        .set(tasks::claimed_until.eq(lease_until))
                        .execute(conn)
                        .await?;
                    Ok(rows)
                }
                .scope_boxed()
            })
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(row_to_task).collect()
    }

    async fn complete(&self, id: i64) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let deleted = diesel::delete(tasks::table.filter(tasks::id.eq(id)))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        if deleted == 0 {
            return Err(StoreError::not_found(format!("task {id}")));
        }
        Ok(())
    }

    async fn reschedule(&self, task: Task) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let updated = diesel::update(tasks::table.filter(tasks::id.eq(task.id)))
            .set((
                tasks::attempts.eq(task.attempts),
                tasks::next_attempt_at.eq(task.next_attempt_at),
                tasks::claimed_until.eq(None::<DateTime<Utc>>),
            ))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        if updated == 0 {
            return Err(StoreError::not_found(format!("task {}", task.id)));
        }
        Ok(())
    }

    async fn abandon(&self, id: i64) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let deleted = diesel::delete(tasks::table.filter(tasks::id.eq(id)))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        if deleted == 0 {
            return Err(StoreError::not_found(format!("task {id}")));
        }
        Ok(())
    }
}
