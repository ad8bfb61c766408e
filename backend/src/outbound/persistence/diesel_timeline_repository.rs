//! Diesel-backed store for materialised timeline rows.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};

use super::error_mapping::{map_diesel_error, map_pool_error};
use super::models::{row_to_timeline, timeline_to_row, NewTimelineRow, TimelineRow};
use super::pool::DbPool;
use super::schema::qb_timeline;
use crate::domain::consent::StudyId;
use crate::domain::identity::UserId;
use crate::domain::ports::{StoreError, TimelineRepository};
use crate::domain::timeline::QbTimelineRow;

#[derive(Clone)]
pub struct DieselTimelineRepository {
    pool: DbPool,
}

impl DieselTimelineRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TimelineRepository for DieselTimelineRepository {
    async fn replace(
        &self,
        user: UserId,
        study: StudyId,
        rows: Vec<QbTimelineRow>,
    ) -> Result<(), StoreError> {
        // Convert before the transaction so serde failures never leave a
        // half-replaced timeline behind.
        let new_rows: Vec<NewTimelineRow> =
            rows.iter().map(timeline_to_row).collect::<Result<_, _>>()?;
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        conn.transaction(|conn| {
            async move {
                diesel::delete(
                    qb_timeline::table
                        .filter(qb_timeline::user_id.eq(user.value()))
                        .filter(qb_timeline::study_id.eq(study.value())),
                )
                .execute(conn)
                .await?;
                diesel::insert_into(qb_timeline::table)
                    .values(&new_rows)
                    .execute(conn)
                    .await?;
                Ok(())
            }
            .scope_boxed()
        })
        .await
        .map_err(map_diesel_error)
    }

    async fn rows(
        &self,
        user: UserId,
        study: StudyId,
    ) -> Result<Vec<QbTimelineRow>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<TimelineRow> = qb_timeline::table
            .filter(qb_timeline::user_id.eq(user.value()))
            .filter(qb_timeline::study_id.eq(study.value()))
            .order((qb_timeline::due.asc(), qb_timeline::id.asc()))
            .select(TimelineRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(row_to_timeline).collect()
    }

    async fn users_with_bank(
        &self,
        qb_name: &str,
    ) -> Result<Vec<(UserId, StudyId)>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let pairs: Vec<(i64, i64)> = qb_timeline::table
            .filter(qb_timeline::qb_name.eq(qb_name))
            .select((qb_timeline::user_id, qb_timeline::study_id))
            .distinct()
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(pairs
            .into_iter()
            .map(|(user, study)| (UserId::new(user), StudyId::new(study)))
            .collect())
    }
}
