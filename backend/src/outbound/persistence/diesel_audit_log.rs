//! Diesel-backed append-only audit log.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::error_mapping::{map_diesel_error, map_pool_error};
use super::models::{audit_to_row, row_to_audit, AuditRow};
use super::pool::DbPool;
use super::schema::audit_log;
use crate::domain::audit::Audit;
use crate::domain::identity::UserId;
use crate::domain::ports::{AuditLog, StoreError};

#[derive(Clone)]
pub struct DieselAuditLog {
    pool: DbPool,
}

impl DieselAuditLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLog for DieselAuditLog {
    async fn append(&self, audit: Audit) -> Result<Audit, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let stored: AuditRow = diesel::insert_into(audit_log::table)
            .values(&audit_to_row(&audit)?)
            .returning(AuditRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        row_to_audit(stored)
    }

    async fn for_subject(&self, user: UserId) -> Result<Vec<Audit>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<AuditRow> = audit_log::table
            .filter(audit_log::subject_user_id.eq(user.value()))
            .order((audit_log::timestamp.asc(), audit_log::id.asc()))
            .select(AuditRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(row_to_audit).collect()
    }
}
