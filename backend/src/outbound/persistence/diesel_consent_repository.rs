//! Diesel-backed consent repository.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::error_mapping::{map_diesel_error, map_pool_error};
use super::models::{consent_to_row, row_to_consent, ConsentRow};
use super::pool::DbPool;
use super::schema::user_consents;
use crate::domain::consent::{StudyId, UserConsent};
use crate::domain::identity::UserId;
use crate::domain::ports::{ConsentRepository, StoreError};

/// Wire string for the deactivated status, excluded from study lookups.
const DELETED: &str = "deleted";

#[derive(Clone)]
pub struct DieselConsentRepository {
    pool: DbPool,
}

impl DieselConsentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConsentRepository for DieselConsentRepository {
    async fn consents_for(&self, user: UserId) -> Result<Vec<UserConsent>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<ConsentRow> = user_consents::table
            .filter(user_consents::user_id.eq(user.value()))
            .order(user_consents::acceptance_date.asc())
            .select(ConsentRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(row_to_consent).collect()
    }

    async fn latest_for_study(
        &self,
        user: UserId,
        study: StudyId,
    ) -> Result<Option<UserConsent>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<ConsentRow> = user_consents::table
            .filter(user_consents::user_id.eq(user.value()))
            .filter(user_consents::study_id.eq(study.value()))
            .filter(user_consents::status.ne(DELETED))
            .order(user_consents::acceptance_date.desc())
            .select(ConsentRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(row_to_consent).transpose()
    }

    async fn save(&self, consent: UserConsent) -> Result<UserConsent, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let new_row = consent_to_row(&consent)?;
        let stored: ConsentRow = if consent.id == 0 {
            diesel::insert_into(user_consents::table)
                .values(&new_row)
                .returning(ConsentRow::as_returning())
                .get_result(&mut conn)
                .await
                .map_err(map_diesel_error)?
        } else {
            diesel::update(user_consents::table.filter(user_consents::id.eq(consent.id)))
                .set(&new_row)
                .returning(ConsentRow::as_returning())
                .get_result(&mut conn)
                .await
                .map_err(map_diesel_error)?
        };
        row_to_consent(stored)
    }
}
