//! Diesel-backed questionnaire and bank registry.

use std::sync::Arc;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde_json::json;

use super::error_mapping::{map_diesel_error, map_pool_error};
use super::models::{bank_to_row, row_to_bank, row_to_questionnaire, BankRow, QuestionnaireRow};
use super::pool::DbPool;
use super::schema::{questionnaire_banks, questionnaires};
use crate::domain::ports::{QuestionnaireRepository, StoreError};
use crate::domain::protocol::ProtocolId;
use crate::domain::questionnaire::{Questionnaire, QuestionnaireBank};

#[derive(Clone)]
pub struct DieselQuestionnaireRepository {
    pool: DbPool,
}

impl DieselQuestionnaireRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuestionnaireRepository for DieselQuestionnaireRepository {
    async fn questionnaire_by_name(
        &self,
        name: &str,
        system: Option<&str>,
    ) -> Result<Option<Questionnaire>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let mut query = questionnaires::table
            .filter(questionnaires::name.eq(name))
            .select(QuestionnaireRow::as_select())
            .into_boxed();
        if let Some(system) = system {
            query = query.filter(questionnaires::identifiers.contains(json!([{ "system": system }])));
        }
        let row: Option<QuestionnaireRow> = query
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(row_to_questionnaire).transpose()
    }

    async fn banks(&self) -> Result<Vec<Arc<QuestionnaireBank>>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<BankRow> = questionnaire_banks::table
            .order(questionnaire_banks::id.asc())
            .select(BankRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter()
            .map(|row| row_to_bank(row).map(Arc::new))
            .collect()
    }

    async fn banks_for_protocol(
        &self,
        protocol: ProtocolId,
    ) -> Result<Vec<Arc<QuestionnaireBank>>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<BankRow> = questionnaire_banks::table
            .filter(questionnaire_banks::research_protocol_id.eq(protocol.value()))
            .order(questionnaire_banks::id.asc())
            .select(BankRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter()
            .map(|row| row_to_bank(row).map(Arc::new))
            .collect()
    }

    async fn bank_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Arc<QuestionnaireBank>>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<BankRow> = questionnaire_banks::table
            .filter(questionnaire_banks::name.eq(name))
            .select(BankRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(|row| row_to_bank(row).map(Arc::new)).transpose()
    }

    async fn register_bank(
        &self,
        bank: QuestionnaireBank,
    ) -> Result<Arc<QuestionnaireBank>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        // A unique index on the name turns duplicates into conflicts.
        let stored: BankRow = diesel::insert_into(questionnaire_banks::table)
            .values(&bank_to_row(&bank)?)
            .returning(BankRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        row_to_bank(stored).map(Arc::new)
    }
}
