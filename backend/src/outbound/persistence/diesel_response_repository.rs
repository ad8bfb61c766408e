//! Diesel-backed questionnaire-response repository.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::error_mapping::{map_diesel_error, map_pool_error};
use super::models::{response_to_row, row_to_response, ResponseRow};
use super::pool::DbPool;
use super::schema::questionnaire_responses;
use crate::domain::identity::UserId;
use crate::domain::ports::{ResponseRepository, StoreError};
use crate::domain::response::QuestionnaireResponse;

#[derive(Clone)]
pub struct DieselResponseRepository {
    pool: DbPool,
}

impl DieselResponseRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResponseRepository for DieselResponseRepository {
    async fn responses_for(
        &self,
        user: UserId,
    ) -> Result<Vec<QuestionnaireResponse>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<ResponseRow> = questionnaire_responses::table
            .filter(questionnaire_responses::user_id.eq(user.value()))
            .order(questionnaire_responses::authored.asc())
            .select(ResponseRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(row_to_response).collect()
    }

    async fn save(
        &self,
        response: QuestionnaireResponse,
    ) -> Result<QuestionnaireResponse, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let new_row = response_to_row(&response)?;
        let stored: ResponseRow = if response.id == 0 {
            diesel::insert_into(questionnaire_responses::table)
                .values(&new_row)
                .returning(ResponseRow::as_returning())
                .get_result(&mut conn)
                .await
                .map_err(map_diesel_error)?
        } else {
            diesel::update(
                questionnaire_responses::table
                    .filter(questionnaire_responses::id.eq(response.id)),
            )
            .set(&new_row)
            .returning(ResponseRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?
        };
        row_to_response(stored)
    }
}
