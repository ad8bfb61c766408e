//! Diesel-backed intervention repository.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::error_mapping::{map_diesel_error, map_pool_error};
use super::models::{
    intervention_to_row, row_to_intervention, row_to_strategy, row_to_user_intervention,
    strategy_to_row, user_intervention_to_row, AccessStrategyRow, InterventionRow,
    UserInterventionRow,
};
use super::pool::DbPool;
use super::schema::{access_strategies, interventions, user_interventions};
use crate::domain::identity::UserId;
use crate::domain::intervention::{AccessStrategy, Intervention, UserIntervention};
use crate::domain::ports::{InterventionRepository, StoreError};
use crate::domain::questionnaire::InterventionId;

#[derive(Clone)]
pub struct DieselInterventionRepository {
    pool: DbPool,
}

impl DieselInterventionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InterventionRepository for DieselInterventionRepository {
    async fn by_name(&self, name: &str) -> Result<Option<Intervention>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<InterventionRow> = interventions::table
            .filter(interventions::name.eq(name))
            .select(InterventionRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        Ok(row.map(row_to_intervention))
    }

    async fn by_id(&self, id: InterventionId) -> Result<Option<Intervention>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<InterventionRow> = interventions::table
            .filter(interventions::id.eq(id.value()))
            .select(InterventionRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        Ok(row.map(row_to_intervention))
    }

    async fn save(&self, intervention: Intervention) -> Result<Intervention, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let new_row = intervention_to_row(&intervention);
        let stored: InterventionRow = if intervention.id.value() == 0 {
            diesel::insert_into(interventions::table)
                .values(&new_row)
                .returning(InterventionRow::as_returning())
                .get_result(&mut conn)
                .await
                .map_err(map_diesel_error)?
        } else {
            diesel::update(
                interventions::table.filter(interventions::id.eq(intervention.id.value())),
            )
            .set(&new_row)
            .returning(InterventionRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?
        };
        Ok(row_to_intervention(stored))
    }

    async fn user_row(
        &self,
        user: UserId,
        intervention: InterventionId,
    ) -> Result<Option<UserIntervention>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<UserInterventionRow> = user_interventions::table
            .filter(user_interventions::user_id.eq(user.value()))
            .filter(user_interventions::intervention_id.eq(intervention.value()))
            .select(UserInterventionRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(row_to_user_intervention).transpose()
    }

    async fn save_user_row(
        &self,
        row: UserIntervention,
    ) -> Result<UserIntervention, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let db_row = user_intervention_to_row(&row)?;
        let stored: UserInterventionRow = diesel::insert_into(user_interventions::table)
            .values(&db_row)
            .on_conflict((
                user_interventions::user_id,
                user_interventions::intervention_id,
            ))
            .do_update()
            .set(&db_row)
            .returning(UserInterventionRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        row_to_user_intervention(stored)
    }

    async fn strategies_for(
        &self,
        intervention: InterventionId,
    ) -> Result<Vec<AccessStrategy>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<AccessStrategyRow> = access_strategies::table
            .filter(access_strategies::intervention_id.eq(intervention.value()))
            .select(AccessStrategyRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(row_to_strategy).collect()
    }

    async fn append_strategy(
        &self,
        intervention: InterventionId,
        strategy: AccessStrategy,
    ) -> Result<AccessStrategy, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        // A unique index on (intervention, rank) rejects duplicate ranks.
        let stored: AccessStrategyRow = diesel::insert_into(access_strategies::table)
            .values(&strategy_to_row(intervention, &strategy)?)
            .returning(AccessStrategyRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        row_to_strategy(stored)
    }
}
