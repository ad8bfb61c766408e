//! Diesel-backed store for clinical observations and procedures.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::error_mapping::{map_diesel_error, map_pool_error};
use super::models::{
    observation_to_row, procedure_to_row, row_to_observation, row_to_procedure, ObservationRow,
    ProcedureRow,
};
use super::pool::DbPool;
use super::schema::{observations, procedures};
use crate::domain::clinical::{Observation, Procedure};
use crate::domain::identity::UserId;
use crate::domain::ports::{ClinicalRepository, StoreError};

#[derive(Clone)]
pub struct DieselClinicalRepository {
    pool: DbPool,
}

impl DieselClinicalRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ClinicalRepository for DieselClinicalRepository {
    async fn observations_for(&self, user: UserId) -> Result<Vec<Observation>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<ObservationRow> = observations::table
            .filter(observations::user_id.eq(user.value()))
            .order(observations::issued.asc())
            .select(ObservationRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(row_to_observation).collect()
    }

    async fn procedures_for(&self, user: UserId) -> Result<Vec<Procedure>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<ProcedureRow> = procedures::table
            .filter(procedures::user_id.eq(user.value()))
            .order(procedures::start_time.asc())
            .select(ProcedureRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(row_to_procedure).collect()
    }

    async fn save_observation(
        &self,
        observation: Observation,
    ) -> Result<Observation, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let stored: ObservationRow = diesel::insert_into(observations::table)
            .values(&observation_to_row(&observation)?)
            .returning(ObservationRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        row_to_observation(stored)
    }

    async fn save_procedure(&self, procedure: Procedure) -> Result<Procedure, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let stored: ProcedureRow = diesel::insert_into(procedures::table)
            .values(&procedure_to_row(&procedure)?)
            .returning(ProcedureRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        row_to_procedure(stored)
    }
}
