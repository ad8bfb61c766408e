//! Diesel-backed store for reminder requests and emitted communications.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::error_mapping::{map_diesel_error, map_pool_error};
use super::models::{
    communication_to_row, enum_to_db, request_to_row, row_to_communication, row_to_request,
    CommunicationRequestRow, CommunicationRow,
};
use super::pool::DbPool;
use super::schema::{communication_requests, communications};
use crate::domain::communication::{
    Communication, CommunicationRequest, CommunicationStatus, RequestStatus,
};
use crate::domain::identity::UserId;
use crate::domain::ports::{CommunicationRepository, StoreError};

#[derive(Clone)]
pub struct DieselCommunicationRepository {
    pool: DbPool,
}

impl DieselCommunicationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CommunicationRepository for DieselCommunicationRepository {
    async fn active_requests(&self) -> Result<Vec<CommunicationRequest>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let active = enum_to_db(&RequestStatus::Active, "request status")?;
        let rows: Vec<CommunicationRequestRow> = communication_requests::table
            .filter(communication_requests::status.eq(active))
            .order(communication_requests::id.asc())
            .select(CommunicationRequestRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(row_to_request).collect()
    }

    async fn communications_for(
        &self,
        user: UserId,
    ) -> Result<Vec<Communication>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<CommunicationRow> = communications::table
            .filter(communications::user_id.eq(user.value()))
            .order(communications::id.asc())
            .select(CommunicationRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(row_to_communication).collect()
    }

    async fn insert(
        &self,
        communication: Communication,
    ) -> Result<Communication, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        // A unique index on (user, request, iteration) backs the
        // at-most-once reminder guarantee.
        let stored: CommunicationRow = diesel::insert_into(communications::table)
            .values(&communication_to_row(&communication)?)
            .returning(CommunicationRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        row_to_communication(stored)
    }

    async fn update_status(
        &self,
        id: i64,
        status: CommunicationStatus,
        message_ref: Option<String>,
    ) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let status = enum_to_db(&status, "communication status")?;
        let updated = diesel::update(communications::table.filter(communications::id.eq(id)))
            .set((
                communications::status.eq(status),
                communications::message_ref.eq(message_ref),
            ))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        if updated == 0 {
            return Err(StoreError::not_found(format!("communication {id}")));
        }
        Ok(())
    }

    async fn save_request(
        &self,
        request: CommunicationRequest,
    ) -> Result<CommunicationRequest, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let new_row = request_to_row(&request)?;
        let stored: CommunicationRequestRow = if request.id == 0 {
            diesel::insert_into(communication_requests::table)
                .values(&new_row)
                .returning(CommunicationRequestRow::as_returning())
                .get_result(&mut conn)
                .await
                .map_err(map_diesel_error)?
        } else {
            diesel::update(
                communication_requests::table
                    .filter(communication_requests::id.eq(request.id)),
            )
            .set(&new_row)
            .returning(CommunicationRequestRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?
        };
        row_to_request(stored)
    }
}
