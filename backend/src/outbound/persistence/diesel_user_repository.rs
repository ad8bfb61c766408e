//! Diesel-backed user repository.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde_json::json;

use super::error_mapping::{map_diesel_error, map_pool_error};
use super::models::{row_to_user, user_to_row, UserRow};
use super::pool::DbPool;
use super::schema::{sponsorships, user_organizations, users};
use crate::domain::identity::{User, UserId};
use crate::domain::organization::OrganizationId;
use crate::domain::ports::{StoreError, UserRepository};

#[derive(Clone)]
pub struct DieselUserRepository {
    pool: DbPool,
}

impl DieselUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for DieselUserRepository {
    async fn find(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<UserRow> = users::table
            .filter(users::id.eq(id.value()))
            .filter(users::deleted.eq(false))
            .select(UserRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(row_to_user).transpose()
    }

    async fn find_by_identifier(
        &self,
        system: &str,
        value: &str,
    ) -> Result<Option<User>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        // jsonb containment on the identifier array.
        let needle = json!([{ "system": system, "value": value }]);
        let row: Option<UserRow> = users::table
            .filter(users::identifiers.contains(needle))
            .filter(users::deleted.eq(false))
            .select(UserRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(row_to_user).transpose()
    }

    async fn save(&self, user: User) -> Result<User, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let new_row = user_to_row(&user)?;
        let stored: UserRow = if user.id.value() == 0 {
            diesel::insert_into(users::table)
                .values(&new_row)
                .returning(UserRow::as_returning())
                .get_result(&mut conn)
                .await
                .map_err(map_diesel_error)?
        } else {
            diesel::update(users::table.filter(users::id.eq(user.id.value())))
                .set(&new_row)
                .returning(UserRow::as_returning())
                .get_result(&mut conn)
                .await
                .map_err(map_diesel_error)?
        };
        row_to_user(stored)
    }

    async fn organizations_of(&self, user: UserId) -> Result<Vec<OrganizationId>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let ids: Vec<i64> = user_organizations::table
            .filter(user_organizations::user_id.eq(user.value()))
            .select(user_organizations::organization_id)
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(ids.into_iter().map(OrganizationId::new).collect())
    }

    async fn sponsored_service_users(&self, sponsor: UserId) -> Result<Vec<UserId>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let ids: Vec<i64> = sponsorships::table
            .filter(sponsorships::sponsor_user_id.eq(sponsor.value()))
            .select(sponsorships::service_user_id)
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(ids.into_iter().map(UserId::new).collect())
    }
}
