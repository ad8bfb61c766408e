//! Diesel-backed store for OAuth clients, grants, and tokens.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::error_mapping::{map_diesel_error, map_pool_error};
use super::models::{
    client_to_row, grant_to_row, row_to_client, row_to_grant, row_to_token, token_to_row,
    ClientRow, GrantRow, TokenRow,
};
use super::pool::DbPool;
use super::schema::{oauth_clients, oauth_grants, oauth_tokens};
use crate::domain::identity::UserId;
use crate::domain::oauth::{Client, Grant, Token};
use crate::domain::ports::{OAuthStore, StoreError};

#[derive(Clone)]
pub struct DieselOAuthStore {
    pool: DbPool,
}

impl DieselOAuthStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OAuthStore for DieselOAuthStore {
    async fn client(&self, client_id: &str) -> Result<Option<Client>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<ClientRow> = oauth_clients::table
            .filter(oauth_clients::client_id.eq(client_id))
            .select(ClientRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(row_to_client).transpose()
    }

    async fn clients(&self) -> Result<Vec<Client>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<ClientRow> = oauth_clients::table
            .order(oauth_clients::client_id.asc())
            .select(ClientRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(row_to_client).collect()
    }

    async fn save_client(&self, client: Client) -> Result<Client, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = client_to_row(&client)?;
        let stored: ClientRow = diesel::insert_into(oauth_clients::table)
            .values(&row)
            .on_conflict(oauth_clients::client_id)
            .do_update()
            .set(&row)
            .returning(ClientRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        row_to_client(stored)
    }

    async fn insert_grant(&self, grant: Grant) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::insert_into(oauth_grants::table)
            .values(&grant_to_row(&grant)?)
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(())
    }

    async fn take_grant(&self, code: &str) -> Result<Option<Grant>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        // Delete-returning keeps codes single use under concurrent exchange.
        let row: Option<GrantRow> =
            diesel::delete(oauth_grants::table.filter(oauth_grants::code.eq(code)))
                .returning(GrantRow::as_returning())
                .get_result(&mut conn)
                .await
                .optional()
                .map_err(map_diesel_error)?;
        row.map(row_to_grant).transpose()
    }

    async fn tokens_for(
        &self,
        client_id: &str,
        user: UserId,
    ) -> Result<Vec<Token>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<TokenRow> = oauth_tokens::table
            .filter(oauth_tokens::client_id.eq(client_id))
            .filter(oauth_tokens::user_id.eq(user.value()))
            .select(TokenRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(row_to_token).collect()
    }

    async fn token_by_access(&self, access_token: &str) -> Result<Option<Token>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row: Option<TokenRow> = oauth_tokens::table
            .filter(oauth_tokens::access_token.eq(access_token))
            .select(TokenRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(row_to_token).transpose()
    }

    async fn insert_token(&self, token: Token) -> Result<(), StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::insert_into(oauth_tokens::table)
            .values(&token_to_row(&token)?)
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(())
    }

    async fn delete_tokens(&self, client_id: &str, user: UserId) -> Result<u64, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let deleted = diesel::delete(
            oauth_tokens::table
                .filter(oauth_tokens::client_id.eq(client_id))
                .filter(oauth_tokens::user_id.eq(user.value())),
        )
        .execute(&mut conn)
        .await
        .map_err(map_diesel_error)?;
        Ok(deleted as u64)
    }

    async fn delete_user_tokens(&self, user: UserId) -> Result<u64, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let deleted =
            diesel::delete(oauth_tokens::table.filter(oauth_tokens::user_id.eq(user.value())))
                .execute(&mut conn)
                .await
                .map_err(map_diesel_error)?;
        Ok(deleted as u64)
    }
}
