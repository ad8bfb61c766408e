//! Port for OAuth clients, grants, and tokens.

use async_trait::async_trait;

use super::StoreError;
use crate::domain::identity::UserId;
use crate::domain::oauth::{Client, Grant, Token};

#[async_trait]
pub trait OAuthStore: Send + Sync {
    async fn client(&self, client_id: &str) -> Result<Option<Client>, StoreError>;

    async fn clients(&self) -> Result<Vec<Client>, StoreError>;

    async fn save_client(&self, client: Client) -> Result<Client, StoreError>;

    async fn insert_grant(&self, grant: Grant) -> Result<(), StoreError>;

    /// Remove and return the grant for `code`. Single use: a second take of
    /// the same code yields `None`.
    async fn take_grant(&self, code: &str) -> Result<Option<Grant>, StoreError>;

    async fn tokens_for(&self, client_id: &str, user: UserId)
        -> Result<Vec<Token>, StoreError>;

    async fn token_by_access(&self, access_token: &str)
        -> Result<Option<Token>, StoreError>;

    async fn insert_token(&self, token: Token) -> Result<(), StoreError>;

    /// Delete every token for one (client, user) pair, returning the count.
    async fn delete_tokens(&self, client_id: &str, user: UserId) -> Result<u64, StoreError>;

    /// Delete every token across clients for one user, returning the count.
    async fn delete_user_tokens(&self, user: UserId) -> Result<u64, StoreError>;
}
