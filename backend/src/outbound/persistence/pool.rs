//! bb8-backed pool of async Diesel Postgres connections.
//!
//! Repositories hold a cloned [`DbPool`] and check connections out per
//! operation. Checkout waits at most the configured timeout; both build and
//! checkout failures surface as [`PoolError`] and are translated to store
//! errors in `error_mapping`.

use std::time::Duration;

use diesel_async::AsyncPgConnection;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};

/// Failure modes of the connection pool.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// No connection became available within the checkout timeout.
    #[error("pool checkout failed: {0}")]
    Checkout(String),

    /// The pool itself could not be constructed.
    #[error("pool construction failed: {0}")]
    Build(String),
}

impl PoolError {
    pub fn checkout(message: impl Into<String>) -> Self {
        Self::Checkout(message.into())
    }

    pub fn build(message: impl Into<String>) -> Self {
        Self::Build(message.into())
    }
}

/// Pool sizing and timeout knobs.
///
/// The defaults (ten connections, two kept idle, thirty-second checkout)
/// suit one backend replica against a modestly sized Postgres instance.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    database_url: String,
    max_connections: u32,
    min_idle: Option<u32>,
    checkout_timeout: Duration,
}

impl PoolConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 10,
            min_idle: Some(2),
            checkout_timeout: Duration::from_secs(30),
        }
    }

    pub fn max_connections(mut self, limit: u32) -> Self {
        self.max_connections = limit;
        self
    }

    pub fn min_idle(mut self, idle: Option<u32>) -> Self {
        self.min_idle = idle;
        self
    }

    pub fn checkout_timeout(mut self, timeout: Duration) -> Self {
        self.checkout_timeout = timeout;
        self
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }
}

/// Cloneable handle over the shared connection pool.
#[derive(Clone)]
pub struct DbPool {
    inner: Pool<AsyncPgConnection>,
}

impl DbPool {
    /// # Errors
    /// Returns [`PoolError::Build`] when the pool cannot be constructed.
    pub async fn new(config: PoolConfig) -> Result<Self, PoolError> {
        let manager =
            AsyncDieselConnectionManager::<AsyncPgConnection>::new(config.database_url.as_str());
        Pool::builder()
            .max_size(config.max_connections)
            .min_idle(config.min_idle)
            .connection_timeout(config.checkout_timeout)
            .build(manager)
            .await
            .map(|inner| Self { inner })
            .map_err(|err| PoolError::build(err.to_string()))
    }

    /// # Errors
    /// Returns [`PoolError::Checkout`] when no connection arrives within
    /// the configured timeout.
    pub async fn get(&self) -> Result<PooledConnection<'_, AsyncPgConnection>, PoolError> {
        self.inner
            .get()
            .await
            .map_err(|err| PoolError::checkout(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn defaults_fit_a_single_replica() {
        let config = PoolConfig::new("postgres://localhost/portal");
        assert_eq!(config.database_url(), "postgres://localhost/portal");
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_idle, Some(2));
        assert_eq!(config.checkout_timeout, Duration::from_secs(30));
    }

    #[rstest]
    fn knobs_override_the_defaults() {
        let config = PoolConfig::new("postgres://localhost/portal")
            .max_connections(32)
            .min_idle(None)
            .checkout_timeout(Duration::from_secs(3));
        assert_eq!(config.max_connections, 32);
        assert_eq!(config.min_idle, None);
        assert_eq!(config.checkout_timeout, Duration::from_secs(3));
    }

    #[rstest]
    fn errors_carry_their_cause() {
        assert!(
            PoolError::checkout("timed out after 30s")
                .to_string()
                .contains("timed out")
        );
        assert!(PoolError::build("bad url").to_string().contains("bad url"));
    }
}
