//! Shared translation of pool and Diesel failures into store errors.

use diesel::result::{DatabaseErrorKind, Error as DieselError};

use super::pool::PoolError;
use crate::domain::ports::StoreError;

/// Map a pool checkout failure. The store is unreachable either way.
pub(super) fn map_pool_error(err: PoolError) -> StoreError {
    tracing::debug!(error = %err, "connection pool error");
    StoreError::unavailable(err.to_string())
}

/// Map a Diesel error to the store-error taxonomy.
///
/// `NotFound` keeps its meaning, unique and check violations become
/// conflicts, closed connections surface as unavailability, and anything
/// else is treated as a malformed interaction with the store.
pub(super) fn map_diesel_error(err: DieselError) -> StoreError {
    tracing::debug!(error = %err, "diesel error");
    match err {
        DieselError::NotFound => StoreError::not_found("record not found"),
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
            StoreError::conflict(info.message().to_owned())
        }
        DieselError::DatabaseError(DatabaseErrorKind::CheckViolation, info)
        | DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
            StoreError::conflict(info.message().to_owned())
        }
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, info) => {
            StoreError::unavailable(info.message().to_owned())
        }
        other => StoreError::malformed(other.to_string()),
    }
}
