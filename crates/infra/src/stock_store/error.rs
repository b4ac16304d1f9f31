//! Storage error model and SQLx error mapping.
//!
//! | SQLx error | Kind | Typical cause |
//! |------------|------|---------------|
//! | Database: unique / foreign key / not null / check | `Integrity` | duplicate `(product_id, store_id)` row, negative or overflowed units |
//! | Database: anything else | `Statement` | trigger abort, malformed SQL, missing table |
//! | Io / Tls / Protocol / PoolTimedOut / PoolClosed / WorkerCrashed | `Connectivity` | database unreachable or pool shut down |
//! | RowNotFound / ColumnNotFound / ColumnDecode / Decode | `Decode` | row shape differs from the schema we rely on |

use sqlx::error::ErrorKind;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StockStoreError {
    #[error("connectivity failure: {0}")]
    Connectivity(String),

    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("statement failed: {0}")]
    Statement(String),

    #[error("row decode failed: {0}")]
    Decode(String),
}

/// Map SQLx errors to `StockStoreError`, tagging the message with `operation`.
pub fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StockStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.kind() {
                ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation => StockStoreError::Integrity(msg),
                _ => StockStoreError::Statement(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StockStoreError::Connectivity(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::PoolTimedOut => {
            StockStoreError::Connectivity(format!("timed out acquiring a connection in {operation}"))
        }
        err @ (sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::WorkerCrashed) => {
            StockStoreError::Connectivity(format!("sqlx error in {operation}: {err}"))
        }
        err @ (sqlx::Error::RowNotFound
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)) => {
            StockStoreError::Decode(format!("sqlx error in {operation}: {err}"))
        }
        _ => StockStoreError::Statement(format!("sqlx error in {operation}: {err}")),
    }
}
