//! Shared helper functions for PostgreSQL row conversion and error mapping.

use vellum_core::error::{StorageError, StorageResult};
use vellum_core::models::SourceType;

/// SQLSTATE raised when `statement_timeout` cancels a statement.
const QUERY_CANCELED: &str = "57014";

/// Classify a sqlx error.
///
/// Timeouts and pool exhaustion keep their own variants so they surface
/// as distinct error kinds instead of generic query failures.
pub fn map_query_error(error: sqlx::Error) -> StorageError {
    match &error {
        sqlx::Error::PoolTimedOut => StorageError::PoolExhausted(error.to_string()),
        sqlx::Error::Database(db) if db.code().as_deref() == Some(QUERY_CANCELED) => {
            StorageError::StatementTimeout(db.message().to_string())
        }
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolClosed => {
            StorageError::ConnectionError(error.to_string())
        }
        sqlx::Error::Decode(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_) => StorageError::SerializationError(error.to_string()),
        _ => StorageError::QueryError(error.to_string()),
    }
}

/// Parse the `source_type` discriminator column.
pub fn parse_source_type(value: &str, field_name: &str) -> StorageResult<SourceType> {
    match value {
        "regular" => Ok(SourceType::Regular),
        "auto" => Ok(SourceType::Auto),
        other => Err(StorageError::SerializationError(format!(
            "{} has unknown value '{}'",
            field_name, other
        ))),
    }
}
