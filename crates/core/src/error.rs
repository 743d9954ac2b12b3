//! Error types for the listing engine.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`DomainError`] - Filter and sort validation failures
//! - [`StorageError`] - Database/repository errors
//! - [`CursorError`] - Cursor token decoding and replay failures
//! - [`ListingError`] - Top-level errors returned by the listing service
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries. Every [`ListingError`]
//! maps to a stable, machine-readable [`ErrorKind`].

use std::fmt;

use serde::Serialize;
use thiserror::Error;

// =============================================================================
// Domain Errors
// =============================================================================

/// Filter and sort validation failures.
///
/// These are raised by the filter resolver before any query is built.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A filter parameter could not be parsed or is out of bounds.
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// An ownership-scoped selection was requested without a caller identity.
    #[error("Selection '{0}' requires a caller identity")]
    MissingUserContext(String),

    /// The sort field or sort order is not supported.
    #[error("Invalid sort: {0}")]
    InvalidSort(String),
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Database and repository errors.
///
/// Timeouts and pool exhaustion have their own variants so callers can
/// retry or narrow their filters instead of treating them as generic failures.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to establish or keep a database connection.
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    /// No pooled connection became available within the acquire timeout.
    #[error("Connection pool exhausted: {0}")]
    PoolExhausted(String),

    /// The statement was cancelled by the server-side statement timeout.
    #[error("Statement timeout: {0}")]
    StatementTimeout(String),

    /// SQL query execution failed.
    #[error("Query execution error: {0}")]
    QueryError(String),

    /// Data serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

// =============================================================================
// Cursor Errors
// =============================================================================

/// Cursor token failures.
///
/// A cursor is a precise bookmark: every one of these surfaces to the caller
/// as `INVALID_CURSOR` and never falls back to the first page.
#[derive(Debug, Error)]
pub enum CursorError {
    /// The token is not valid base64 / JSON or is structurally wrong.
    #[error("malformed cursor: {0}")]
    Malformed(String),

    /// The token signature is missing or does not verify.
    #[error("cursor signature verification failed")]
    BadSignature,

    /// The token was minted by an incompatible cursor format.
    #[error("unsupported cursor version {0}")]
    UnsupportedVersion(u8),

    /// The token was minted under a different sort configuration.
    #[error("cursor was issued for sort {found}, request uses {expected}")]
    SortMismatch {
        /// Sort configuration of the current request.
        expected: String,
        /// Sort configuration embedded in the token.
        found: String,
    },

    /// The token was minted under a different filter set.
    #[error("cursor was issued for a different filter set")]
    FilterMismatch,

    /// The embedded sort value does not fit the sort field.
    #[error("invalid cursor value: {0}")]
    InvalidValue(String),

    /// The token could not be produced.
    #[error("cursor encoding failed: {0}")]
    Encoding(String),
}

// =============================================================================
// Listing Errors
// =============================================================================

/// Top-level errors returned by [`crate::services::ListingService`].
#[derive(Debug, Error)]
pub enum ListingError {
    /// Page size outside `1..=max`.
    #[error("page_size must be between 1 and {max}, got {value}")]
    InvalidPageSize {
        /// Requested page size.
        value: i64,
        /// Configured upper bound.
        max: u32,
    },

    /// Page number below 1.
    #[error("page must be at least 1, got {0}")]
    InvalidPage(i64),

    /// Both `page` and `cursor` were supplied.
    #[error("page and cursor are mutually exclusive")]
    ConflictingPagination,

    /// The cursor could not be decoded or does not fit the request.
    #[error("Invalid cursor: {0}")]
    InvalidCursor(#[from] CursorError),

    /// Offset page beyond the last page of results.
    #[error("page {page} is beyond the available range")]
    PageOutOfRange {
        /// Requested page.
        page: u32,
    },

    /// Filter or sort validation error.
    #[error("{0}")]
    Domain(#[from] DomainError),

    /// Storage/database error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ListingError {
    /// Machine-readable kind for transports.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidPageSize { .. } => ErrorKind::InvalidPageSize,
            Self::InvalidPage(_) => ErrorKind::InvalidPage,
            Self::ConflictingPagination => ErrorKind::ConflictingPagination,
            Self::InvalidCursor(_) => ErrorKind::InvalidCursor,
            Self::PageOutOfRange { .. } => ErrorKind::PageOutOfRange,
            Self::Domain(DomainError::InvalidSort(_)) => ErrorKind::InvalidSort,
            Self::Domain(_) => ErrorKind::InvalidFilter,
            Self::Storage(StorageError::StatementTimeout(_)) => ErrorKind::StatementTimeout,
            Self::Storage(StorageError::PoolExhausted(_)) => ErrorKind::ResourceExhausted,
            Self::Storage(_) => ErrorKind::StorageError,
        }
    }
}

/// Stable error kinds exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidPageSize,
    InvalidPage,
    InvalidCursor,
    ConflictingPagination,
    PageOutOfRange,
    InvalidFilter,
    InvalidSort,
    StatementTimeout,
    ResourceExhausted,
    StorageError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidPageSize => "INVALID_PAGE_SIZE",
            Self::InvalidPage => "INVALID_PAGE",
            Self::InvalidCursor => "INVALID_CURSOR",
            Self::ConflictingPagination => "CONFLICTING_PAGINATION",
            Self::PageOutOfRange => "PAGE_OUT_OF_RANGE",
            Self::InvalidFilter => "INVALID_FILTER",
            Self::InvalidSort => "INVALID_SORT",
            Self::StatementTimeout => "STATEMENT_TIMEOUT",
            Self::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Self::StorageError => "STORAGE_ERROR",
        }
    }

    /// Whether the caller sent something the engine rejects outright.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            Self::StatementTimeout | Self::ResourceExhausted | Self::StorageError
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for listing operations.
pub type ListingResult<T> = Result<T, ListingError>;

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    // Test critique: un timeout ne doit jamais être confondu avec une erreur générique
    #[test]
    fn test_resource_errors_keep_distinct_kinds() {
        let timeout: ListingError = StorageError::StatementTimeout("57014".into()).into();
        let pool: ListingError = StorageError::PoolExhausted("acquire".into()).into();
        let other: ListingError = StorageError::QueryError("syntax".into()).into();

        assert_eq!(timeout.kind(), ErrorKind::StatementTimeout);
        assert_eq!(pool.kind(), ErrorKind::ResourceExhausted);
        assert_eq!(other.kind(), ErrorKind::StorageError);
        assert!(!timeout.kind().is_client_error());
    }

    // Test critique: la chaîne de conversion d'erreurs fonctionne
    #[test]
    fn test_error_conversion_chain() {
        let cursor_err = CursorError::FilterMismatch;
        let listing_err: ListingError = cursor_err.into();
        assert_eq!(listing_err.kind(), ErrorKind::InvalidCursor);
        assert!(listing_err.to_string().contains("different filter set"));

        let domain_err = DomainError::InvalidSort("popularity".into());
        let listing_err: ListingError = domain_err.into();
        assert_eq!(listing_err.kind(), ErrorKind::InvalidSort);
        assert!(listing_err.kind().is_client_error());
    }

    #[test]
    fn test_kind_wire_format() {
        assert_eq!(ErrorKind::InvalidPageSize.to_string(), "INVALID_PAGE_SIZE");
        assert_eq!(
            serde_json::to_string(&ErrorKind::PageOutOfRange).unwrap(),
            "\"PAGE_OUT_OF_RANGE\""
        );
    }
}
