//! Port traits for content repositories.
//!
//! These traits define the storage interface used by the domain layer.
//! Implementations live in the infrastructure layer (e.g., `vellum-storage`).

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::models::{ContentRecord, SourceType};

use super::filter::CanonicalPredicateSet;
use super::pagination::{PageDirection, Sort, SortValue};

// =============================================================================
// Fetch Specification
// =============================================================================

/// A remembered position in the total order of a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct KeysetPosition {
    pub value: SortValue,
    pub id: i64,
    pub source_type: SourceType,
}

impl KeysetPosition {
    pub fn of(record: &ContentRecord, sort: Sort) -> Self {
        Self {
            value: sort.field.value_of(record),
            id: record.id,
            source_type: record.source_type,
        }
    }
}

/// Which slice of the ordered listing to read.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchWindow {
    /// `OFFSET offset LIMIT limit` in listing order.
    Offset { offset: u64, limit: u32 },
    /// Up to `limit` rows strictly after (forward) or before (backward)
    /// `after`. Backward windows are returned in reversed listing order.
    Keyset {
        after: Option<KeysetPosition>,
        direction: PageDirection,
        limit: u32,
    },
}

impl FetchWindow {
    pub fn limit(&self) -> u32 {
        match self {
            Self::Offset { limit, .. } | Self::Keyset { limit, .. } => *limit,
        }
    }
}

/// How the total row count is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountStrategy {
    /// Window function in the page statement.
    Exact,
    /// No count at all.
    Omitted,
    /// Planner estimate when it reaches `threshold`, exact count below it.
    Estimated { threshold: u64 },
}

/// Everything a repository needs to run one page query.
#[derive(Debug, Clone)]
pub struct FetchSpec<'a> {
    pub predicates: &'a CanonicalPredicateSet,
    pub sort: Sort,
    pub window: FetchWindow,
    pub count: CountStrategy,
}

/// Total row count attached to a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TotalCount {
    Exact(u64),
    Estimated(u64),
}

impl TotalCount {
    pub fn value(&self) -> u64 {
        match self {
            Self::Exact(n) | Self::Estimated(n) => *n,
        }
    }

    pub fn is_estimated(&self) -> bool {
        matches!(self, Self::Estimated(_))
    }
}

/// Rows read by one page query.
#[derive(Debug, Clone, Default)]
pub struct FetchedRows {
    pub rows: Vec<ContentRecord>,
    /// `None` when counting was omitted, or when an exact window count
    /// produced no rows to carry it.
    pub total: Option<TotalCount>,
}

// =============================================================================
// Repository Traits
// =============================================================================

/// Read access to the partitioned content store.
#[async_trait]
pub trait ContentRepository: Send + Sync {
    /// Run exactly one page statement.
    ///
    /// Callers never pass an empty predicate set.
    async fn fetch_page(&self, spec: &FetchSpec<'_>) -> StorageResult<FetchedRows>;
}
