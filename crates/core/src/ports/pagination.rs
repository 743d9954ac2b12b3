//! Pagination and sort types for list queries.
//!
//! Two mutually exclusive modes are supported: offset pagination
//! (`page`/`page_size`) and keyset pagination driven by an opaque cursor.
//! Both share one total order per sort field:
//!
//! ```text
//! sort_field <dir> NULLS LAST, id DESC, source_type DESC
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, ListingError, ListingResult};
use crate::models::{ContentRecord, SourceType};

/// Default page size when the caller does not send one.
pub const DEFAULT_PAGE_SIZE: u32 = 50;
/// Hard upper bound for a page.
pub const MAX_PAGE_SIZE: u32 = 1000;

// =============================================================================
// Sorting
// =============================================================================

/// Ordering direction for sorted queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    /// Ascending order (smallest first).
    Asc,
    /// Descending order (largest first).
    #[default]
    Desc,
}

impl OrderDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    pub fn reversed(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

impl FromStr for OrderDirection {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(DomainError::InvalidSort(format!(
                "unknown sort order '{}', expected 'asc' or 'desc'",
                other
            ))),
        }
    }
}

/// Supported sort fields.
///
/// | field           | nullable | NULL policy                    |
/// |-----------------|----------|--------------------------------|
/// | `created_at`    | no       | -                              |
/// | `quality_score` | yes      | `NULLS LAST` in both directions |
/// | `title`         | no       | -                              |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    CreatedAt,
    QualityScore,
    Title,
}

impl SortField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::QualityScore => "quality_score",
            Self::Title => "title",
        }
    }

    /// Column backing this field. Never derived from user input.
    pub fn column(&self) -> &'static str {
        self.as_str()
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, Self::QualityScore)
    }

    /// Extract the sort key of a row.
    pub fn value_of(&self, record: &ContentRecord) -> SortValue {
        match self {
            Self::CreatedAt => SortValue::Timestamp(record.created_at),
            Self::QualityScore => record
                .quality_score
                .map(SortValue::Float)
                .unwrap_or(SortValue::Null),
            Self::Title => SortValue::Text(record.title.clone()),
        }
    }

    /// Whether `value` has the right shape for this field.
    pub fn accepts(&self, value: &SortValue) -> bool {
        match (self, value) {
            (Self::CreatedAt, SortValue::Timestamp(_)) => true,
            (Self::QualityScore, SortValue::Float(v)) => v.is_finite(),
            (Self::QualityScore, SortValue::Null) => true,
            (Self::Title, SortValue::Text(_)) => true,
            _ => false,
        }
    }
}

impl FromStr for SortField {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created_at" => Ok(Self::CreatedAt),
            "quality_score" => Ok(Self::QualityScore),
            "title" => Ok(Self::Title),
            other => Err(DomainError::InvalidSort(format!(
                "unknown sort field '{}'",
                other
            ))),
        }
    }
}

/// Sort configuration of a listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sort {
    pub field: SortField,
    pub order: OrderDirection,
}

impl Sort {
    pub fn new(field: SortField, order: OrderDirection) -> Self {
        Self { field, order }
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field.as_str(), self.order.as_str())
    }
}

/// A typed sort key value, as remembered by a cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "lowercase")]
pub enum SortValue {
    Timestamp(DateTime<Utc>),
    Float(f64),
    Text(String),
    Null,
}

impl SortValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Compare two values of the same field, non-null values only.
    ///
    /// Returns `None` when either side is NULL or the shapes differ.
    pub fn partial_cmp_non_null(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Timestamp(a), Self::Timestamp(b)) => Some(a.cmp(b)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

// =============================================================================
// Page Requests
// =============================================================================

/// Direction a keyset page walks relative to its cursor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageDirection {
    /// Rows after the cursor in listing order.
    #[default]
    Forward,
    /// Rows before the cursor, one step back.
    Backward,
}

/// Pagination mode named explicitly by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaginationMode {
    Offset,
    Cursor,
}

impl FromStr for PaginationMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "offset" => Ok(Self::Offset),
            "cursor" | "keyset" => Ok(Self::Cursor),
            other => Err(DomainError::InvalidFilter(format!(
                "unknown pagination mode '{}', expected 'offset' or 'cursor'",
                other
            ))),
        }
    }
}

/// A validated pagination request. Exactly one mode is active.
///
/// `Cursor { cursor: None, .. }` is the first page of a keyset walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRequest {
    Offset { page: u32, page_size: u32 },
    Cursor { cursor: Option<String>, page_size: u32 },
}

impl PageRequest {
    /// Validate raw transport parameters.
    ///
    /// A cursor implies cursor mode. Without `page`, `cursor` or an explicit
    /// mode the request is the first offset page. An empty cursor string is
    /// rejected rather than treated as absent.
    pub fn from_params(
        page: Option<i64>,
        cursor: Option<String>,
        mode: Option<PaginationMode>,
        page_size: Option<i64>,
        default_page_size: u32,
        max_page_size: u32,
    ) -> ListingResult<Self> {
        let page_size = validate_page_size(page_size, default_page_size, max_page_size)?;

        match (page, cursor, mode) {
            (Some(_), Some(_), _)
            | (Some(_), None, Some(PaginationMode::Cursor))
            | (None, Some(_), Some(PaginationMode::Offset)) => {
                Err(ListingError::ConflictingPagination)
            }
            (None, Some(cursor), _) => {
                if cursor.trim().is_empty() {
                    return Err(ListingError::InvalidCursor(
                        crate::error::CursorError::Malformed("empty cursor".into()),
                    ));
                }
                Ok(Self::Cursor {
                    cursor: Some(cursor),
                    page_size,
                })
            }
            (None, None, Some(PaginationMode::Cursor)) => Ok(Self::Cursor {
                cursor: None,
                page_size,
            }),
            (Some(page), None, _) => {
                if page < 1 || page > i64::from(u32::MAX) {
                    return Err(ListingError::InvalidPage(page));
                }
                Ok(Self::Offset {
                    page: page as u32,
                    page_size,
                })
            }
            (None, None, _) => Ok(Self::Offset { page: 1, page_size }),
        }
    }

    pub fn page_size(&self) -> u32 {
        match self {
            Self::Offset { page_size, .. } | Self::Cursor { page_size, .. } => *page_size,
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            Self::Offset { .. } => "offset",
            Self::Cursor { .. } => "cursor",
        }
    }
}

fn validate_page_size(value: Option<i64>, default: u32, max: u32) -> ListingResult<u32> {
    let max = max.min(MAX_PAGE_SIZE);
    match value {
        None => Ok(default.clamp(1, max)),
        Some(v) if v >= 1 && v <= i64::from(max) => Ok(v as u32),
        Some(v) => Err(ListingError::InvalidPageSize { value: v, max }),
    }
}
