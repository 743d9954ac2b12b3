//! Domain models representing listed content.
//!
//! These models are storage-agnostic and represent the canonical
//! form of a content row within the domain layer.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

// =============================================================================
// Identifiers
// =============================================================================

/// Identifier of a user, as assigned by the external identity system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse()
            .map(Self)
            .map_err(|_| DomainError::InvalidFilter(format!("invalid user id '{}'", s)))
    }
}

// =============================================================================
// Source Type
// =============================================================================

/// Partition discriminator: where a content row comes from.
///
/// The declaration order matches the storage ordering of the `source_type`
/// text column (`'auto' < 'regular'`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// System-generated content.
    Auto,
    /// User-authored content.
    Regular,
}

impl SourceType {
    /// Both partitions, in resolution order.
    pub const ALL: [SourceType; 2] = [SourceType::Regular, SourceType::Auto];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Auto => "auto",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "regular" => Ok(Self::Regular),
            "auto" => Ok(Self::Auto),
            other => Err(DomainError::InvalidFilter(format!(
                "unknown content type '{}', expected 'regular' or 'auto'",
                other
            ))),
        }
    }
}

// =============================================================================
// Content
// =============================================================================

/// The only globally unique identity of a content row.
///
/// `id` alone repeats across the two partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentKey {
    pub id: i64,
    pub source_type: SourceType,
}

/// A content row from either source partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: i64,
    pub source_type: SourceType,
    pub creator_id: UserId,
    pub created_at: DateTime<Utc>,
    /// Rating in `0.0..=1.0`, `None` when unrated.
    pub quality_score: Option<f64>,
    pub tags: Vec<String>,
    pub title: String,
}

impl ContentRecord {
    pub fn key(&self) -> ContentKey {
        ContentKey {
            id: self.id,
            source_type: self.source_type,
        }
    }
}
