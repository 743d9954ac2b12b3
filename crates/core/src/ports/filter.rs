//! Filter resolution.
//!
//! Callers describe what they want to see either with an explicit
//! [`SourceTypeSelector`] (any subset of the four user/community ×
//! regular/auto combinations) or with the legacy `content_types` +
//! `creator_filter` pair. [`resolve`] normalizes both into a
//! [`CanonicalPredicateSet`]: a disjunction of `(source_type, creator)`
//! predicates plus the tag, search and quality filters.
//!
//! The legacy pair is a cross product and can only express 9 of the 16
//! selector subsets (e.g. "own regular + community auto" is out of reach).
//! Callers depend on that narrower behavior, so it is kept as is.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{DomainError, DomainResult};
use crate::models::{SourceType, UserId};

/// Maximum number of tags in one filter.
pub const MAX_TAGS: usize = 32;
/// Maximum length of a single tag.
pub const MAX_TAG_LENGTH: usize = 64;
/// Maximum length of a search term.
pub const MAX_SEARCH_TERM_LENGTH: usize = 200;

// =============================================================================
// Selector
// =============================================================================

/// Who created a row, relative to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Ownership {
    User,
    Community,
}

/// One of the four canonical source combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceCombination {
    UserRegular,
    UserAuto,
    CommunityRegular,
    CommunityAuto,
}

impl SourceCombination {
    pub const ALL: [SourceCombination; 4] = [
        SourceCombination::UserRegular,
        SourceCombination::UserAuto,
        SourceCombination::CommunityRegular,
        SourceCombination::CommunityAuto,
    ];

    pub fn new(source_type: SourceType, ownership: Ownership) -> Self {
        match (ownership, source_type) {
            (Ownership::User, SourceType::Regular) => Self::UserRegular,
            (Ownership::User, SourceType::Auto) => Self::UserAuto,
            (Ownership::Community, SourceType::Regular) => Self::CommunityRegular,
            (Ownership::Community, SourceType::Auto) => Self::CommunityAuto,
        }
    }

    pub fn token(&self) -> &'static str {
        match self {
            Self::UserRegular => "user-regular",
            Self::UserAuto => "user-auto",
            Self::CommunityRegular => "community-regular",
            Self::CommunityAuto => "community-auto",
        }
    }

    pub fn source_type(&self) -> SourceType {
        match self {
            Self::UserRegular | Self::CommunityRegular => SourceType::Regular,
            Self::UserAuto | Self::CommunityAuto => SourceType::Auto,
        }
    }

    pub fn ownership(&self) -> Ownership {
        match self {
            Self::UserRegular | Self::UserAuto => Ownership::User,
            Self::CommunityRegular | Self::CommunityAuto => Ownership::Community,
        }
    }
}

impl FromStr for SourceCombination {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.token() == token)
            .ok_or_else(|| {
                DomainError::InvalidFilter(format!("unknown source type selector '{}'", s.trim()))
            })
    }
}

/// A set of zero to four source combinations.
///
/// `Some(SourceTypeSelector::empty())` is a request for zero rows and is
/// never treated like an omitted selector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceTypeSelector(BTreeSet<SourceCombination>);

impl SourceTypeSelector {
    pub fn empty() -> Self {
        Self(BTreeSet::new())
    }

    /// Parse selector tokens, rejecting anything unknown.
    pub fn parse<I, S>(tokens: I) -> DomainResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        tokens
            .into_iter()
            .map(|t| t.as_ref().parse::<SourceCombination>())
            .collect::<DomainResult<BTreeSet<_>>>()
            .map(Self)
    }

    /// Parse a comma-separated list. The empty string is the empty selection.
    pub fn parse_csv(s: &str) -> DomainResult<Self> {
        Self::parse(s.split(',').map(str::trim).filter(|t| !t.is_empty()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, combination: SourceCombination) -> bool {
        self.0.contains(&combination)
    }

    pub fn iter(&self) -> impl Iterator<Item = SourceCombination> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<SourceCombination> for SourceTypeSelector {
    fn from_iter<T: IntoIterator<Item = SourceCombination>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

// =============================================================================
// Legacy parameters and auxiliary filters
// =============================================================================

/// Legacy ownership filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreatorFilter {
    #[default]
    All,
    User,
    Community,
}

impl CreatorFilter {
    fn ownerships(&self) -> &'static [Ownership] {
        match self {
            Self::All => &[Ownership::User, Ownership::Community],
            Self::User => &[Ownership::User],
            Self::Community => &[Ownership::Community],
        }
    }
}

impl FromStr for CreatorFilter {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "user" => Ok(Self::User),
            "community" => Ok(Self::Community),
            other => Err(DomainError::InvalidFilter(format!(
                "unknown creator filter '{}'",
                other
            ))),
        }
    }
}

/// How a multi-tag filter combines its tags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagMatch {
    /// At least one tag present (overlap).
    #[default]
    Any,
    /// Every tag present (containment).
    All,
}

impl TagMatch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::All => "all",
        }
    }
}

impl FromStr for TagMatch {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any" => Ok(Self::Any),
            "all" => Ok(Self::All),
            other => Err(DomainError::InvalidFilter(format!(
                "unknown tag match mode '{}', expected 'any' or 'all'",
                other
            ))),
        }
    }
}

/// Inclusive quality-score bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QualityRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl QualityRange {
    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    fn validate(&self) -> DomainResult<()> {
        for bound in [self.min, self.max].into_iter().flatten() {
            if !(0.0..=1.0).contains(&bound) {
                return Err(DomainError::InvalidFilter(format!(
                    "quality bound {} is outside [0.0, 1.0]",
                    bound
                )));
            }
        }
        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                return Err(DomainError::InvalidFilter(format!(
                    "quality_min {} is greater than quality_max {}",
                    min, max
                )));
            }
        }
        Ok(())
    }
}

/// Everything a caller can say about which rows to list.
#[derive(Debug, Clone, Default)]
pub struct FilterRequest {
    /// Authoritative when present, even if empty.
    pub source_types: Option<SourceTypeSelector>,
    /// Legacy: subset of `{regular, auto}`; `None` or empty means both.
    pub content_types: Option<Vec<SourceType>>,
    /// Legacy: ownership side, default `all`.
    pub creator_filter: Option<CreatorFilter>,
    /// Caller identity, required for one-sided ownership filters.
    pub user_id: Option<UserId>,
    pub tags: Vec<String>,
    pub tag_match: TagMatch,
    pub search_term: Option<String>,
    pub quality: QualityRange,
}

// =============================================================================
// Canonical predicates
// =============================================================================

/// Creator condition attached to one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CreatorPredicate {
    Any,
    Is(UserId),
    IsNot(UserId),
}

/// One disjunct: rows of `source_type` whose creator satisfies `creator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourcePredicate {
    pub source_type: SourceType,
    pub creator: CreatorPredicate,
}

/// Normalized tag filter (trimmed, deduplicated, sorted).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagPredicate {
    pub tags: Vec<String>,
    pub mode: TagMatch,
}

/// Which relation a query can be confined to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionTarget {
    /// Only one partition can match; query it directly.
    Single(SourceType),
    /// Both partitions can match; query the combined relation.
    Combined,
}

impl PartitionTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single(source_type) => source_type.as_str(),
            Self::Combined => "combined",
        }
    }
}

/// Output of [`resolve`].
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalPredicateSet {
    /// At most one entry per source type, in [`SourceType::ALL`] order.
    pub sources: Vec<SourcePredicate>,
    pub tags: Option<TagPredicate>,
    /// Trimmed, non-empty search term.
    pub search_term: Option<String>,
    pub quality: QualityRange,
}

impl CanonicalPredicateSet {
    /// An empty disjunction matches nothing and must not reach the store.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Partition the query can be confined to, `None` for an empty set.
    pub fn partition_target(&self) -> Option<PartitionTarget> {
        match self.sources.as_slice() {
            [] => None,
            [only] => Some(PartitionTarget::Single(only.source_type)),
            _ => Some(PartitionTarget::Combined),
        }
    }

    /// Short digest identifying this predicate set.
    ///
    /// Embedded in cursors so a token cannot be replayed under other filters.
    pub fn signature(&self) -> String {
        let mut canonical = String::new();
        for source in &self.sources {
            let _ = match source.creator {
                CreatorPredicate::Any => write!(canonical, "src={}:any;", source.source_type),
                CreatorPredicate::Is(user) => {
                    write!(canonical, "src={}:is:{};", source.source_type, user)
                }
                CreatorPredicate::IsNot(user) => {
                    write!(canonical, "src={}:not:{};", source.source_type, user)
                }
            };
        }
        if let Some(tags) = &self.tags {
            let _ = write!(canonical, "tags={}:{};", tags.mode.as_str(), tags.tags.join("\u{1f}"));
        }
        if let Some(term) = &self.search_term {
            let _ = write!(canonical, "search={};", term.to_lowercase());
        }
        let _ = write!(
            canonical,
            "quality={:?}..{:?}",
            self.quality.min, self.quality.max
        );

        let digest = Sha256::digest(canonical.as_bytes());
        hex::encode(&digest[..8])
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Normalize a filter request into canonical predicates.
///
/// Unknown or contradictory input is rejected; nothing is widened silently.
pub fn resolve(request: &FilterRequest) -> DomainResult<CanonicalPredicateSet> {
    let combinations: BTreeSet<SourceCombination> = match &request.source_types {
        Some(selector) => selector.iter().collect(),
        None => legacy_combinations(
            request.content_types.as_deref(),
            request.creator_filter.unwrap_or_default(),
        ),
    };

    let mut sources = Vec::with_capacity(2);
    for source_type in SourceType::ALL {
        let user = SourceCombination::new(source_type, Ownership::User);
        let community = SourceCombination::new(source_type, Ownership::Community);

        let creator = match (combinations.contains(&user), combinations.contains(&community)) {
            (false, false) => continue,
            (true, true) => CreatorPredicate::Any,
            (true, false) => CreatorPredicate::Is(require_user(request.user_id, user)?),
            (false, true) => CreatorPredicate::IsNot(require_user(request.user_id, community)?),
        };
        sources.push(SourcePredicate {
            source_type,
            creator,
        });
    }

    request.quality.validate()?;

    Ok(CanonicalPredicateSet {
        sources,
        tags: normalize_tags(&request.tags, request.tag_match)?,
        search_term: normalize_search(request.search_term.as_deref())?,
        quality: request.quality,
    })
}

/// Cross product of the legacy `content_types` × `creator_filter` pair.
fn legacy_combinations(
    content_types: Option<&[SourceType]>,
    creator_filter: CreatorFilter,
) -> BTreeSet<SourceCombination> {
    let types: &[SourceType] = match content_types {
        Some(types) if !types.is_empty() => types,
        _ => &SourceType::ALL,
    };

    types
        .iter()
        .flat_map(|&st| {
            creator_filter
                .ownerships()
                .iter()
                .map(move |&ownership| SourceCombination::new(st, ownership))
        })
        .collect()
}

fn require_user(user_id: Option<UserId>, combination: SourceCombination) -> DomainResult<UserId> {
    user_id.ok_or_else(|| DomainError::MissingUserContext(combination.token().to_string()))
}

fn normalize_tags(tags: &[String], mode: TagMatch) -> DomainResult<Option<TagPredicate>> {
    let normalized: BTreeSet<String> = tags
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    if normalized.is_empty() {
        return Ok(None);
    }
    if normalized.len() > MAX_TAGS {
        return Err(DomainError::InvalidFilter(format!(
            "too many tags: maximum {} allowed",
            MAX_TAGS
        )));
    }
    if let Some(tag) = normalized.iter().find(|t| t.chars().count() > MAX_TAG_LENGTH) {
        return Err(DomainError::InvalidFilter(format!(
            "tag '{}' too long: maximum {} characters allowed",
            tag, MAX_TAG_LENGTH
        )));
    }

    Ok(Some(TagPredicate {
        tags: normalized.into_iter().collect(),
        mode,
    }))
}

fn normalize_search(term: Option<&str>) -> DomainResult<Option<String>> {
    let Some(term) = term.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    if term.chars().count() > MAX_SEARCH_TERM_LENGTH {
        return Err(DomainError::InvalidFilter(format!(
            "search_term too long: maximum {} characters allowed",
            MAX_SEARCH_TERM_LENGTH
        )));
    }
    Ok(Some(term.to_string()))
}
