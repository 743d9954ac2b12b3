//! In-memory content repository for tests.
//!
//! Evaluates [`FetchSpec`]s with the same predicates, total order and
//! keyset semantics as the PostgreSQL adapter, and counts the page
//! statements it receives.

use std::cmp::Ordering;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use async_trait::async_trait;

use crate::error::{StorageError, StorageResult};
use crate::models::ContentRecord;
use crate::ports::{
    CanonicalPredicateSet, ContentRepository, CountStrategy, CreatorPredicate, FetchSpec,
    FetchWindow, FetchedRows, KeysetPosition, OrderDirection, PageDirection, Sort, TagMatch,
    TotalCount,
};

#[derive(Default)]
pub struct InMemoryContentRepository {
    rows: Mutex<Vec<ContentRecord>>,
    queries: AtomicUsize,
    fail_next: Mutex<Option<StorageError>>,
    last_fetch: Mutex<Option<(FetchWindow, CountStrategy)>>,
}

impl InMemoryContentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<ContentRecord>) -> Self {
        Self {
            rows: Mutex::new(rows),
            ..Default::default()
        }
    }

    pub fn insert(&self, record: ContentRecord) {
        self.rows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
    }

    /// Number of page statements executed so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(AtomicOrdering::SeqCst)
    }

    /// Window and count strategy of the most recent fetch.
    pub fn last_fetch(&self) -> Option<(FetchWindow, CountStrategy)> {
        self.last_fetch.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Make the next fetch fail with `error`.
    pub fn fail_next(&self, error: StorageError) {
        *self.fail_next.lock().unwrap_or_else(|e| e.into_inner()) = Some(error);
    }
}

#[async_trait]
impl ContentRepository for InMemoryContentRepository {
    async fn fetch_page(&self, spec: &FetchSpec<'_>) -> StorageResult<FetchedRows> {
        self.queries.fetch_add(1, AtomicOrdering::SeqCst);
        *self.last_fetch.lock().unwrap_or_else(|e| e.into_inner()) =
            Some((spec.window.clone(), spec.count));
        if let Some(error) = self.fail_next.lock().unwrap_or_else(|e| e.into_inner()).take() {
            return Err(error);
        }

        let mut matching: Vec<ContentRecord> = self
            .rows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| matches(r, spec.predicates))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            compare(&KeysetPosition::of(a, spec.sort), &KeysetPosition::of(b, spec.sort), spec.sort)
        });

        match &spec.window {
            FetchWindow::Offset { offset, limit } => {
                let total = matching.len() as u64;
                let rows: Vec<_> = matching
                    .into_iter()
                    .skip(*offset as usize)
                    .take(*limit as usize)
                    .collect();
                let total = match spec.count {
                    CountStrategy::Omitted => None,
                    CountStrategy::Estimated { threshold } if total >= threshold => {
                        Some(TotalCount::Estimated(total))
                    }
                    // The window count rides on returned rows only
                    _ if rows.is_empty() => None,
                    _ => Some(TotalCount::Exact(total)),
                };
                Ok(FetchedRows { rows, total })
            }
            FetchWindow::Keyset {
                after,
                direction,
                limit,
            } => {
                let wanted = match direction {
                    PageDirection::Forward => Ordering::Greater,
                    PageDirection::Backward => Ordering::Less,
                };
                let mut rows: Vec<_> = matching
                    .into_iter()
                    .filter(|r| match after {
                        Some(position) => {
                            compare(&KeysetPosition::of(r, spec.sort), position, spec.sort) == wanted
                        }
                        None => true,
                    })
                    .collect();
                if *direction == PageDirection::Backward {
                    rows.reverse();
                }
                rows.truncate(*limit as usize);
                Ok(FetchedRows { rows, total: None })
            }
        }
    }
}

fn matches(record: &ContentRecord, predicates: &CanonicalPredicateSet) -> bool {
    let source_ok = predicates.sources.iter().any(|s| {
        s.source_type == record.source_type
            && match s.creator {
                CreatorPredicate::Any => true,
                CreatorPredicate::Is(user) => record.creator_id == user,
                CreatorPredicate::IsNot(user) => record.creator_id != user,
            }
    });

    let tags_ok = predicates.tags.as_ref().is_none_or(|t| match t.mode {
        TagMatch::Any => t.tags.iter().any(|tag| record.tags.contains(tag)),
        TagMatch::All => t.tags.iter().all(|tag| record.tags.contains(tag)),
    });

    let search_ok = predicates
        .search_term
        .as_ref()
        .is_none_or(|term| record.title.to_lowercase().contains(&term.to_lowercase()));

    let quality = predicates.quality;
    let quality_ok = quality.is_unbounded()
        || record.quality_score.is_some_and(|q| {
            quality.min.is_none_or(|min| q >= min) && quality.max.is_none_or(|max| q <= max)
        });

    source_ok && tags_ok && search_ok && quality_ok
}

/// Listing order: sort value (NULLS LAST), then `id DESC`, then `source_type DESC`.
fn compare(a: &KeysetPosition, b: &KeysetPosition, sort: Sort) -> Ordering {
    let primary = match (a.value.is_null(), b.value.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            let ord = a.value.partial_cmp_non_null(&b.value).unwrap_or(Ordering::Equal);
            match sort.order {
                OrderDirection::Asc => ord,
                OrderDirection::Desc => ord.reverse(),
            }
        }
    };
    primary
        .then_with(|| b.id.cmp(&a.id))
        .then_with(|| b.source_type.cmp(&a.source_type))
}
