//! Listing service - serves one page of a filtered, sorted content listing.
//!
//! # Flow
//!
//! 1. Validate pagination parameters (no query on client errors)
//! 2. Resolve filters into canonical predicates
//! 3. Decode and check the inbound cursor, if any
//! 4. Short-circuit an empty selection without touching storage
//! 5. Run exactly one page statement
//! 6. Build the pagination envelope

use std::sync::Arc;

use tracing::{debug, error, instrument, warn};

use crate::cursor::CursorCodec;
use crate::error::{ErrorKind, ListingResult};
use crate::metrics::{QueryTimer, record_empty_selection, record_error, record_request, record_rows_returned};
use crate::models::ContentRecord;
use crate::ports::{
    ContentRepository, DEFAULT_PAGE_SIZE, FetchSpec, FetchWindow, FilterRequest, MAX_PAGE_SIZE,
    PageDirection, PageRequest, PaginationMode, Sort, resolve,
};

use super::count::{CountMode, choose_strategy};
use super::envelope::{EnvelopeBuilder, PaginationEnvelope};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the listing service.
#[derive(Debug, Clone)]
pub struct ListingConfig {
    /// Page size used when the caller sends none.
    pub default_page_size: u32,
    /// Upper bound for `page_size`, capped at [`MAX_PAGE_SIZE`].
    pub max_page_size: u32,
    /// Row count above which a planner estimate may replace the exact
    /// count. `None` disables estimates.
    pub count_estimate_threshold: Option<u64>,
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            count_estimate_threshold: None,
        }
    }
}

/// Raw listing parameters as received by a transport.
#[derive(Debug, Clone, Default)]
pub struct ListingRequest {
    pub page: Option<i64>,
    pub cursor: Option<String>,
    /// Explicit mode; `Some(Cursor)` without a cursor starts a keyset walk.
    pub mode: Option<PaginationMode>,
    pub page_size: Option<i64>,
    pub sort: Sort,
    pub count_mode: CountMode,
    pub filter: FilterRequest,
}

// =============================================================================
// ListingService
// =============================================================================

/// Stateless page server over a [`ContentRepository`].
pub struct ListingService {
    config: ListingConfig,
    codec: CursorCodec,
    repository: Arc<dyn ContentRepository>,
}

impl ListingService {
    pub fn new(
        config: ListingConfig,
        codec: CursorCodec,
        repository: Arc<dyn ContentRepository>,
    ) -> Self {
        Self {
            config,
            codec,
            repository,
        }
    }

    /// Serve one page.
    #[instrument(skip_all, fields(sort = %request.sort))]
    pub async fn list(
        &self,
        request: ListingRequest,
    ) -> ListingResult<PaginationEnvelope<ContentRecord>> {
        let result = self.list_page(request).await;

        if let Err(e) = &result {
            let kind = e.kind();
            record_error(kind.as_str());
            match kind {
                ErrorKind::InvalidCursor | ErrorKind::StatementTimeout | ErrorKind::ResourceExhausted => {
                    warn!(kind = %kind, error = %e, "Listing request failed");
                }
                k if k.is_client_error() => debug!(kind = %kind, error = %e, "Listing request rejected"),
                _ => error!(kind = %kind, error = %e, "Listing request failed"),
            }
        }

        result
    }

    async fn list_page(
        &self,
        request: ListingRequest,
    ) -> ListingResult<PaginationEnvelope<ContentRecord>> {
        let page_request = PageRequest::from_params(
            request.page,
            request.cursor,
            request.mode,
            request.page_size,
            self.config.default_page_size,
            self.config.max_page_size,
        )?;
        let mode = page_request.mode();
        record_request(mode);

        let predicates = resolve(&request.filter)?;
        let signature = predicates.signature();
        let sort = request.sort;
        let page_size = page_request.page_size();

        let (window, page, had_cursor) = match &page_request {
            PageRequest::Offset { page, page_size } => (
                FetchWindow::Offset {
                    offset: u64::from(page - 1) * u64::from(*page_size),
                    limit: *page_size,
                },
                Some(*page),
                false,
            ),
            PageRequest::Cursor {
                cursor: Some(cursor),
                page_size,
            } => {
                let fields = self.codec.decode(cursor)?;
                fields.ensure_matches(sort, &signature)?;
                (
                    FetchWindow::Keyset {
                        after: Some(fields.position),
                        direction: fields.direction,
                        limit: page_size + 1,
                    },
                    None,
                    true,
                )
            }
            PageRequest::Cursor {
                cursor: None,
                page_size,
            } => (
                FetchWindow::Keyset {
                    after: None,
                    direction: PageDirection::Forward,
                    limit: page_size + 1,
                },
                None,
                false,
            ),
        };

        let builder = EnvelopeBuilder::new(&self.codec, sort, &signature, page_size);

        let Some(target) = predicates.partition_target() else {
            record_empty_selection();
            debug!(mode, "Empty selection, no query issued");
            return Ok(builder.empty(page));
        };

        let spec = FetchSpec {
            predicates: &predicates,
            sort,
            count: choose_strategy(
                &window,
                request.count_mode,
                self.config.count_estimate_threshold,
            ),
            window,
        };
        debug!(
            mode,
            partition = target.as_str(),
            limit = spec.window.limit(),
            count = ?spec.count,
            "Fetching page"
        );

        let fetched = {
            let _timer = QueryTimer::new(mode, target.as_str());
            self.repository.fetch_page(&spec).await?
        };

        let envelope = match &spec.window {
            FetchWindow::Keyset { direction, .. } => builder.keyset(fetched, *direction, had_cursor)?,
            FetchWindow::Offset { .. } => builder.offset(page.unwrap_or(1), fetched)?,
        };

        record_rows_returned(envelope.items.len());
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ListingError, StorageError};
    use crate::models::{SourceType, UserId};
    use crate::ports::{
        CountStrategy, CreatorFilter, OrderDirection, SortField, SourceTypeSelector, TagMatch,
    };
    use crate::testing::InMemoryContentRepository;
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::HashSet;

    const ME: UserId = UserId(1);
    const OTHER: UserId = UserId(2);

    fn record(id: i64, source_type: SourceType, creator: UserId, minute: i64) -> ContentRecord {
        ContentRecord {
            id,
            source_type,
            creator_id: creator,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute),
            quality_score: None,
            tags: vec![],
            title: format!("title {}", id),
        }
    }

    fn service(repo: Arc<InMemoryContentRepository>) -> ListingService {
        ListingService::new(ListingConfig::default(), CursorCodec::new(), repo)
    }

    fn ids(envelope: &PaginationEnvelope<ContentRecord>) -> Vec<i64> {
        envelope.items.iter().map(|r| r.id).collect()
    }

    fn next(request: &ListingRequest, cursor: Option<String>) -> ListingRequest {
        ListingRequest {
            page: None,
            cursor,
            ..request.clone()
        }
    }

    /// Rows (1,t1),(2,t2),(3,t2),(4,t3),(5,t4).
    fn scenario_rows() -> Vec<ContentRecord> {
        vec![
            record(1, SourceType::Regular, ME, 1),
            record(2, SourceType::Regular, ME, 2),
            record(3, SourceType::Regular, ME, 2),
            record(4, SourceType::Regular, ME, 3),
            record(5, SourceType::Regular, ME, 4),
        ]
    }

    // Test critique: scénario de référence, résultat déterministe
    #[tokio::test]
    async fn test_reference_scenario_is_deterministic() {
        let repo = Arc::new(InMemoryContentRepository::with_rows(scenario_rows()));
        let service = service(repo.clone());

        let first = ListingRequest {
            page_size: Some(2),
            ..Default::default()
        };
        for _ in 0..3 {
            let page1 = service.list(first.clone()).await.unwrap();
            assert_eq!(ids(&page1), vec![5, 4]);

            let page2 = service
                .list(next(&first, page1.pagination.next_cursor.clone()))
                .await
                .unwrap();
            assert_eq!(ids(&page2), vec![3, 2]);

            let by_offset = service
                .list(ListingRequest {
                    page: Some(2),
                    ..first.clone()
                })
                .await
                .unwrap();
            assert_eq!(ids(&by_offset), vec![3, 2]);
        }
    }

    #[tokio::test]
    async fn test_keyset_walk_visits_every_row_once() {
        // Les ids se répètent entre les deux partitions
        let mut rows = Vec::new();
        for id in 1..=23 {
            rows.push(record(id, SourceType::Regular, if id % 2 == 0 { ME } else { OTHER }, id % 5));
            rows.push(record(id, SourceType::Auto, OTHER, id % 3));
        }
        let expected: HashSet<_> = rows.iter().map(|r| r.key()).collect();
        let repo = Arc::new(InMemoryContentRepository::with_rows(rows));
        let service = service(repo);

        for sort in [
            Sort::new(SortField::CreatedAt, OrderDirection::Desc),
            Sort::new(SortField::CreatedAt, OrderDirection::Asc),
            Sort::new(SortField::Title, OrderDirection::Asc),
        ] {
            let request = ListingRequest {
                page_size: Some(4),
                sort,
                ..Default::default()
            };
            let mut seen = Vec::new();
            let mut page = service.list(request.clone()).await.unwrap();
            loop {
                seen.extend(page.items.iter().map(|r| r.key()));
                match page.pagination.next_cursor.clone() {
                    Some(cursor) => page = service.list(next(&request, Some(cursor))).await.unwrap(),
                    None => break,
                }
            }
            assert_eq!(seen.len(), expected.len(), "duplicates or gaps for {}", sort);
            assert_eq!(seen.iter().copied().collect::<HashSet<_>>(), expected);
        }
    }

    // Test critique: insertion dans la zone non encore visitée, parcours complet
    #[tokio::test]
    async fn test_cursor_is_stable_under_insertion() {
        let repo = Arc::new(InMemoryContentRepository::with_rows(scenario_rows()));
        let service = service(repo.clone());
        let request = ListingRequest {
            page_size: Some(2),
            mode: Some(PaginationMode::Cursor),
            ..Default::default()
        };

        let page1 = service.list(request.clone()).await.unwrap();
        assert_eq!(ids(&page1), vec![5, 4]);

        // Entre t1 et t2, puis une ligne à égalité sur t2 (id 7 > 3: avant 3 dans l'ordre)
        repo.insert(ContentRecord {
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 1, 30).unwrap(),
            ..record(6, SourceType::Regular, ME, 0)
        });
        repo.insert(record(7, SourceType::Auto, ME, 2));
        // Et une ligne plus récente, déjà dépassée
        repo.insert(record(8, SourceType::Regular, ME, 10));

        let mut keys: Vec<_> = page1.items.iter().map(|r| r.key()).collect();
        let mut cursor = page1.pagination.next_cursor.clone();
        while let Some(token) = cursor {
            let page = service.list(next(&request, Some(token))).await.unwrap();
            keys.extend(page.items.iter().map(|r| r.key()));
            cursor = page.pagination.next_cursor;
        }

        for row in scenario_rows() {
            assert_eq!(
                keys.iter().filter(|k| **k == row.key()).count(),
                1,
                "row {} missing or duplicated",
                row.id
            );
        }
        assert!(!keys.iter().any(|k| k.id == 8), "row before the cursor leaked in");
        let ordered: Vec<i64> = keys.iter().map(|k| k.id).collect();
        assert_eq!(ordered, vec![5, 4, 7, 3, 2, 6, 1]);

        // Les pages déjà servies ne bougent pas
        let replay = service
            .list(next(&request, page1.pagination.next_cursor.clone()))
            .await
            .unwrap();
        assert_eq!(ids(&replay), vec![7, 3]);
    }

    // Test critique: première page en mode curseur sans comptage
    #[tokio::test]
    async fn test_first_cursor_page_skips_count() {
        let repo = Arc::new(InMemoryContentRepository::with_rows(scenario_rows()));
        let service = service(repo.clone());
        let request = ListingRequest {
            page_size: Some(2),
            mode: Some(PaginationMode::Cursor),
            ..Default::default()
        };

        let page = service.list(request.clone()).await.unwrap();
        assert_eq!(ids(&page), vec![5, 4]);
        assert_eq!(
            repo.last_fetch(),
            Some((
                FetchWindow::Keyset {
                    after: None,
                    direction: PageDirection::Forward,
                    limit: 3,
                },
                CountStrategy::Omitted,
            ))
        );
        assert_eq!(page.pagination.page, None);
        assert_eq!(page.pagination.total_count, None);
        assert!(page.pagination.has_next);
        assert!(!page.pagination.has_previous);
        assert!(page.pagination.prev_cursor.is_none());

        let second = service
            .list(next(&request, page.pagination.next_cursor))
            .await
            .unwrap();
        assert_eq!(ids(&second), vec![3, 2]);
        assert!(second.pagination.has_previous);
        assert!(matches!(repo.last_fetch(), Some((_, CountStrategy::Omitted))));
    }

    // Test critique: sélection vide explicite = zéro ligne, aucune requête
    #[tokio::test]
    async fn test_explicit_empty_selection_issues_no_query() {
        let repo = Arc::new(InMemoryContentRepository::with_rows(scenario_rows()));
        let service = service(repo.clone());

        let envelope = service
            .list(ListingRequest {
                filter: FilterRequest {
                    source_types: Some(SourceTypeSelector::empty()),
                    ..Default::default()
                },
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(envelope.items.is_empty());
        assert!(!envelope.pagination.has_next);
        assert!(!envelope.pagination.has_previous);
        assert_eq!(envelope.pagination.next_cursor, None);
        assert_eq!(repo.query_count(), 0);
    }

    #[tokio::test]
    async fn test_omitted_selector_returns_all_combinations() {
        let rows = vec![
            record(1, SourceType::Regular, ME, 1),
            record(1, SourceType::Auto, ME, 2),
            record(2, SourceType::Regular, OTHER, 3),
            record(2, SourceType::Auto, OTHER, 4),
        ];
        let repo = Arc::new(InMemoryContentRepository::with_rows(rows));
        let service = service(repo.clone());

        let envelope = service
            .list(ListingRequest {
                filter: FilterRequest {
                    user_id: Some(ME),
                    ..Default::default()
                },
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(envelope.items.len(), 4);
        assert_eq!(envelope.pagination.total_count, Some(4));
        assert_eq!(repo.query_count(), 1);

        let mine_regular = service
            .list(ListingRequest {
                filter: FilterRequest {
                    source_types: Some(SourceTypeSelector::parse(["user-regular", "community-auto"]).unwrap()),
                    user_id: Some(ME),
                    ..Default::default()
                },
                ..Default::default()
            })
            .await
            .unwrap();
        let keys: Vec<_> = mine_regular.items.iter().map(|r| (r.id, r.source_type)).collect();
        assert_eq!(keys, vec![(2, SourceType::Auto), (1, SourceType::Regular)]);
    }

    #[tokio::test]
    async fn test_quality_desc_puts_nulls_last() {
        let mut rows = Vec::new();
        for (id, score) in [(1, Some(0.2)), (2, None), (3, Some(0.9)), (4, None), (5, Some(0.5))] {
            let mut r = record(id, SourceType::Regular, ME, id);
            r.quality_score = score;
            rows.push(r);
        }
        let repo = Arc::new(InMemoryContentRepository::with_rows(rows));
        let service = service(repo);

        for order in [OrderDirection::Desc, OrderDirection::Asc] {
            let request = ListingRequest {
                page_size: Some(2),
                sort: Sort::new(SortField::QualityScore, order),
                ..Default::default()
            };
            let mut walked = Vec::new();
            let mut page = service.list(request.clone()).await.unwrap();
            loop {
                walked.extend(ids(&page));
                match page.pagination.next_cursor.clone() {
                    Some(cursor) => page = service.list(next(&request, Some(cursor))).await.unwrap(),
                    None => break,
                }
            }
            let expected = match order {
                OrderDirection::Desc => vec![3, 5, 1, 4, 2],
                OrderDirection::Asc => vec![1, 5, 3, 4, 2],
            };
            assert_eq!(walked, expected);
        }
    }

    #[tokio::test]
    async fn test_offset_total_matches_independent_count() {
        let mut rows = Vec::new();
        for id in 1..=37 {
            let mut r = record(id, if id % 3 == 0 { SourceType::Auto } else { SourceType::Regular }, ME, id);
            r.tags = if id % 2 == 0 { vec!["even".into()] } else { vec!["odd".into()] };
            rows.push(r);
        }
        let independent = rows
            .iter()
            .filter(|r| r.source_type == SourceType::Regular && r.tags.contains(&"even".to_string()))
            .count() as u64;

        let repo = Arc::new(InMemoryContentRepository::with_rows(rows));
        let service = service(repo);
        let envelope = service
            .list(ListingRequest {
                page_size: Some(5),
                filter: FilterRequest {
                    content_types: Some(vec![SourceType::Regular]),
                    creator_filter: Some(CreatorFilter::All),
                    tags: vec!["even".into()],
                    tag_match: TagMatch::Any,
                    ..Default::default()
                },
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(envelope.pagination.total_count, Some(independent));
        assert_eq!(envelope.pagination.total_pages, Some(independent.div_ceil(5)));
    }

    #[tokio::test]
    async fn test_previous_cursor_steps_back_one_page() {
        let repo = Arc::new(InMemoryContentRepository::with_rows(scenario_rows()));
        let service = service(repo);
        let request = ListingRequest {
            page_size: Some(2),
            ..Default::default()
        };

        let page1 = service.list(request.clone()).await.unwrap();
        let page2 = service
            .list(next(&request, page1.pagination.next_cursor.clone()))
            .await
            .unwrap();
        assert!(page2.pagination.has_previous);

        let back = service
            .list(next(&request, page2.pagination.prev_cursor.clone()))
            .await
            .unwrap();
        assert_eq!(ids(&back), vec![5, 4]);
        assert!(back.pagination.has_next);
        assert!(!back.pagination.has_previous);
    }

    #[tokio::test]
    async fn test_foreign_cursor_is_rejected_before_query() {
        let repo = Arc::new(InMemoryContentRepository::with_rows(scenario_rows()));
        let service = service(repo.clone());
        let request = ListingRequest {
            page_size: Some(2),
            ..Default::default()
        };
        let page1 = service.list(request.clone()).await.unwrap();
        let queries = repo.query_count();

        let other_sort = ListingRequest {
            sort: Sort::new(SortField::Title, OrderDirection::Asc),
            ..next(&request, page1.pagination.next_cursor.clone())
        };
        let err = service.list(other_sort).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCursor);

        let other_filter = ListingRequest {
            filter: FilterRequest {
                tags: vec!["cats".into()],
                ..Default::default()
            },
            ..next(&request, page1.pagination.next_cursor.clone())
        };
        assert_eq!(service.list(other_filter).await.unwrap_err().kind(), ErrorKind::InvalidCursor);

        let garbage = next(&request, Some("not-a-cursor".into()));
        assert_eq!(service.list(garbage).await.unwrap_err().kind(), ErrorKind::InvalidCursor);

        assert_eq!(repo.query_count(), queries);
    }

    #[tokio::test]
    async fn test_page_out_of_range() {
        let repo = Arc::new(InMemoryContentRepository::with_rows(scenario_rows()));
        let service = service(repo);
        let err = service
            .list(ListingRequest {
                page: Some(4),
                page_size: Some(2),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ListingError::PageOutOfRange { page: 4 }));
    }

    // Test critique: un timeout SQL remonte avec son propre type
    #[tokio::test]
    async fn test_statement_timeout_surfaces_distinctly() {
        let repo = Arc::new(InMemoryContentRepository::with_rows(scenario_rows()));
        repo.fail_next(StorageError::StatementTimeout("canceling statement".into()));
        let service = service(repo.clone());

        let err = service.list(ListingRequest::default()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StatementTimeout);
        // Pas de nouvelle tentative dans le moteur
        assert_eq!(repo.query_count(), 1);
    }

    #[tokio::test]
    async fn test_estimated_count_above_threshold() {
        let rows = (1..=30).map(|id| record(id, SourceType::Auto, ME, id)).collect();
        let repo = Arc::new(InMemoryContentRepository::with_rows(rows));
        let config = ListingConfig {
            count_estimate_threshold: Some(10),
            ..Default::default()
        };
        let service = ListingService::new(config, CursorCodec::new(), repo);

        let estimated = service
            .list(ListingRequest {
                page_size: Some(10),
                count_mode: CountMode::Estimate,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(estimated.pagination.total_count_estimated);
        assert!(estimated.pagination.has_next);

        let exact = service.list(ListingRequest::default()).await.unwrap();
        assert!(!exact.pagination.total_count_estimated);
        assert_eq!(exact.pagination.total_count, Some(30));
    }

    #[tokio::test]
    async fn test_missing_identity_is_rejected() {
        let repo = Arc::new(InMemoryContentRepository::with_rows(scenario_rows()));
        let service = service(repo.clone());
        let err = service
            .list(ListingRequest {
                filter: FilterRequest {
                    creator_filter: Some(CreatorFilter::User),
                    ..Default::default()
                },
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFilter);
        assert_eq!(repo.query_count(), 0);
    }
}
