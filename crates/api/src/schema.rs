//! GraphQL schema definition.
//!
//! Exposes the content listing as a single `contents` query returning
//! `ContentPage { items, pagination }`.

use std::sync::Arc;

use async_graphql::{Context, EmptyMutation, EmptySubscription, ErrorExtensions, Object, Result, Schema};
use chrono::{DateTime, Utc};

use vellum_core::error::ListingError;
use vellum_core::models::{self, UserId};
use vellum_core::ports::{
    CreatorFilter, FilterRequest, OrderDirection, PaginationMode, QualityRange, SourceCombination,
    SourceTypeSelector, Sort, SortField, TagMatch,
};
use vellum_core::services::{CountMode, ListingRequest, ListingService, PageMeta};

use crate::types::VellumSchema;

// -----------------------------------------------------------------------------
// Schema Configuration
// -----------------------------------------------------------------------------

/// Maximum query depth to prevent deeply nested queries (DoS protection).
/// Note: GraphQL introspection requires depth ~13, so we use 15 to allow it.
pub const MAX_QUERY_DEPTH: usize = 15;

/// Maximum query complexity score (DoS protection).
/// Each field has a default complexity of 1, nested objects multiply.
pub const MAX_QUERY_COMPLEXITY: usize = 500;

// -----------------------------------------------------------------------------
// Schema Builder
// -----------------------------------------------------------------------------

/// Build the GraphQL schema over a listing service.
///
/// Includes query depth and complexity limits for DoS protection.
pub fn build_schema(service: Arc<ListingService>) -> VellumSchema {
    Schema::build(ListingQuery, EmptyMutation, EmptySubscription)
        .data(service)
        .limit_depth(MAX_QUERY_DEPTH)
        .limit_complexity(MAX_QUERY_COMPLEXITY)
        .finish()
}

// -----------------------------------------------------------------------------
// Listing Query
// -----------------------------------------------------------------------------

/// Query root.
#[derive(Default)]
pub struct ListingQuery;

#[Object]
impl ListingQuery {
    /// List content from both sources with filters, sorting and pagination.
    ///
    /// `page` and `cursor` are mutually exclusive. `sourceTypes: []` selects
    /// nothing; omitting it falls back to `contentTypes` / `creatorFilter`.
    #[allow(clippy::too_many_arguments)]
    async fn contents<'ctx>(
        &self,
        ctx: &Context<'ctx>,
        page: Option<i64>,
        cursor: Option<String>,
        pagination: Option<PaginationModeInput>,
        page_size: Option<i64>,
        #[graphql(default)] sort_field: ContentSortField,
        #[graphql(default)] sort_order: Order,
        source_types: Option<Vec<SourceSelection>>,
        content_types: Option<Vec<ContentType>>,
        creator_filter: Option<CreatorScope>,
        #[graphql(default)] tags: Vec<String>,
        #[graphql(default)] tag_match: TagMatchMode,
        search_term: Option<String>,
        quality_min: Option<f64>,
        quality_max: Option<f64>,
        #[graphql(default)] count_mode: CountModeInput,
    ) -> Result<ContentPage> {
        let service = ctx.data::<Arc<ListingService>>()?;
        let user_id = ctx.data_opt::<UserId>().copied();

        let request = ListingRequest {
            page,
            cursor,
            mode: pagination.map(PaginationMode::from),
            page_size,
            sort: Sort::new(sort_field.into(), sort_order.into()),
            count_mode: count_mode.into(),
            filter: FilterRequest {
                source_types: source_types
                    .map(|s| s.into_iter().map(SourceCombination::from).collect::<SourceTypeSelector>()),
                content_types: content_types
                    .map(|types| types.into_iter().map(models::SourceType::from).collect()),
                creator_filter: creator_filter.map(CreatorFilter::from),
                user_id,
                tags,
                tag_match: tag_match.into(),
                search_term,
                quality: QualityRange {
                    min: quality_min,
                    max: quality_max,
                },
            },
        };

        let envelope = service.list(request).await.map_err(to_graphql_error)?;

        Ok(ContentPage {
            pagination: PaginationInfo::from(envelope.pagination),
            items: envelope.items.into_iter().map(ContentItem::from).collect(),
        })
    }
}

/// Attach the machine-readable kind as `extensions.code`.
fn to_graphql_error(error: ListingError) -> async_graphql::Error {
    let kind = error.kind();
    async_graphql::Error::new(error.to_string()).extend_with(|_, e| e.set("code", kind.as_str()))
}

// -----------------------------------------------------------------------------
// GraphQL Types
// -----------------------------------------------------------------------------

/// Ordering direction.
#[derive(async_graphql::Enum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Order {
    #[default]
    Desc,
    Asc,
}

impl From<Order> for OrderDirection {
    fn from(order: Order) -> Self {
        match order {
            Order::Asc => OrderDirection::Asc,
            Order::Desc => OrderDirection::Desc,
        }
    }
}

/// Sortable fields.
#[derive(async_graphql::Enum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ContentSortField {
    #[default]
    CreatedAt,
    /// Unrated items always come last.
    QualityScore,
    Title,
}

impl From<ContentSortField> for SortField {
    fn from(field: ContentSortField) -> Self {
        match field {
            ContentSortField::CreatedAt => SortField::CreatedAt,
            ContentSortField::QualityScore => SortField::QualityScore,
            ContentSortField::Title => SortField::Title,
        }
    }
}

/// Source partition.
#[derive(async_graphql::Enum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentType {
    Regular,
    Auto,
}

impl From<ContentType> for models::SourceType {
    fn from(t: ContentType) -> Self {
        match t {
            ContentType::Regular => models::SourceType::Regular,
            ContentType::Auto => models::SourceType::Auto,
        }
    }
}

impl From<models::SourceType> for ContentType {
    fn from(t: models::SourceType) -> Self {
        match t {
            models::SourceType::Regular => ContentType::Regular,
            models::SourceType::Auto => ContentType::Auto,
        }
    }
}

/// One of the four ownership × source combinations.
#[derive(async_graphql::Enum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceSelection {
    UserRegular,
    UserAuto,
    CommunityRegular,
    CommunityAuto,
}

impl From<SourceSelection> for SourceCombination {
    fn from(s: SourceSelection) -> Self {
        match s {
            SourceSelection::UserRegular => SourceCombination::UserRegular,
            SourceSelection::UserAuto => SourceCombination::UserAuto,
            SourceSelection::CommunityRegular => SourceCombination::CommunityRegular,
            SourceSelection::CommunityAuto => SourceCombination::CommunityAuto,
        }
    }
}

/// Legacy ownership filter.
#[derive(async_graphql::Enum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreatorScope {
    All,
    User,
    Community,
}

impl From<CreatorScope> for CreatorFilter {
    fn from(scope: CreatorScope) -> Self {
        match scope {
            CreatorScope::All => CreatorFilter::All,
            CreatorScope::User => CreatorFilter::User,
            CreatorScope::Community => CreatorFilter::Community,
        }
    }
}

#[derive(async_graphql::Enum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TagMatchMode {
    #[default]
    Any,
    All,
}

impl From<TagMatchMode> for TagMatch {
    fn from(mode: TagMatchMode) -> Self {
        match mode {
            TagMatchMode::Any => TagMatch::Any,
            TagMatchMode::All => TagMatch::All,
        }
    }
}

#[derive(async_graphql::Enum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CountModeInput {
    #[default]
    Exact,
    Estimate,
}

impl From<CountModeInput> for CountMode {
    fn from(mode: CountModeInput) -> Self {
        match mode {
            CountModeInput::Exact => CountMode::Exact,
            CountModeInput::Estimate => CountMode::Estimate,
        }
    }
}

/// Pagination mode. `CURSOR` without a cursor starts a keyset walk.
#[derive(async_graphql::Enum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PaginationModeInput {
    Offset,
    Cursor,
}

impl From<PaginationModeInput> for PaginationMode {
    fn from(mode: PaginationModeInput) -> Self {
        match mode {
            PaginationModeInput::Offset => PaginationMode::Offset,
            PaginationModeInput::Cursor => PaginationMode::Cursor,
        }
    }
}

/// Content item type.
#[derive(async_graphql::SimpleObject)]
pub struct ContentItem {
    pub id: i64,
    pub source_type: ContentType,
    pub creator_id: i64,
    pub created_at: DateTime<Utc>,
    pub quality_score: Option<f64>,
    pub tags: Vec<String>,
    pub title: String,
}

impl From<models::ContentRecord> for ContentItem {
    fn from(r: models::ContentRecord) -> Self {
        Self {
            id: r.id,
            source_type: r.source_type.into(),
            creator_id: r.creator_id.0,
            created_at: r.created_at,
            quality_score: r.quality_score,
            tags: r.tags,
            title: r.title,
        }
    }
}

#[derive(async_graphql::SimpleObject)]
pub struct PaginationInfo {
    pub page: Option<u32>,
    pub page_size: u32,
    pub total_count: Option<u64>,
    pub total_count_estimated: bool,
    pub total_pages: Option<u64>,
    pub has_next: bool,
    pub has_previous: bool,
    pub next_cursor: Option<String>,
    pub prev_cursor: Option<String>,
}

impl From<PageMeta> for PaginationInfo {
    fn from(m: PageMeta) -> Self {
        Self {
            page: m.page,
            page_size: m.page_size,
            total_count: m.total_count,
            total_count_estimated: m.total_count_estimated,
            total_pages: m.total_pages,
            has_next: m.has_next,
            has_previous: m.has_previous,
            next_cursor: m.next_cursor,
            prev_cursor: m.prev_cursor,
        }
    }
}

#[derive(async_graphql::SimpleObject)]
pub struct ContentPage {
    pub items: Vec<ContentItem>,
    pub pagination: PaginationInfo,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use vellum_core::cursor::CursorCodec;
    use vellum_core::models::ContentRecord;
    use vellum_core::ports::CountStrategy;
    use vellum_core::services::ListingConfig;
    use vellum_core::testing::InMemoryContentRepository;

    fn schema_with(repo: Arc<InMemoryContentRepository>) -> VellumSchema {
        let service = ListingService::new(ListingConfig::default(), CursorCodec::new(), repo);
        build_schema(Arc::new(service))
    }

    fn rows() -> Vec<ContentRecord> {
        (1..=3)
            .map(|id| ContentRecord {
                id,
                source_type: if id == 2 { models::SourceType::Auto } else { models::SourceType::Regular },
                creator_id: UserId(id),
                created_at: Utc.with_ymd_and_hms(2024, 5, id as u32, 0, 0, 0).unwrap(),
                quality_score: Some(0.5),
                tags: vec![],
                title: format!("post {}", id),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_contents_query() {
        let schema = schema_with(Arc::new(InMemoryContentRepository::with_rows(rows())));
        let response = schema
            .execute("{ contents(pageSize: 2) { items { id sourceType } pagination { totalCount hasNext nextCursor } } }")
            .await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);

        let data = response.data.into_json().unwrap();
        assert_eq!(data["contents"]["items"][0]["id"], 3);
        assert_eq!(data["contents"]["items"][1]["sourceType"], "AUTO");
        assert_eq!(data["contents"]["pagination"]["totalCount"], 3);
        assert_eq!(data["contents"]["pagination"]["hasNext"], true);
        assert!(data["contents"]["pagination"]["nextCursor"].is_string());
    }

    // Test critique: liste vide explicite != argument absent, aucune requête
    #[tokio::test]
    async fn test_empty_source_types_argument() {
        let repo = Arc::new(InMemoryContentRepository::with_rows(rows()));
        let schema = schema_with(repo.clone());
        let response = schema
            .execute("{ contents(sourceTypes: []) { items { id } pagination { hasNext } } }")
            .await;
        assert!(response.errors.is_empty());
        let data = response.data.into_json().unwrap();
        assert_eq!(data["contents"]["items"].as_array().unwrap().len(), 0);
        assert_eq!(repo.query_count(), 0);
    }

    #[tokio::test]
    async fn test_cursor_mode_first_page() {
        let repo = Arc::new(InMemoryContentRepository::with_rows(rows()));
        let schema = schema_with(repo.clone());
        let response = schema
            .execute("{ contents(pagination: CURSOR, pageSize: 2) { items { id } pagination { page totalCount hasNext hasPrevious prevCursor } } }")
            .await;
        assert!(response.errors.is_empty(), "{:?}", response.errors);

        let data = response.data.into_json().unwrap();
        let meta = &data["contents"]["pagination"];
        assert_eq!(data["contents"]["items"][0]["id"], 3);
        assert!(meta["page"].is_null());
        assert!(meta["totalCount"].is_null());
        assert_eq!(meta["hasNext"], true);
        assert_eq!(meta["hasPrevious"], false);
        assert!(meta["prevCursor"].is_null());
        assert!(matches!(repo.last_fetch(), Some((_, CountStrategy::Omitted))));
    }

    #[tokio::test]
    async fn test_errors_carry_kind_code() {
        let schema = schema_with(Arc::new(InMemoryContentRepository::new()));
        let response = schema
            .execute("{ contents(page: 1, cursor: \"abc\") { items { id } } }")
            .await;
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["errors"][0]["extensions"]["code"], "CONFLICTING_PAGINATION");

        let response = schema
            .execute("{ contents(sourceTypes: [USER_REGULAR]) { items { id } } }")
            .await;
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["errors"][0]["extensions"]["code"], "INVALID_FILTER");
    }

    #[tokio::test]
    async fn test_identity_from_request_data() {
        let schema = schema_with(Arc::new(InMemoryContentRepository::with_rows(rows())));
        let request = async_graphql::Request::new(
            "{ contents(sourceTypes: [USER_REGULAR]) { items { id } } }",
        )
        .data(UserId(3));
        let response = schema.execute(request).await;
        assert!(response.errors.is_empty());
        let data = response.data.into_json().unwrap();
        assert_eq!(data["contents"]["items"][0]["id"], 3);
        assert_eq!(data["contents"]["items"].as_array().unwrap().len(), 1);
    }
}
