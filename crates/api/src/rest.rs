//! REST surface: `GET /contents`.
//!
//! The query string is parsed by hand rather than through a typed extractor:
//! `source_types=` (present, empty) must stay distinguishable from an
//! absent `source_types`, and `tag` is repeatable.

use axum::{
    Json,
    extract::{RawQuery, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::debug;
use url::form_urlencoded;

use vellum_core::error::{DomainError, ErrorKind, ListingError};
use vellum_core::models::{ContentRecord, SourceType, UserId};
use vellum_core::ports::{Sort, SourceTypeSelector};
use vellum_core::services::{ListingRequest, PaginationEnvelope};

use crate::server::AppState;
use crate::types::user_id_from_headers;

// -----------------------------------------------------------------------------
// Errors
// -----------------------------------------------------------------------------

/// Error body: `{ "error": { "kind", "message" } }`.
#[derive(Debug)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ApiError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<ListingError> for ApiError {
    fn from(error: ListingError) -> Self {
        Self::new(error.kind(), error.to_string())
    }
}

impl From<DomainError> for ApiError {
    fn from(error: DomainError) -> Self {
        ListingError::from(error).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "kind": self.kind,
                "message": self.message,
            }
        });
        (status_for(self.kind), Json(body)).into_response()
    }
}

/// HTTP status of an error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::StatementTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::ResourceExhausted => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::StorageError => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    }
}

// -----------------------------------------------------------------------------
// Handler
// -----------------------------------------------------------------------------

/// `GET /contents`
pub async fn list_contents(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Result<Json<PaginationEnvelope<ContentRecord>>, ApiError> {
    let user_id = user_id_from_headers(&headers)?;
    let request = parse_listing_query(query.as_deref(), user_id)?;
    debug!(sort = %request.sort, "REST listing request");

    let envelope = state.service.list(request).await?;
    Ok(Json(envelope))
}

/// Parse the `/contents` query string. Unknown parameters are rejected.
pub fn parse_listing_query(
    raw: Option<&str>,
    user_id: Option<UserId>,
) -> Result<ListingRequest, ApiError> {
    let mut request = ListingRequest::default();
    request.filter.user_id = user_id;
    let mut sort = Sort::default();

    for (key, value) in form_urlencoded::parse(raw.unwrap_or_default().as_bytes()) {
        match key.as_ref() {
            "page" => request.page = Some(parse_int(&value, "page", ErrorKind::InvalidPage)?),
            "cursor" => request.cursor = Some(value.into_owned()),
            "pagination" => request.mode = Some(value.parse()?),
            "page_size" => {
                request.page_size = Some(parse_int(&value, "page_size", ErrorKind::InvalidPageSize)?)
            }
            "sort_field" => sort.field = value.parse()?,
            "sort_order" => sort.order = value.parse()?,
            "source_types" | "source_type_selector" => {
                let parsed = SourceTypeSelector::parse_csv(&value)?;
                request.filter.source_types = Some(match request.filter.source_types.take() {
                    Some(previous) => previous.iter().chain(parsed.iter()).collect(),
                    None => parsed,
                });
            }
            "content_types" => {
                let types = request.filter.content_types.get_or_insert_with(Vec::new);
                for token in value.split(',').map(str::trim).filter(|t| !t.is_empty()) {
                    types.push(token.parse::<SourceType>()?);
                }
            }
            "creator_filter" => request.filter.creator_filter = Some(value.parse()?),
            "tag" => request.filter.tags.push(value.into_owned()),
            "tag_match" => request.filter.tag_match = value.parse()?,
            "search_term" => request.filter.search_term = Some(value.into_owned()),
            "quality_min" => request.filter.quality.min = Some(parse_float(&value, "quality_min")?),
            "quality_max" => request.filter.quality.max = Some(parse_float(&value, "quality_max")?),
            "count_mode" => request.count_mode = value.parse()?,
            other => {
                return Err(ApiError::new(
                    ErrorKind::InvalidFilter,
                    format!("unknown query parameter '{}'", other),
                ));
            }
        }
    }

    request.sort = sort;
    Ok(request)
}

fn parse_int(value: &str, name: &str, kind: ErrorKind) -> Result<i64, ApiError> {
    value
        .trim()
        .parse()
        .map_err(|_| ApiError::new(kind, format!("{} must be an integer, got '{}'", name, value)))
}

fn parse_float(value: &str, name: &str) -> Result<f64, ApiError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| {
            ApiError::new(
                ErrorKind::InvalidFilter,
                format!("{} must be a number, got '{}'", name, value),
            )
        })
}
