//! Pagination envelope assembly.
//!
//! Turns fetched rows into `{ items, pagination }`: trims the look-ahead
//! row of keyset pages, restores listing order for backward pages, derives
//! `has_next`/`has_previous` and mints the outbound cursors.

use serde::Serialize;

use crate::cursor::{CursorCodec, CursorFields};
use crate::error::{CursorError, ListingError, ListingResult};
use crate::models::ContentRecord;
use crate::ports::{FetchedRows, KeysetPosition, PageDirection, Sort, TotalCount};

/// Pagination metadata of one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PageMeta {
    /// Page number, offset mode only.
    pub page: Option<u32>,
    pub page_size: u32,
    pub total_count: Option<u64>,
    /// `true` when `total_count` comes from planner statistics.
    pub total_count_estimated: bool,
    pub total_pages: Option<u64>,
    pub has_next: bool,
    pub has_previous: bool,
    pub next_cursor: Option<String>,
    pub prev_cursor: Option<String>,
}

/// A page of items with its pagination metadata.
#[derive(Debug, Clone, Serialize)]
pub struct PaginationEnvelope<T> {
    pub items: Vec<T>,
    pub pagination: PageMeta,
}

/// Builds envelopes for one request.
pub struct EnvelopeBuilder<'a> {
    codec: &'a CursorCodec,
    sort: Sort,
    filter_signature: &'a str,
    page_size: u32,
}

impl<'a> EnvelopeBuilder<'a> {
    pub fn new(codec: &'a CursorCodec, sort: Sort, filter_signature: &'a str, page_size: u32) -> Self {
        Self {
            codec,
            sort,
            filter_signature,
            page_size,
        }
    }

    /// Envelope for a selection that matches nothing.
    pub fn empty(&self, page: Option<u32>) -> PaginationEnvelope<ContentRecord> {
        let counted = page.is_some();
        PaginationEnvelope {
            items: Vec::new(),
            pagination: PageMeta {
                page,
                page_size: self.page_size,
                total_count: counted.then_some(0),
                total_pages: counted.then_some(0),
                ..Default::default()
            },
        }
    }

    /// Envelope for an offset page.
    ///
    /// An empty page past the first one is out of range; an empty first
    /// page is a valid empty listing.
    pub fn offset(
        &self,
        page: u32,
        fetched: FetchedRows,
    ) -> ListingResult<PaginationEnvelope<ContentRecord>> {
        let rows = fetched.rows;
        if rows.is_empty() && page > 1 {
            return Err(ListingError::PageOutOfRange { page });
        }

        let total = match fetched.total {
            Some(total) => Some(total),
            None if rows.is_empty() => Some(TotalCount::Exact(0)),
            None => None,
        };

        let page_size = u64::from(self.page_size);
        let seen = u64::from(page - 1) * page_size + rows.len() as u64;
        let has_next = match total {
            Some(TotalCount::Exact(n)) => seen < n,
            // Estimates can be off either way; a full page is the best hint.
            Some(TotalCount::Estimated(_)) | None => rows.len() as u64 == page_size,
        };
        let has_previous = page > 1;

        let next_cursor = match rows.last() {
            Some(last) if has_next => Some(self.mint(last, PageDirection::Forward)?),
            _ => None,
        };
        let prev_cursor = match rows.first() {
            Some(first) if has_previous => Some(self.mint(first, PageDirection::Backward)?),
            _ => None,
        };

        Ok(PaginationEnvelope {
            items: rows,
            pagination: PageMeta {
                page: Some(page),
                page_size: self.page_size,
                total_count: total.map(|t| t.value()),
                total_count_estimated: total.is_some_and(|t| t.is_estimated()),
                total_pages: total.map(|t| t.value().div_ceil(page_size)),
                has_next,
                has_previous,
                next_cursor,
                prev_cursor,
            },
        })
    }

    /// Envelope for a keyset page fetched with `page_size + 1` rows.
    ///
    /// `had_cursor` tells whether the request carried an inbound cursor.
    pub fn keyset(
        &self,
        fetched: FetchedRows,
        direction: PageDirection,
        had_cursor: bool,
    ) -> ListingResult<PaginationEnvelope<ContentRecord>> {
        let mut rows = fetched.rows;
        let limit = self.page_size as usize;
        let has_more = rows.len() > limit;
        rows.truncate(limit);

        let (has_next, has_previous) = match direction {
            PageDirection::Forward => (has_more, had_cursor),
            PageDirection::Backward => {
                rows.reverse();
                (!rows.is_empty(), has_more)
            }
        };

        let next_cursor = match rows.last() {
            Some(last) if has_next => Some(self.mint(last, PageDirection::Forward)?),
            _ => None,
        };
        let prev_cursor = match rows.first() {
            Some(first) if has_previous => Some(self.mint(first, PageDirection::Backward)?),
            _ => None,
        };

        Ok(PaginationEnvelope {
            items: rows,
            pagination: PageMeta {
                page: None,
                page_size: self.page_size,
                has_next,
                has_previous,
                next_cursor,
                prev_cursor,
                ..Default::default()
            },
        })
    }

    fn mint(&self, record: &ContentRecord, direction: PageDirection) -> Result<String, CursorError> {
        self.codec.encode(&CursorFields {
            sort: self.sort,
            direction,
            position: KeysetPosition::of(record, self.sort),
            filter_signature: self.filter_signature.to_string(),
        })
    }
}
