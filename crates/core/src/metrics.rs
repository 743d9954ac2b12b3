//! Metrics definitions for the listing engine.
//!
//! This module defines all metrics used throughout the engine.
//! Metrics are collected using the `metrics` crate and can be exported
//! to Prometheus via `metrics-exporter-prometheus`.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Instant;

/// Initialize all metric descriptions.
/// Call this once at startup before any metrics are recorded.
pub fn init_metrics() {
    describe_counter!(
        "listing_requests_total",
        "Total number of listing requests by pagination mode"
    );
    describe_counter!(
        "listing_errors_total",
        "Total number of failed listing requests by error kind"
    );
    describe_counter!(
        "listing_empty_selection_total",
        "Total number of requests answered without a query because nothing was selected"
    );
    describe_histogram!(
        "listing_query_duration_seconds",
        "Time spent in the page statement in seconds"
    );
    describe_histogram!(
        "listing_rows_returned",
        "Number of items returned per page"
    );
}

/// Record an incoming listing request.
///
/// # Arguments
/// * `mode` - Pagination mode ("offset" or "cursor")
pub fn record_request(mode: &'static str) {
    counter!("listing_requests_total", "mode" => mode).increment(1);
}

/// Record a failed listing request.
///
/// # Arguments
/// * `kind` - Machine-readable error kind (e.g. "INVALID_CURSOR")
pub fn record_error(kind: &'static str) {
    counter!("listing_errors_total", "kind" => kind).increment(1);
}

/// Record a request short-circuited by an empty selection.
pub fn record_empty_selection() {
    counter!("listing_empty_selection_total").increment(1);
}

/// Record the number of items in a returned page.
pub fn record_rows_returned(count: usize) {
    histogram!("listing_rows_returned").record(count as f64);
}

/// A timer that records the page statement duration when dropped.
pub struct QueryTimer {
    start: Instant,
    mode: &'static str,
    target: &'static str,
}

impl QueryTimer {
    /// Start a new query timer.
    ///
    /// # Arguments
    /// * `mode` - Pagination mode ("offset" or "cursor")
    /// * `target` - Queried relation ("regular", "auto" or "combined")
    pub fn new(mode: &'static str, target: &'static str) -> Self {
        Self {
            start: Instant::now(),
            mode,
            target,
        }
    }
}

impl Drop for QueryTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        histogram!(
            "listing_query_duration_seconds",
            "mode" => self.mode,
            "target" => self.target
        )
        .record(duration);
    }
}
