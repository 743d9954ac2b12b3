//! HTTP surfaces for the Vellum listing engine.
//!
//! Two transports expose the same [`vellum_core::services::ListingService`]:
//!
//! - GraphQL (`POST /graphql`) with a single `contents` query
//! - REST (`GET /contents`) returning the pagination envelope as JSON
//!
//! Both read the caller identity from the `X-User-Id` header.

pub mod rest;
pub mod schema;
pub mod server;
pub mod types;

pub use rest::{ApiError, parse_listing_query};
pub use schema::{ListingQuery, MAX_QUERY_COMPLEXITY, MAX_QUERY_DEPTH, build_schema};
pub use server::{AppState, ServerConfig, router, serve_with_shutdown};
pub use types::{USER_ID_HEADER, VellumSchema};
