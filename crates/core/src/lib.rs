//! Core domain layer for the Vellum listing engine.
//!
//! This crate contains the domain models, port traits (interfaces), and
//! services that serve filtered, sorted pages over the partitioned content
//! store. It follows hexagonal architecture principles - this is the
//! innermost layer with no dependencies on infrastructure.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      vellum (binary)                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │                        vellum-api                           │
//! │                  (GraphQL + REST)                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │                      vellum-storage                         │
//! │              (PostgreSQL, query builder)                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │                     vellum-core  ← YOU ARE HERE             │
//! │          (models, ports, cursor codec, services)            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`models`] - Domain models (ContentRecord, SourceType, UserId)
//! - [`ports`] - Filter resolver, pagination types and repository traits
//! - [`cursor`] - Opaque cursor encoding and verification
//! - [`services`] - Count strategy, envelope builder, ListingService
//! - [`error`] - Error types and machine-readable kinds
//! - [`metrics`] - Prometheus metrics definitions
//!
//! # Request Lifecycle
//!
//! 1. Validate `page` / `cursor` / `page_size`
//! 2. Resolve the source-type selector (or legacy flags) into predicates
//! 3. Decode the inbound cursor and check it against sort and filters
//! 4. Run one page statement through [`ports::ContentRepository`]
//! 5. Build the [`services::PaginationEnvelope`] and mint outbound cursors

pub mod cursor;
pub mod error;
pub mod metrics;
pub mod models;
pub mod ports;
pub mod services;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
