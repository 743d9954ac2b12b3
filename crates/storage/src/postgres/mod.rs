//! PostgreSQL storage adapter.
//!
//! This module implements the `ContentRepository` port defined in
//! `vellum-core` over an existing partitioned relation.
//!
//! # Architecture
//!
//! - [`Database`] - Connection pool and per-connection statement timeout
//! - [`query_builder`] - One SQL statement per page request
//! - [`PgContentRepository`] - Executes plans and maps rows
//!
//! # Usage
//!
//! ```ignore
//! let config = DatabaseConfig::for_listing(&database_url);
//! let db = Database::connect(&config).await?;
//!
//! let repository = PgContentRepository::new(&db);
//! ```

mod content_repo;
mod database;
mod helpers;
pub mod query_builder;

pub use content_repo::PgContentRepository;
pub use database::{Database, DatabaseConfig};
pub use query_builder::{ExecutablePlan, PlanKind, Relations, SqlParam, build_estimate_plan, build_plan};
