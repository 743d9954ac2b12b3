//! Storage layer for the Vellum listing engine.
//!
//! This crate provides the PostgreSQL implementation of the
//! `ContentRepository` port defined in `vellum-core`. It handles
//! connection pooling, page statement composition and execution.
//!
//! The partitioned relation itself (`content_items` with its
//! `content_items_regular` / `content_items_auto` partitions) is owned
//! by the write path; this crate only reads it.
//!
//! # Usage
//!
//! ```ignore
//! use vellum_storage::{Database, DatabaseConfig, PgContentRepository};
//!
//! // Connect to the database
//! let config = DatabaseConfig::for_listing(&database_url);
//! let db = Database::connect(&config).await?;
//!
//! // Create the repository
//! let repository = Arc::new(PgContentRepository::new(&db));
//! ```

pub mod postgres;

pub use postgres::{Database, DatabaseConfig, PgContentRepository, Relations};
