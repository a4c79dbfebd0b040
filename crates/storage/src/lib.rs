//! Storage layer for the Argus scraper.
//!
//! This crate provides PostgreSQL implementations of the repository traits
//! defined in `argus-core`. It handles all database interactions including
//! connection pooling, schema migrations, and the atomic apply/rollback
//! operations the ingestion loop depends on.
//!
//! # Architecture
//!
//! The storage layer follows the repository pattern:
//!
//! - [`postgres::Database`] - Connection pool management
//! - [`postgres::PgRepositories`] - Composite repository for all entity types
//! - Individual repositories for blocks, contracts, balances, the scrape
//!   pointer and the data-migration ledger
//!
//! # Usage
//!
//! ```ignore
//! use argus_storage::{Database, DatabaseConfig, PgRepositories};
//!
//! // Connect to the database
//! let config = DatabaseConfig::for_scraper(&database_url);
//! let db = Database::connect(&config).await?;
//!
//! // Run schema migrations
//! db.migrate().await?;
//!
//! // Create repositories
//! let repositories = Arc::new(PgRepositories::new(Arc::new(db)));
//! ```

pub mod postgres;

pub use postgres::{Database, DatabaseConfig, PgRepositories};
