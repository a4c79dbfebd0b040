//! Error types for the scraper domain layer.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`DomainError`] - Business logic errors
//! - [`StorageError`] - Database/repository errors
//! - [`ChainError`] - Blockchain RPC errors
//! - [`ScrapeError`] - Top-level orchestration errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// Domain Errors
// =============================================================================

/// Business logic and domain rule violations.
///
/// These errors represent problems in the scraper's domain logic,
/// such as malformed fee values in block data.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A fee value could not be parsed as a decimal.
    #[error("Invalid fee value: {0}")]
    InvalidFee(String),

    /// Storage operation failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Database and repository errors.
///
/// These errors originate from storage operations like queries,
/// transactions, and data serialization.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to establish database connection.
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    /// SQL query execution failed.
    #[error("Query execution error: {0}")]
    QueryError(String),

    /// Requested record was not found.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Database migration failed.
    #[error("Migration error: {0}")]
    MigrationError(String),

    /// Transaction commit/rollback failed.
    #[error("Transaction error: {0}")]
    TransactionError(String),

    /// Data serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

// =============================================================================
// Chain Errors
// =============================================================================

/// Blockchain RPC and connectivity errors.
///
/// These errors occur when communicating with the NEO node via
/// JSON-RPC over HTTP. They are treated as transient by the scraper
/// and retried on the next tick.
#[derive(Debug, Error)]
pub enum ChainError {
    /// HTTP connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// RPC request failed or the node returned an error.
    #[error("RPC error: {0}")]
    RpcError(String),

    /// The node returned JSON the adapter could not interpret.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// A contract invocation did not HALT.
    #[error("Invocation fault for {contract}.{method}")]
    InvocationFault {
        /// Contract script hash.
        contract: String,
        /// Invoked method name.
        method: String,
    },
}

// =============================================================================
// Scrape Errors
// =============================================================================

/// Top-level scraper orchestration errors.
///
/// This is the main error type returned by [`crate::services::ScraperService`].
/// It wraps all lower-level errors and adds scraper-specific variants.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Domain logic error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Storage/database error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Blockchain connectivity error.
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Backward search for a common ancestor hit the depth limit.
    ///
    /// This is fatal for the current loop: advancing would mean applying
    /// blocks on an unverified chain.
    #[error("Rollback exhausted after unwinding {depth} blocks, stopped at height {at_height}")]
    RollbackExhausted {
        /// Height the unwind stopped at.
        at_height: u64,
        /// Number of blocks unwound before giving up.
        depth: u64,
    },

    /// Graceful shutdown was requested.
    ///
    /// This is not really an error but uses the error type for control flow.
    #[error("Scraper shutdown requested")]
    ShutdownRequested,

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for scraper operations.
pub type ScrapeResult<T> = Result<T, ScrapeError>;

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;
