//! Core domain layer for the Argus scraper.
//!
//! This crate contains the domain models, port traits (interfaces), and
//! business logic services for the NEP5-aware blockchain scraper. It follows
//! hexagonal architecture principles - this is the innermost layer with
//! no dependencies on infrastructure.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      argus (binary)                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │         argus-storage          │         argus-chain        │
//! │         (PostgreSQL)           │        (NEO JSON-RPC)      │
//! ├────────────────────────────────┴────────────────────────────┤
//! │                     argus-core  ← YOU ARE HERE              │
//! │               (models, ports, services)                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`models`] - Domain models (Block, Transaction, Contract, etc.)
//! - [`ports`] - Interface traits for adapters to implement
//! - [`services`] - Core business logic (ScraperService, Supervisor)
//! - [`cache`] - Memoizing write-through overlay for fee aggregates
//! - [`migrate`] - Exactly-once ledger for data migrations
//! - [`registry`] - NEP5 token registry built per configuration epoch
//! - [`pubsub`] - Cross-process processed-index notifications
//! - [`error`] - Domain error types
//! - [`metrics`] - Prometheus metrics definitions
//!
//! # Key Concepts
//!
//! ## Ports
//!
//! Ports define interfaces that external adapters must implement:
//!
//! - [`ports::NodeRpc`] - Fetch blocks and query NEP5 contracts
//! - [`ports::Repositories`] - Persist and query indexed data
//!
//! ## Scraper Lifecycle
//!
//! 1. An options snapshot arrives on the configuration stream
//! 2. The supervisor tears down the previous epoch, rebuilds the token
//!    registry, runs pending data migrations, opens a fresh index channel
//! 3. The ingestion loop pulls blocks in chunks, checks previous-hash
//!    linkage, applies each block atomically and publishes its index
//! 4. Reorgs unwind within a bounded depth; deeper forks halt the loop
//! 5. A lagged repair pass re-verifies token balances against the node

pub mod cache;
pub mod error;
pub mod metrics;
pub mod migrate;
pub mod models;
pub mod ports;
pub mod pubsub;
pub mod registry;
pub mod services;

#[cfg(test)]
pub(crate) mod testkit;
