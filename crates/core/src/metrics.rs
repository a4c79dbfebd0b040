//! Metrics definitions for the scraper.
//!
//! This module defines all metrics used throughout the scraper.
//! Metrics are collected using the `metrics` crate and can be exported
//! to Prometheus via `metrics-exporter-prometheus`.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Instant;

/// Initialize all metric descriptions.
/// Call this once at startup before any metrics are recorded.
pub fn init_metrics() {
    describe_counter!(
        "blocks_scraped_total",
        "Total number of blocks successfully applied"
    );
    describe_histogram!(
        "block_processing_duration_seconds",
        "Time taken to apply a block in seconds"
    );
    describe_counter!(
        "reorgs_detected_total",
        "Total number of chain reorganizations detected"
    );
    describe_counter!(
        "blocks_rolled_back_total",
        "Total number of blocks rolled back due to reorg"
    );
    describe_counter!(
        "repair_passes_total",
        "Total number of balance repair passes executed"
    );
    describe_counter!(
        "balances_repaired_total",
        "Total number of address balances re-verified against the node"
    );
    describe_counter!(
        "rpc_errors_total",
        "Total number of node RPC failures, by operation"
    );
    describe_counter!(
        "data_migrations_applied_total",
        "Total number of data migrations applied"
    );
}

/// Record a successfully applied block.
pub fn record_block_scraped() {
    counter!("blocks_scraped_total").increment(1);
}

/// Record block processing duration.
pub fn record_block_processing_duration(duration_secs: f64) {
    histogram!("block_processing_duration_seconds").record(duration_secs);
}

/// Record a chain reorganization detection.
///
/// # Arguments
/// * `at_block` - The block index where the reorg was detected
pub fn record_reorg_detected(at_block: u64) {
    counter!("reorgs_detected_total", "at_block" => at_block.to_string()).increment(1);
}

/// Record the number of blocks rolled back due to reorg.
///
/// # Arguments
/// * `count` - Number of blocks rolled back
pub fn record_blocks_rolled_back(count: u64) {
    counter!("blocks_rolled_back_total").increment(count);
}

/// Record a completed balance repair pass.
pub fn record_repair_pass() {
    counter!("repair_passes_total").increment(1);
}

/// Record a re-verified address balance.
pub fn record_balance_repaired() {
    counter!("balances_repaired_total").increment(1);
}

/// Record a node RPC failure.
///
/// # Arguments
/// * `operation` - The RPC operation that failed ("decimals", "balance_of", ...)
pub fn record_rpc_error(operation: &str) {
    counter!("rpc_errors_total", "operation" => operation.to_string()).increment(1);
}

/// Record an applied data migration.
///
/// # Arguments
/// * `name` - The migration name
pub fn record_data_migration_applied(name: &str) {
    counter!("data_migrations_applied_total", "name" => name.to_string()).increment(1);
}

/// A timer that automatically records duration when dropped.
pub struct ProcessingTimer {
    start: Instant,
}

impl ProcessingTimer {
    /// Start a new processing timer.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for ProcessingTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProcessingTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        record_block_processing_duration(duration);
    }
}
