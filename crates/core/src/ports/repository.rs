//! Port traits for data repositories.
//!
//! These traits define the storage interface used by the domain layer.
//! Implementations live in the infrastructure layer (e.g., `argus-storage`).

use async_trait::async_trait;
use bigdecimal::BigDecimal;

use crate::error::StorageResult;
use crate::models::{
    AddressBalance, Block, Contract, ScrapePointer, TokenTransfer, Transaction,
};

// =============================================================================
// Repository Traits
// =============================================================================

/// Repository for block data.
#[async_trait]
pub trait BlockRepository: Send + Sync {
    /// Get block by index.
    async fn get_block(&self, index: u64) -> StorageResult<Option<Block>>;

    /// Get the aggregated system fee stored for a block.
    async fn get_fee_aggregate(&self, index: u64) -> StorageResult<Option<BigDecimal>>;

    /// Get latest indexed block index.
    async fn latest_index(&self) -> StorageResult<Option<u64>>;

    /// Recompute missing or drifted running fee totals for all blocks.
    ///
    /// Returns the number of rows corrected. Used by the
    /// `backfill_fee_aggregates` data migration.
    async fn backfill_fee_aggregates(&self) -> StorageResult<u64>;
}

/// Repository for the contract catalogue.
#[async_trait]
pub trait ContractRepository: Send + Sync {
    /// List cataloged contracts of the given type.
    async fn list_by_type(&self, contract_type: &str) -> StorageResult<Vec<Contract>>;
}

/// Repository for tracked address balances.
#[async_trait]
pub trait BalanceRepository: Send + Sync {
    /// List balances whose verification height is below `verified_below`,
    /// oldest first, up to `limit` rows.
    async fn stale_balances(
        &self,
        verified_below: u64,
        limit: u32,
    ) -> StorageResult<Vec<AddressBalance>>;

    /// Upsert a re-verified balance.
    async fn record_balance(&self, balance: &AddressBalance) -> StorageResult<()>;

    /// Reset all verification marks so every balance becomes stale.
    ///
    /// Returns the number of rows reset. Used by the
    /// `reset_balance_verification` data migration.
    async fn clear_verification_marks(&self) -> StorageResult<u64>;
}

/// Repository for the scrape pointer.
///
/// The pointer is only written through the atomic apply/rollback
/// operations on [`Repositories`]; this trait is read-only.
#[async_trait]
pub trait PointerRepository: Send + Sync {
    /// Get the current scrape pointer, if any.
    async fn get(&self) -> StorageResult<Option<ScrapePointer>>;
}

/// Completion ledger for named data migrations.
#[async_trait]
pub trait MigrationLedger: Send + Sync {
    /// Whether a completion record exists for `name`.
    async fn is_completed(&self, name: &str) -> StorageResult<bool>;

    /// Durably record completion of `name`.
    async fn record_completed(&self, name: &str) -> StorageResult<()>;
}

// =============================================================================
// Composite Repository
// =============================================================================

/// Data bundle for atomic block persistence.
#[derive(Debug)]
pub struct BlockData<'a> {
    pub block: &'a Block,
    pub transactions: &'a [Transaction],
    pub transfers: &'a [TokenTransfer],
    pub pointer: &'a ScrapePointer,
}

/// Combined repository access for the scraper.
///
/// This trait provides access to all individual repositories and
/// atomic operations that span multiple tables.
#[async_trait]
pub trait Repositories: Send + Sync {
    /// Access the block repository.
    fn blocks(&self) -> &dyn BlockRepository;

    /// Access the contract repository.
    fn contracts(&self) -> &dyn ContractRepository;

    /// Access the balance repository.
    fn balances(&self) -> &dyn BalanceRepository;

    /// Access the pointer repository.
    fn pointer(&self) -> &dyn PointerRepository;

    /// Access the data migration ledger.
    fn migrations(&self) -> &dyn MigrationLedger;

    /// Persist block data atomically in a single transaction.
    ///
    /// This persists the block, its transactions and transfers, applies
    /// transfer deltas to the address-balance table, and advances the
    /// scrape pointer. If any operation fails, everything is rolled back.
    async fn apply_block_atomic(&self, data: BlockData<'_>) -> StorageResult<()>;

    /// Delete all data from a given block index atomically.
    ///
    /// Used for chain reorganization recovery. Reverses transfer deltas,
    /// deletes blocks, transactions and transfers at or above `from_index`,
    /// and rewinds the scrape pointer in a single transaction. Returns the
    /// number of blocks removed.
    async fn rollback_blocks_from(&self, from_index: u64) -> StorageResult<u64>;

    /// Check if the backing store is reachable and healthy.
    async fn is_healthy(&self) -> bool;
}
