//! PostgreSQL storage adapter.
//!
//! This module implements the repository traits defined in `argus-core`
//! using PostgreSQL as the backing store.
//!
//! # Architecture
//!
//! - [`Database`] - Connection pool and schema migrations
//! - [`PgRepositories`] - Composite repository implementing `Repositories`
//! - Individual repos: `PgBlockRepository`, `PgContractRepository`, etc.
//!
//! # Usage
//!
//! ```ignore
//! let config = DatabaseConfig::for_scraper(&database_url);
//! let db = Database::connect(&config).await?;
//! db.migrate().await?;
//!
//! let repositories = PgRepositories::new(Arc::new(db));
//! ```

mod balance_repo;
mod block_repo;
mod contract_repo;
mod database;
mod helpers;
mod ledger_repo;
mod pointer_repo;

pub use balance_repo::PgBalanceRepository;
pub use block_repo::PgBlockRepository;
pub use contract_repo::PgContractRepository;
pub use database::{Database, DatabaseConfig};
pub use ledger_repo::PgMigrationLedger;
pub use pointer_repo::PgPointerRepository;

use std::sync::Arc;

use async_trait::async_trait;
use bigdecimal::BigDecimal;

use argus_core::error::{StorageError, StorageResult};
use argus_core::ports::{
    BalanceRepository, BlockData, BlockRepository, ContractRepository, MigrationLedger,
    PointerRepository, Repositories,
};

// =============================================================================
// Composite Repository
// =============================================================================

/// Aggregated PostgreSQL repositories implementing the `Repositories` trait.
///
/// This provides a single entry point for all storage operations and
/// implements atomic transactions that span multiple tables.
pub struct PgRepositories {
    db: Arc<Database>,
    blocks: PgBlockRepository,
    contracts: PgContractRepository,
    balances: PgBalanceRepository,
    pointer: PgPointerRepository,
    migrations: PgMigrationLedger,
}

impl PgRepositories {
    /// Create a new repository aggregate from a database connection.
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            blocks: PgBlockRepository::new(&db),
            contracts: PgContractRepository::new(&db),
            balances: PgBalanceRepository::new(&db),
            pointer: PgPointerRepository::new(&db),
            migrations: PgMigrationLedger::new(&db),
            db,
        }
    }
}

#[async_trait]
impl Repositories for PgRepositories {
    fn blocks(&self) -> &dyn BlockRepository {
        &self.blocks
    }

    fn contracts(&self) -> &dyn ContractRepository {
        &self.contracts
    }

    fn balances(&self) -> &dyn BalanceRepository {
        &self.balances
    }

    fn pointer(&self) -> &dyn PointerRepository {
        &self.pointer
    }

    fn migrations(&self) -> &dyn MigrationLedger {
        &self.migrations
    }

    async fn apply_block_atomic(&self, data: BlockData<'_>) -> StorageResult<()> {
        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| StorageError::TransactionError(e.to_string()))?;

        // Insert block
        sqlx::query(
            r#"
            INSERT INTO blocks (
                index, hash, previous_hash, merkle_root, timestamp,
                size, transaction_count, aggregated_system_fee, indexed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (index) DO UPDATE SET
                hash = EXCLUDED.hash,
                previous_hash = EXCLUDED.previous_hash,
                merkle_root = EXCLUDED.merkle_root,
                timestamp = EXCLUDED.timestamp,
                size = EXCLUDED.size,
                transaction_count = EXCLUDED.transaction_count,
                aggregated_system_fee = EXCLUDED.aggregated_system_fee,
                indexed_at = EXCLUDED.indexed_at
            "#,
        )
        .bind(data.block.index as i64)
        .bind(&data.block.hash.0[..])
        .bind(&data.block.previous_hash.0[..])
        .bind(&data.block.merkle_root.0[..])
        .bind(data.block.timestamp)
        .bind(data.block.size as i32)
        .bind(data.block.transaction_count as i32)
        .bind(&data.block.aggregated_system_fee)
        .bind(data.block.indexed_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        // Insert transactions
        for transaction in data.transactions {
            sqlx::query(
                r#"
                INSERT INTO transactions (
                    id, block_index, index_in_block, type, system_fee, network_fee
                )
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (id) DO UPDATE SET
                    block_index = EXCLUDED.block_index,
                    index_in_block = EXCLUDED.index_in_block,
                    type = EXCLUDED.type,
                    system_fee = EXCLUDED.system_fee,
                    network_fee = EXCLUDED.network_fee
                "#,
            )
            .bind(&transaction.id)
            .bind(transaction.block_index as i64)
            .bind(transaction.index_in_block as i32)
            .bind(&transaction.tx_type)
            .bind(&transaction.system_fee)
            .bind(&transaction.network_fee)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;
        }

        // Insert transfers and seed balance rows with their deltas
        for transfer in data.transfers {
            sqlx::query(
                r#"
                INSERT INTO token_transfers (
                    id, transaction_id, block_index, contract,
                    from_address, to_address, amount
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(&transfer.id)
            .bind(&transfer.transaction_id)
            .bind(transfer.block_index as i64)
            .bind(&transfer.contract.0[..])
            .bind(&transfer.from)
            .bind(&transfer.to)
            .bind(&transfer.amount)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

            if let Some(to) = &transfer.to {
                apply_balance_delta(&mut tx, &transfer.contract.0, to, transfer.amount.clone())
                    .await?;
            }
            if let Some(from) = &transfer.from {
                apply_balance_delta(&mut tx, &transfer.contract.0, from, -transfer.amount.clone())
                    .await?;
            }
        }

        // Advance the scrape pointer
        sqlx::query(
            r#"
            INSERT INTO scrape_pointer (singleton, current_index, current_hash, updated_at)
            VALUES (TRUE, $1, $2, $3)
            ON CONFLICT (singleton) DO UPDATE SET
                current_index = EXCLUDED.current_index,
                current_hash = EXCLUDED.current_hash,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(data.pointer.current_index as i64)
        .bind(&data.pointer.current_hash.0[..])
        .bind(data.pointer.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::TransactionError(e.to_string()))?;

        Ok(())
    }

    async fn rollback_blocks_from(&self, from_index: u64) -> StorageResult<u64> {
        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| StorageError::TransactionError(e.to_string()))?;

        // Reverse the balance deltas seeded by the unwound transfers
        let transfers: Vec<TransferDeltaRow> = sqlx::query_as(
            r#"
            SELECT contract, from_address, to_address, amount
            FROM token_transfers
            WHERE block_index >= $1
            "#,
        )
        .bind(from_index as i64)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        for transfer in transfers {
            if let Some(to) = &transfer.to_address {
                reverse_balance_delta(&mut tx, &transfer.contract, to, &transfer.amount).await?;
            }
            if let Some(from) = &transfer.from_address {
                let credit = -transfer.amount.clone();
                reverse_balance_delta(&mut tx, &transfer.contract, from, &credit).await?;
            }
        }

        // Delete child data first
        sqlx::query("DELETE FROM token_transfers WHERE block_index >= $1")
            .bind(from_index as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        sqlx::query("DELETE FROM transactions WHERE block_index >= $1")
            .bind(from_index as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        let result = sqlx::query("DELETE FROM blocks WHERE index >= $1")
            .bind(from_index as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        let blocks_deleted = result.rows_affected();

        // Rewind the pointer to the previous block, or clear it when
        // unwinding from genesis
        let previous = match from_index.checked_sub(1) {
            Some(prev_index) => {
                let row: Option<(Vec<u8>,)> =
                    sqlx::query_as("SELECT hash FROM blocks WHERE index = $1")
                        .bind(prev_index as i64)
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(|e| StorageError::QueryError(e.to_string()))?;
                row.map(|(hash,)| (prev_index, hash))
            }
            None => None,
        };

        match previous {
            Some((prev_index, prev_hash)) => {
                sqlx::query(
                    r#"
                    UPDATE scrape_pointer
                    SET current_index = $1, current_hash = $2, updated_at = NOW()
                    "#,
                )
                .bind(prev_index as i64)
                .bind(&prev_hash[..])
                .execute(&mut *tx)
                .await
                .map_err(|e| StorageError::QueryError(e.to_string()))?;
            }
            None => {
                sqlx::query("DELETE FROM scrape_pointer")
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| StorageError::QueryError(e.to_string()))?;
            }
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::TransactionError(e.to_string()))?;

        Ok(blocks_deleted)
    }

    async fn is_healthy(&self) -> bool {
        self.db.is_healthy().await
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Apply a signed balance delta, creating the (contract, address) row as
/// unverified when it does not exist yet.
async fn apply_balance_delta(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    contract: &[u8],
    address: &str,
    delta: BigDecimal,
) -> StorageResult<()> {
    sqlx::query(
        r#"
        INSERT INTO address_balances (contract, address, balance, verified_at_block)
        VALUES ($1, $2, $3, 0)
        ON CONFLICT (contract, address) DO UPDATE SET
            balance = address_balances.balance + EXCLUDED.balance
        "#,
    )
    .bind(contract)
    .bind(address)
    .bind(delta)
    .execute(&mut **tx)
    .await
    .map_err(|e| StorageError::QueryError(e.to_string()))?;

    Ok(())
}

/// Subtract a previously applied delta during rollback.
async fn reverse_balance_delta(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    contract: &[u8],
    address: &str,
    delta: &BigDecimal,
) -> StorageResult<()> {
    sqlx::query(
        r#"
        UPDATE address_balances
        SET balance = balance - $3
        WHERE contract = $1 AND address = $2
        "#,
    )
    .bind(contract)
    .bind(address)
    .bind(delta)
    .execute(&mut **tx)
    .await
    .map_err(|e| StorageError::QueryError(e.to_string()))?;

    Ok(())
}

#[derive(sqlx::FromRow)]
struct TransferDeltaRow {
    contract: Vec<u8>,
    from_address: Option<String>,
    to_address: Option<String>,
    amount: BigDecimal,
}
