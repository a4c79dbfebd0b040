//! Block repository implementation for PostgreSQL.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use sqlx::PgPool;

use argus_core::error::{StorageError, StorageResult};
use argus_core::models::{Block, BlockHash};
use argus_core::ports::BlockRepository;

use super::database::Database;
use super::helpers::{bytes_to_hash32, bytes_to_hash32_strict};

/// PostgreSQL implementation of BlockRepository.
pub struct PgBlockRepository {
    pool: PgPool,
}

impl PgBlockRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }
}

#[async_trait]
impl BlockRepository for PgBlockRepository {
    async fn get_block(&self, index: u64) -> StorageResult<Option<Block>> {
        let row = sqlx::query_as::<_, BlockRow>(
            r#"
            SELECT index, hash, previous_hash, merkle_root, timestamp,
                   size, transaction_count, aggregated_system_fee, indexed_at
            FROM blocks
            WHERE index = $1
            "#,
        )
        .bind(index as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        row.map(BlockRow::into_block).transpose()
    }

    async fn get_fee_aggregate(&self, index: u64) -> StorageResult<Option<BigDecimal>> {
        let row: Option<(BigDecimal,)> =
            sqlx::query_as("SELECT aggregated_system_fee FROM blocks WHERE index = $1")
                .bind(index as i64)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StorageError::QueryError(e.to_string()))?;

        Ok(row.map(|(fee,)| fee))
    }

    async fn latest_index(&self) -> StorageResult<Option<u64>> {
        // MAX returns NULL when table is empty, so we need Option<i64> in the tuple
        let row: (Option<i64>,) = sqlx::query_as("SELECT MAX(index) FROM blocks")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        Ok(row.0.map(|n| n as u64))
    }

    async fn backfill_fee_aggregates(&self) -> StorageResult<u64> {
        let result = sqlx::query(
            r#"
            WITH block_fees AS (
                SELECT b.index, COALESCE(SUM(t.system_fee), 0) AS fee
                FROM blocks b
                LEFT JOIN transactions t ON t.block_index = b.index
                GROUP BY b.index
            ),
            running AS (
                SELECT index, SUM(fee) OVER (ORDER BY index) AS aggregated
                FROM block_fees
            )
            UPDATE blocks
            SET aggregated_system_fee = running.aggregated
            FROM running
            WHERE blocks.index = running.index
              AND blocks.aggregated_system_fee IS DISTINCT FROM running.aggregated
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        Ok(result.rows_affected())
    }
}

/// Database row representation for Block.
#[derive(sqlx::FromRow)]
pub(super) struct BlockRow {
    index: i64,
    hash: Vec<u8>,
    previous_hash: Vec<u8>,
    merkle_root: Vec<u8>,
    timestamp: Option<chrono::DateTime<chrono::Utc>>,
    size: i32,
    transaction_count: i32,
    aggregated_system_fee: BigDecimal,
    indexed_at: chrono::DateTime<chrono::Utc>,
}

impl BlockRow {
    pub(super) fn into_block(self) -> StorageResult<Block> {
        Ok(Block {
            index: self.index as u64,
            hash: BlockHash(bytes_to_hash32_strict(self.hash, "block.hash")?),
            // Non-strict: the genesis block's previous hash is all zeros
            previous_hash: BlockHash(bytes_to_hash32(self.previous_hash, "block.previous_hash")?),
            merkle_root: BlockHash(bytes_to_hash32(self.merkle_root, "block.merkle_root")?),
            timestamp: self.timestamp,
            size: self.size as u32,
            transaction_count: self.transaction_count as u32,
            aggregated_system_fee: self.aggregated_system_fee,
            indexed_at: self.indexed_at,
        })
    }
}
