//! Address balance repository implementation for PostgreSQL.

use async_trait::async_trait;
use sqlx::PgPool;

use argus_core::error::{StorageError, StorageResult};
use argus_core::models::{AddressBalance, ContractHash};
use argus_core::ports::BalanceRepository;

use super::database::Database;
use super::helpers::bytes_to_hash20;

/// PostgreSQL implementation of BalanceRepository.
pub struct PgBalanceRepository {
    pool: PgPool,
}

impl PgBalanceRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }
}

#[async_trait]
impl BalanceRepository for PgBalanceRepository {
    async fn stale_balances(
        &self,
        verified_below: u64,
        limit: u32,
    ) -> StorageResult<Vec<AddressBalance>> {
        let rows = sqlx::query_as::<_, BalanceRow>(
            r#"
            SELECT contract, address, balance, verified_at_block
            FROM address_balances
            WHERE verified_at_block < $1
            ORDER BY verified_at_block ASC
            LIMIT $2
            "#,
        )
        .bind(verified_below as i64)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        rows.into_iter().map(BalanceRow::into_balance).collect()
    }

    async fn record_balance(&self, balance: &AddressBalance) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO address_balances (contract, address, balance, verified_at_block)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (contract, address) DO UPDATE SET
                balance = EXCLUDED.balance,
                verified_at_block = EXCLUDED.verified_at_block
            "#,
        )
        .bind(&balance.contract.0[..])
        .bind(&balance.address)
        .bind(&balance.balance)
        .bind(balance.verified_at_block as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        Ok(())
    }

    async fn clear_verification_marks(&self) -> StorageResult<u64> {
        let result =
            sqlx::query("UPDATE address_balances SET verified_at_block = 0 WHERE verified_at_block <> 0")
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::QueryError(e.to_string()))?;

        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct BalanceRow {
    contract: Vec<u8>,
    address: String,
    balance: bigdecimal::BigDecimal,
    verified_at_block: i64,
}

impl BalanceRow {
    fn into_balance(self) -> StorageResult<AddressBalance> {
        Ok(AddressBalance {
            contract: ContractHash(bytes_to_hash20(self.contract, "balance.contract")?),
            address: self.address,
            balance: self.balance,
            verified_at_block: self.verified_at_block as u64,
        })
    }
}
