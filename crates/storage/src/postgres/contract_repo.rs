//! Contract catalogue repository implementation for PostgreSQL.

use async_trait::async_trait;
use sqlx::PgPool;

use argus_core::error::{StorageError, StorageResult};
use argus_core::models::{Contract, ContractHash};
use argus_core::ports::ContractRepository;

use super::database::Database;
use super::helpers::bytes_to_hash20;

/// PostgreSQL implementation of ContractRepository.
pub struct PgContractRepository {
    pool: PgPool,
}

impl PgContractRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }
}

#[async_trait]
impl ContractRepository for PgContractRepository {
    async fn list_by_type(&self, contract_type: &str) -> StorageResult<Vec<Contract>> {
        let rows = sqlx::query_as::<_, ContractRow>(
            r#"
            SELECT hash, type, name, symbol, decimals, first_seen_block
            FROM contracts
            WHERE type = $1
            ORDER BY first_seen_block ASC
            "#,
        )
        .bind(contract_type)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        rows.into_iter().map(ContractRow::into_contract).collect()
    }
}

#[derive(sqlx::FromRow)]
struct ContractRow {
    hash: Vec<u8>,
    #[sqlx(rename = "type")]
    contract_type: String,
    name: String,
    symbol: String,
    decimals: i32,
    first_seen_block: i64,
}

impl ContractRow {
    fn into_contract(self) -> StorageResult<Contract> {
        Ok(Contract {
            hash: ContractHash(bytes_to_hash20(self.hash, "contract.hash")?),
            contract_type: self.contract_type,
            name: self.name,
            symbol: self.symbol,
            decimals: self.decimals as u32,
            first_seen_block: self.first_seen_block as u64,
        })
    }
}
