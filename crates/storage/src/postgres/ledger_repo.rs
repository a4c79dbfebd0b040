//! Data-migration completion ledger implementation for PostgreSQL.

use async_trait::async_trait;
use sqlx::PgPool;

use argus_core::error::{StorageError, StorageResult};
use argus_core::ports::MigrationLedger;

use super::database::Database;

/// PostgreSQL implementation of MigrationLedger.
pub struct PgMigrationLedger {
    pool: PgPool,
}

impl PgMigrationLedger {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }
}

#[async_trait]
impl MigrationLedger for PgMigrationLedger {
    async fn is_completed(&self, name: &str) -> StorageResult<bool> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT name FROM data_migrations WHERE name = $1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StorageError::QueryError(e.to_string()))?;

        Ok(row.is_some())
    }

    async fn record_completed(&self, name: &str) -> StorageResult<()> {
        sqlx::query("INSERT INTO data_migrations (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;

        Ok(())
    }
}
