//! Scrape pointer repository implementation for PostgreSQL.

use async_trait::async_trait;
use sqlx::PgPool;

use argus_core::error::{StorageError, StorageResult};
use argus_core::models::{BlockHash, ScrapePointer};
use argus_core::ports::PointerRepository;

use super::database::Database;
use super::helpers::bytes_to_hash32;

/// PostgreSQL implementation of PointerRepository.
///
/// The pointer row is only written by the atomic apply/rollback
/// operations in [`super::PgRepositories`].
pub struct PgPointerRepository {
    pool: PgPool,
}

impl PgPointerRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }
}

#[async_trait]
impl PointerRepository for PgPointerRepository {
    async fn get(&self) -> StorageResult<Option<ScrapePointer>> {
        let row = sqlx::query_as::<_, PointerRow>(
            r#"
            SELECT current_index, current_hash, updated_at
            FROM scrape_pointer
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        row.map(PointerRow::into_pointer).transpose()
    }
}

#[derive(sqlx::FromRow)]
struct PointerRow {
    current_index: i64,
    current_hash: Vec<u8>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl PointerRow {
    fn into_pointer(self) -> StorageResult<ScrapePointer> {
        Ok(ScrapePointer {
            current_index: self.current_index as u64,
            current_hash: BlockHash(bytes_to_hash32(self.current_hash, "pointer.current_hash")?),
            updated_at: self.updated_at,
        })
    }
}
