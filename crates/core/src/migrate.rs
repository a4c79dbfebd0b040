//! Exactly-once execution ledger for named data migrations.
//!
//! Data migrations repair or backfill derived data (as opposed to schema
//! migrations, which the storage layer owns). The [`MigrationHandler`]
//! gates each migration against the persisted completion ledger, and the
//! completion record is only written after the migration's effects have
//! committed: a crash in between yields safe re-execution on restart.
//! Migrations are therefore at-least-once and must be idempotent by
//! contract with their authors.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, info, instrument};

use crate::error::{ScrapeResult, StorageResult};
use crate::metrics::record_data_migration_applied;
use crate::ports::Repositories;

/// Migration body. Receives the repositories and performs its effects.
pub type MigrationFn<R> = fn(Arc<R>) -> BoxFuture<'static, ScrapeResult<()>>;

/// A named data migration.
pub struct DataMigration<R> {
    /// Ledger key. Never rename a shipped migration.
    pub name: &'static str,
    /// Migration body.
    pub run: MigrationFn<R>,
}

/// The declared migrations, in execution order.
///
/// A later migration never executes before an earlier one completes.
pub fn data_migrations<R: Repositories + 'static>() -> Vec<DataMigration<R>> {
    vec![
        DataMigration {
            name: "backfill_fee_aggregates",
            run: |repos| {
                Box::pin(async move {
                    repos.blocks().backfill_fee_aggregates().await?;
                    Ok(())
                })
            },
        },
        DataMigration {
            name: "reset_balance_verification",
            run: |repos| {
                Box::pin(async move {
                    repos.balances().clear_verification_marks().await?;
                    Ok(())
                })
            },
        },
    ]
}

/// Gates data migrations against the persisted completion ledger.
pub struct MigrationHandler<R: Repositories> {
    enabled: bool,
    repos: Arc<R>,
}

impl<R: Repositories + 'static> MigrationHandler<R> {
    pub fn new(enabled: bool, repos: Arc<R>) -> Self {
        Self { enabled, repos }
    }

    /// Whether `name` should execute: false when disabled globally or a
    /// completion record already exists.
    pub async fn should_execute(&self, name: &str) -> StorageResult<bool> {
        if !self.enabled {
            return Ok(false);
        }
        Ok(!self.repos.migrations().is_completed(name).await?)
    }

    /// Durably record completion of `name`.
    ///
    /// Must be called only after the migration's effects are committed.
    pub async fn on_complete(&self, name: &str) -> StorageResult<()> {
        self.repos.migrations().record_completed(name).await
    }

    /// Run all pending migrations strictly in declared order.
    ///
    /// A failure halts later migrations and propagates.
    #[instrument(skip_all)]
    pub async fn run_pending(&self, migrations: &[DataMigration<R>]) -> ScrapeResult<()> {
        for migration in migrations {
            if !self.should_execute(migration.name).await? {
                debug!(name = migration.name, "Migration skipped");
                continue;
            }

            info!(name = migration.name, "🗄️  Applying data migration");
            (migration.run)(self.repos.clone()).await?;
            self.on_complete(migration.name).await?;
            record_data_migration_applied(migration.name);
        }

        Ok(())
    }
}
