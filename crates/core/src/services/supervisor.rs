//! Configuration-scoped lifecycle for the scraper.
//!
//! Options snapshots arrive as a serialized stream. Each snapshot
//! supersedes the previous one: the supervisor tears down the in-flight
//! epoch (shutdown signal, index channel close, task join) before
//! constructing the next processing context - token registry rebuild,
//! pending data migrations, fresh index channel - and spawning its loop.
//! At most one loop and one channel are live per epoch. Partially-applied
//! work from a torn-down loop is not rolled back; the next loop resumes
//! from the durable scrape pointer.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, instrument, Instrument};

use crate::error::{ScrapeError, ScrapeResult};
use crate::migrate::{data_migrations, MigrationHandler};
use crate::models::ContractHash;
use crate::ports::{NodeRpc, Repositories};
use crate::pubsub::ProcessedIndexChannel;
use crate::registry::build_token_registry;
use crate::services::scraper::{system_fee_cache, ScraperConfig, ScraperService};

// =============================================================================
// Options
// =============================================================================

/// Full options snapshot driving one configuration epoch.
#[derive(Debug, Clone)]
pub struct ScraperOptions {
    /// Maximum blocks fetched and applied per tick.
    pub chunk_size: u32,
    /// Whether data migrations may run.
    pub migrations_enabled: bool,
    /// NEP5 contracts excluded from tracking.
    pub blacklist: HashSet<ContractHash>,
    /// Run a balance repair pass every N applied blocks.
    pub repair_block_frequency: u64,
    /// Only re-verify balances at least this many seconds behind the tip.
    pub repair_latency_seconds: u64,
    /// Maximum blocks unwound while searching for a common ancestor.
    pub max_rollback_depth: u64,
    /// Polling interval when caught up with the chain.
    pub poll_interval: std::time::Duration,
    /// Buffered notifications per index-channel subscriber.
    pub pubsub_capacity: usize,
}

impl Default for ScraperOptions {
    fn default() -> Self {
        let scraper = ScraperConfig::default();
        Self {
            chunk_size: scraper.chunk_size,
            migrations_enabled: true,
            blacklist: HashSet::new(),
            repair_block_frequency: scraper.repair_block_frequency,
            repair_latency_seconds: scraper.repair_latency_seconds,
            max_rollback_depth: scraper.max_rollback_depth,
            poll_interval: scraper.poll_interval,
            pubsub_capacity: 1024,
        }
    }
}

// =============================================================================
// Epoch
// =============================================================================

/// Resources owned by one configuration epoch.
struct Epoch {
    shutdown_tx: watch::Sender<bool>,
    channel: Arc<ProcessedIndexChannel>,
    handle: JoinHandle<()>,
}

impl Epoch {
    /// Tear down in order: stop the loop, close the index channel, then
    /// wait for the task to finish.
    async fn teardown(self) {
        let _ = self.shutdown_tx.send(true);
        self.channel.close().await;
        let _ = self.handle.await;
        debug!("Epoch torn down");
    }
}

// =============================================================================
// Supervisor
// =============================================================================

/// Drives epoch reconstruction from the options stream.
pub struct Supervisor<R: Repositories + 'static, N: NodeRpc + 'static> {
    repos: Arc<R>,
    node: Arc<N>,
    current_channel: tokio::sync::Mutex<Option<Arc<ProcessedIndexChannel>>>,
}

impl<R: Repositories + 'static, N: NodeRpc + 'static> Supervisor<R, N> {
    pub fn new(repos: Arc<R>, node: Arc<N>) -> Self {
        Self {
            repos,
            node,
            current_channel: tokio::sync::Mutex::new(None),
        }
    }

    /// Subscribe to the current epoch's processed-index notifications.
    ///
    /// Returns `None` before the first epoch starts or after shutdown.
    pub async fn subscribe_processed_index(&self) -> Option<broadcast::Receiver<u64>> {
        let channel = self.current_channel.lock().await;
        match channel.as_ref() {
            Some(channel) => channel.subscribe().await,
            None => None,
        }
    }

    /// Consume the options stream until it closes or shutdown is
    /// signalled, superseding the running epoch on every snapshot.
    #[instrument(skip_all)]
    pub async fn run(
        &self,
        mut options_rx: mpsc::Receiver<ScraperOptions>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> ScrapeResult<()> {
        let mut epoch: Option<Epoch> = None;

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        if let Some(epoch) = epoch.take() {
                            epoch.teardown().await;
                        }
                        return Ok(());
                    }
                }
                snapshot = options_rx.recv() => match snapshot {
                    None => {
                        debug!("Options stream closed");
                        if let Some(epoch) = epoch.take() {
                            epoch.teardown().await;
                        }
                        return Ok(());
                    }
                    Some(options) => {
                        info!("🔁 Configuration received, rebuilding scrape context");
                        if let Some(epoch) = epoch.take() {
                            epoch.teardown().await;
                        }
                        match self.start_epoch(options).await {
                            Ok(started) => epoch = Some(started),
                            Err(e) => {
                                // Wait for the next snapshot rather than
                                // scrape with a half-built context
                                error!(error = %e, "❌ Failed to start scrape context");
                            }
                        }
                    }
                },
            }
        }
    }

    /// Construct the processing context for one options snapshot and
    /// spawn its ingestion loop.
    async fn start_epoch(&self, options: ScraperOptions) -> ScrapeResult<Epoch> {
        let registry =
            build_token_registry(self.repos.as_ref(), &self.node, &options.blacklist).await?;
        info!(tokens = registry.len(), "🪙 Token registry built");

        let handler = MigrationHandler::new(options.migrations_enabled, self.repos.clone());
        handler.run_pending(&data_migrations()).await?;

        let channel = Arc::new(ProcessedIndexChannel::new(options.pubsub_capacity));
        *self.current_channel.lock().await = Some(channel.clone());

        let config = ScraperConfig {
            chunk_size: options.chunk_size,
            repair_block_frequency: options.repair_block_frequency,
            repair_latency_seconds: options.repair_latency_seconds,
            max_rollback_depth: options.max_rollback_depth,
            poll_interval: options.poll_interval,
            ..Default::default()
        };
        let service = ScraperService::new(
            config,
            self.repos.clone(),
            self.node.clone(),
            Arc::new(system_fee_cache(self.repos.clone())),
            registry,
            channel.clone(),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(
            async move {
                match service.run(shutdown_rx).await {
                    Ok(()) | Err(ScrapeError::ShutdownRequested) => {}
                    Err(e) => error!(error = %e, "❌ Scraper stopped"),
                }
            }
            .instrument(info_span!("scraper")),
        );

        Ok(Epoch {
            shutdown_tx,
            channel,
            handle,
        })
    }
}
