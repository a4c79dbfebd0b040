//! Core scraper service - drives block-by-block chain ingestion.
//!
//! The scraper polls the node for new blocks and applies them in strict
//! index order, one block in flight at a time. It detects chain
//! reorganizations through previous-hash linkage, unwinds them within a
//! bounded depth, and periodically re-verifies token balances against the
//! node, lagged behind the tip where reorgs are most likely.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tracing::{debug, error, info, instrument, warn};

use crate::cache::WriteCache;
use crate::error::{DomainError, DomainResult, ScrapeError, ScrapeResult, StorageResult};
use crate::metrics::{
    record_balance_repaired, record_block_scraped, record_blocks_rolled_back, record_repair_pass,
    record_reorg_detected, record_rpc_error, ProcessingTimer,
};
use crate::models::{
    AddressBalance, Block, BlockHash, BlockSnapshot, ContractHash, ScrapePointer, TokenTransfer,
    Transaction,
};
use crate::ports::{BlockData, NodeRpc, RawBlock, Repositories};
use crate::pubsub::ProcessedIndexChannel;
use crate::registry::TokenRegistry;

/// Maximum stale balances re-verified per repair pass.
const REPAIR_BATCH_SIZE: u32 = 100;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the scraper service.
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// Maximum blocks fetched and applied per tick.
    pub chunk_size: u32,
    /// Run a balance repair pass every N applied blocks (0 disables).
    pub repair_block_frequency: u64,
    /// Only re-verify balances at least this many seconds behind the tip.
    pub repair_latency_seconds: u64,
    /// Maximum blocks unwound while searching for a common ancestor.
    pub max_rollback_depth: u64,
    /// Polling interval when caught up with the chain.
    pub poll_interval: Duration,
    /// Estimated seconds per block, used to convert the repair latency
    /// into a block-height lag.
    pub block_time_seconds: u64,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            repair_block_frequency: 1000,
            repair_latency_seconds: 900,
            max_rollback_depth: 32,
            poll_interval: Duration::from_secs(15),
            block_time_seconds: 15,
        }
    }
}

// =============================================================================
// Fee cache wiring
// =============================================================================

/// Write-cache over the per-block running fee totals.
pub type SystemFeeCache = WriteCache<u64, BigDecimal>;

/// Build the fee cache, wired to fetch aggregates from the block store.
pub fn system_fee_cache<R: Repositories + 'static>(repos: Arc<R>) -> SystemFeeCache {
    WriteCache::new(Arc::new(
        move |index: u64| -> BoxFuture<'static, StorageResult<Option<BigDecimal>>> {
            let repos = repos.clone();
            Box::pin(async move { repos.blocks().get_fee_aggregate(index).await })
        },
    ))
}

// =============================================================================
// ScraperService
// =============================================================================

/// Loop-local sync position: local height plus the previous-block
/// snapshot used for fork checks. `height == None` means unsynced.
#[derive(Debug, Clone)]
struct ChainCursor {
    height: Option<u64>,
    snapshot: Option<BlockSnapshot>,
}

/// Main scraper service.
///
/// # Flow
///
/// 1. Query the node for the current chain height
/// 2. Fetch up to `chunk_size` blocks past the local height
/// 3. Per block: check previous-hash linkage, unwind on mismatch,
///    otherwise apply atomically and publish the new height
/// 4. Every `repair_block_frequency` blocks, re-verify lagged balances
/// 5. Sleep until the next tick when caught up
pub struct ScraperService<R: Repositories, N: NodeRpc> {
    config: ScraperConfig,
    repos: Arc<R>,
    node: Arc<N>,
    fee_cache: Arc<SystemFeeCache>,
    registry: TokenRegistry,
    publisher: Arc<ProcessedIndexChannel>,
}

impl<R: Repositories, N: NodeRpc> ScraperService<R, N> {
    pub fn new(
        config: ScraperConfig,
        repos: Arc<R>,
        node: Arc<N>,
        fee_cache: Arc<SystemFeeCache>,
        registry: TokenRegistry,
        publisher: Arc<ProcessedIndexChannel>,
    ) -> Self {
        Self {
            config,
            repos,
            node,
            fee_cache,
            registry,
            publisher,
        }
    }

    /// Run the ingestion loop until shutdown or a fatal error.
    ///
    /// Transient store/RPC failures are logged and retried on the next
    /// tick; rollback exhaustion halts the loop.
    #[instrument(skip_all)]
    pub async fn run(
        &self,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) -> ScrapeResult<()> {
        info!("⛓️  Starting scraper");

        let mut cursor = self.load_cursor().await?;
        match cursor.height {
            Some(height) => info!(height, "Resuming from scrape pointer"),
            None => info!("No scrape pointer, starting from genesis"),
        }

        loop {
            if *shutdown_rx.borrow() {
                debug!("Shutdown requested");
                return Err(ScrapeError::ShutdownRequested);
            }

            let applied = match self.tick(&mut cursor).await {
                Ok(applied) => applied,
                Err(e @ ScrapeError::RollbackExhausted { .. }) => {
                    error!(error = %e, "❌ Reorg deeper than rollback limit, halting");
                    return Err(e);
                }
                Err(e) => {
                    warn!(error = %e, "⚠️  Scrape tick failed, retrying next tick");
                    0
                }
            };

            if applied == 0 {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            return Err(ScrapeError::ShutdownRequested);
                        }
                    }
                }
            }
        }
    }

    /// Load the sync position from the durable scrape pointer.
    async fn load_cursor(&self) -> ScrapeResult<ChainCursor> {
        let pointer = self.repos.pointer().get().await?;
        Ok(match pointer {
            Some(pointer) => ChainCursor {
                height: Some(pointer.current_index),
                snapshot: Some(BlockSnapshot {
                    index: pointer.current_index,
                    hash: pointer.current_hash,
                }),
            },
            None => ChainCursor {
                height: None,
                snapshot: None,
            },
        })
    }

    /// One scrape iteration. Returns the number of blocks applied.
    async fn tick(&self, cursor: &mut ChainCursor) -> ScrapeResult<u64> {
        let block_count = self.node.block_count().await?;
        if block_count == 0 {
            return Ok(0);
        }
        let chain_height = block_count - 1;

        let start = cursor.height.map_or(0, |h| h + 1);
        if start > chain_height {
            return Ok(0);
        }
        let chunk = u64::from(self.config.chunk_size).max(1);
        let end = chain_height.min(start + chunk - 1);

        debug!(start, end, chain_height, "Fetching block chunk");

        let mut applied = 0;
        for index in start..=end {
            let raw = self.node.get_block(index).await?;

            if let Some(snapshot) = &cursor.snapshot {
                if raw.previous_hash != snapshot.hash.0 {
                    warn!(
                        block = index,
                        expected = %hex::encode(&raw.previous_hash[..8]),
                        stored = %hex::encode(&snapshot.hash.0[..8]),
                        "🔄 Reorg detected! Previous hash mismatch"
                    );
                    record_reorg_detected(index);
                    self.recover_from_fork(cursor).await?;
                    // Resume from the rewound height on the next tick
                    return Ok(applied);
                }
            }

            self.apply_block(cursor, raw).await?;
            applied += 1;

            if self.config.repair_block_frequency > 0
                && index > 0
                && index % self.config.repair_block_frequency == 0
            {
                if let Err(e) = self.repair_balances(chain_height).await {
                    warn!(error = %e, "⚠️  Balance repair pass failed");
                }
            }
        }

        Ok(applied)
    }

    /// Unwind blocks until previous-hash linkage with the node is
    /// restored, bounded by the configured rollback depth.
    ///
    /// Each unwound height has its fee entry reverted from the cache and
    /// its rows removed from the store in one transaction.
    #[instrument(skip_all)]
    async fn recover_from_fork(&self, cursor: &mut ChainCursor) -> ScrapeResult<()> {
        for depth in 0..self.config.max_rollback_depth {
            let Some(snapshot) = cursor.snapshot.clone() else {
                // Unwound past genesis; restart from scratch
                cursor.height = None;
                return Ok(());
            };

            self.fee_cache.revert(&snapshot.index).await;
            let removed = self.repos.rollback_blocks_from(snapshot.index).await?;
            record_blocks_rolled_back(removed);
            debug!(block = snapshot.index, removed, depth, "🔄 Rolled back block");

            cursor.height = snapshot.index.checked_sub(1);
            cursor.snapshot = match cursor.height {
                Some(height) => {
                    let stored = self.repos.blocks().get_block(height).await?;
                    stored.map(|block| BlockSnapshot {
                        index: block.index,
                        hash: block.hash,
                    })
                }
                None => None,
            };

            let Some(snapshot) = &cursor.snapshot else {
                if cursor.height.is_some() {
                    // Store is missing the block the pointer rewound to;
                    // restart from scratch rather than guess
                    warn!(height = cursor.height, "⚠️  No stored block at rewound height");
                    cursor.height = None;
                }
                return Ok(());
            };

            let candidate = self.node.get_block(snapshot.index + 1).await?;
            if candidate.previous_hash == snapshot.hash.0 {
                info!(height = snapshot.index, "🔄 Chain linkage restored");
                return Ok(());
            }
        }

        Err(ScrapeError::RollbackExhausted {
            at_height: cursor.height.unwrap_or(0),
            depth: self.config.max_rollback_depth,
        })
    }

    /// Apply one block: persist its derived state atomically, then update
    /// the fee cache, the cursor and the index channel.
    async fn apply_block(&self, cursor: &mut ChainCursor, raw: RawBlock) -> ScrapeResult<()> {
        let _timer = ProcessingTimer::new();

        let prev_aggregate = match raw.index.checked_sub(1) {
            Some(prev) => match self.fee_cache.get(&prev).await? {
                Some(aggregate) => aggregate,
                None => {
                    debug!(
                        block = raw.index,
                        "No fee aggregate for previous block, assuming zero"
                    );
                    BigDecimal::from(0)
                }
            },
            None => BigDecimal::from(0),
        };

        let (block, transactions, transfers) = transform_block(&raw, prev_aggregate)?;
        let pointer = ScrapePointer {
            current_index: block.index,
            current_hash: block.hash.clone(),
            updated_at: Utc::now(),
        };

        self.repos
            .apply_block_atomic(BlockData {
                block: &block,
                transactions: &transactions,
                transfers: &transfers,
                pointer: &pointer,
            })
            .await?;

        self.fee_cache
            .save(block.index, block.aggregated_system_fee.clone())
            .await;
        cursor.height = Some(block.index);
        cursor.snapshot = Some(BlockSnapshot {
            index: block.index,
            hash: block.hash.clone(),
        });
        self.publisher.publish(block.index).await;

        record_block_scraped();
        debug!(block = block.index, txs = block.transaction_count, "⛓️  Block applied");
        Ok(())
    }

    /// Re-verify stale token balances against the node, at least the
    /// configured latency behind the tip.
    ///
    /// RPC failures skip the entry; the next pass retries it.
    #[instrument(skip(self))]
    async fn repair_balances(&self, chain_height: u64) -> ScrapeResult<()> {
        if self.registry.is_empty() {
            return Ok(());
        }

        let lag_blocks = self.config.repair_latency_seconds / self.config.block_time_seconds.max(1);
        let cutoff = chain_height.saturating_sub(lag_blocks);

        let stale = self
            .repos
            .balances()
            .stale_balances(cutoff, REPAIR_BATCH_SIZE)
            .await?;
        if stale.is_empty() {
            return Ok(());
        }

        debug!(count = stale.len(), cutoff, "🔧 Repairing stale balances");

        for entry in stale {
            let Some(token) = self.registry.get(&entry.contract) else {
                // Blacklisted or no longer cataloged
                continue;
            };

            match token.balance_of(&entry.address).await {
                Ok(balance) => {
                    let repaired = AddressBalance {
                        balance,
                        verified_at_block: cutoff,
                        ..entry
                    };
                    self.repos.balances().record_balance(&repaired).await?;
                    record_balance_repaired();
                }
                Err(e) => {
                    debug!(
                        contract = %entry.contract,
                        address = %entry.address,
                        error = %e,
                        "Balance query failed, retrying next pass"
                    );
                    record_rpc_error("balance_of");
                }
            }
        }

        record_repair_pass();
        Ok(())
    }
}

// =============================================================================
// Transformation
// =============================================================================

/// Transform a raw block into domain models, folding the previous
/// running fee total into this block's aggregate.
fn transform_block(
    raw: &RawBlock,
    prev_aggregate: BigDecimal,
) -> DomainResult<(Block, Vec<Transaction>, Vec<TokenTransfer>)> {
    let mut block_fee = BigDecimal::from(0);
    let mut transactions = Vec::with_capacity(raw.transactions.len());
    let mut transfers = Vec::new();

    for tx in &raw.transactions {
        let system_fee = parse_fee(&tx.system_fee)?;
        let network_fee = parse_fee(&tx.network_fee)?;
        block_fee += &system_fee;

        transactions.push(Transaction {
            id: tx.id.clone(),
            block_index: raw.index,
            index_in_block: tx.index,
            tx_type: tx.tx_type.clone(),
            system_fee,
            network_fee,
        });

        for (notification_index, transfer) in tx.transfers.iter().enumerate() {
            transfers.push(TokenTransfer {
                id: format!("{}-{}", tx.id, notification_index),
                transaction_id: tx.id.clone(),
                block_index: raw.index,
                contract: ContractHash(transfer.contract),
                from: transfer.from.clone(),
                to: transfer.to.clone(),
                amount: parse_fee(&transfer.amount)?,
            });
        }
    }

    let block = Block {
        index: raw.index,
        hash: BlockHash(raw.hash),
        previous_hash: BlockHash(raw.previous_hash),
        merkle_root: BlockHash(raw.merkle_root),
        timestamp: DateTime::from_timestamp(raw.timestamp as i64, 0),
        size: raw.size,
        transaction_count: raw.transactions.len() as u32,
        aggregated_system_fee: prev_aggregate + block_fee,
        indexed_at: Utc::now(),
    };

    Ok((block, transactions, transfers))
}

fn parse_fee(value: &str) -> DomainResult<BigDecimal> {
    BigDecimal::from_str(value).map_err(|_| DomainError::InvalidFee(value.to_string()))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;

    use crate::ports::BlockRepository;
    use crate::registry::build_token_registry;
    use crate::testkit::{
        nep5_contract, raw_block, raw_chain, test_hash, MemoryRepositories, ScriptedNode,
    };

    struct Harness {
        repos: Arc<MemoryRepositories>,
        node: Arc<ScriptedNode>,
        fee_cache: Arc<SystemFeeCache>,
        channel: Arc<ProcessedIndexChannel>,
        service: ScraperService<MemoryRepositories, ScriptedNode>,
    }

    fn harness(chain: Vec<RawBlock>, config: ScraperConfig) -> Harness {
        let repos = Arc::new(MemoryRepositories::new());
        let node = Arc::new(ScriptedNode::with_chain(chain));
        let fee_cache = Arc::new(system_fee_cache(repos.clone()));
        let channel = Arc::new(ProcessedIndexChannel::new(64));
        let service = ScraperService::new(
            config,
            repos.clone(),
            node.clone(),
            fee_cache.clone(),
            TokenRegistry::empty(),
            channel.clone(),
        );
        Harness {
            repos,
            node,
            fee_cache,
            channel,
            service,
        }
    }

    #[tokio::test]
    async fn applies_blocks_in_order_and_publishes_heights() {
        let h = harness(raw_chain(4, 1), ScraperConfig::default());
        let mut rx = h.channel.subscribe().await.unwrap();

        let mut cursor = h.service.load_cursor().await.unwrap();
        assert_eq!(cursor.height, None);

        let applied = h.service.tick(&mut cursor).await.unwrap();
        assert_eq!(applied, 4);
        assert_eq!(cursor.height, Some(3));

        // Une notification par bloc, en ordre croissant
        for expected in 0..4u64 {
            assert_eq!(rx.recv().await.unwrap(), expected);
        }

        // Le total de frais cumule 1 par bloc
        let block = h.repos.get_block(3).await.unwrap().unwrap();
        assert_eq!(block.aggregated_system_fee, BigDecimal::from(4));

        let pointer = h.repos.stored_pointer().unwrap();
        assert_eq!(pointer.current_index, 3);
        assert_eq!(pointer.current_hash.0, test_hash(3, 1));
    }

    #[tokio::test]
    async fn chunked_sync_applies_in_batches() {
        let config = ScraperConfig {
            chunk_size: 2,
            ..Default::default()
        };
        let h = harness(raw_chain(4, 1), config);
        let mut rx = h.channel.subscribe().await.unwrap();
        let mut cursor = h.service.load_cursor().await.unwrap();

        assert_eq!(h.service.tick(&mut cursor).await.unwrap(), 2);
        assert_eq!(cursor.height, Some(1));
        assert_eq!(h.service.tick(&mut cursor).await.unwrap(), 2);
        assert_eq!(cursor.height, Some(3));
        assert_eq!(h.service.tick(&mut cursor).await.unwrap(), 0);

        for expected in 0..4u64 {
            assert_eq!(rx.recv().await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn caught_up_tick_does_nothing() {
        let h = harness(raw_chain(2, 1), ScraperConfig::default());
        let mut cursor = h.service.load_cursor().await.unwrap();

        h.service.tick(&mut cursor).await.unwrap();
        let mut rx = h.channel.subscribe().await.unwrap();

        assert_eq!(h.service.tick(&mut cursor).await.unwrap(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn empty_chain_tick_does_nothing() {
        let h = harness(Vec::new(), ScraperConfig::default());
        let mut cursor = h.service.load_cursor().await.unwrap();
        assert_eq!(h.service.tick(&mut cursor).await.unwrap(), 0);
        assert_eq!(cursor.height, None);
    }

    #[tokio::test]
    async fn resumes_from_durable_pointer() {
        let h = harness(raw_chain(3, 1), ScraperConfig::default());
        let mut cursor = h.service.load_cursor().await.unwrap();
        h.service.tick(&mut cursor).await.unwrap();

        // Redémarrage: un nouveau service sur le même store reprend au
        // pointeur, pas à zéro
        let restarted = ScraperService::new(
            ScraperConfig::default(),
            h.repos.clone(),
            h.node.clone(),
            Arc::new(system_fee_cache(h.repos.clone())),
            TokenRegistry::empty(),
            Arc::new(ProcessedIndexChannel::new(64)),
        );
        let mut cursor = restarted.load_cursor().await.unwrap();
        assert_eq!(cursor.height, Some(2));

        h.node.set_chain(raw_chain(5, 1));
        assert_eq!(restarted.tick(&mut cursor).await.unwrap(), 2);
        assert_eq!(cursor.height, Some(4));
    }

    #[tokio::test]
    async fn apply_failure_aborts_block_and_retries_same_height() {
        let h = harness(raw_chain(2, 1), ScraperConfig::default());
        let mut cursor = h.service.load_cursor().await.unwrap();

        h.repos.fail_next_apply();
        assert!(h.service.tick(&mut cursor).await.is_err());
        // Rien n'a avancé: pas de commit partiel
        assert_eq!(cursor.height, None);
        assert_eq!(h.repos.stored_block_count(), 0);

        // Le tick suivant réessaie à partir de la même hauteur
        assert_eq!(h.service.tick(&mut cursor).await.unwrap(), 2);
        assert_eq!(cursor.height, Some(1));
    }

    #[tokio::test]
    async fn fork_unwinds_to_common_ancestor_then_reapplies() {
        let h = harness(raw_chain(3, 1), ScraperConfig::default());
        let mut cursor = h.service.load_cursor().await.unwrap();
        h.service.tick(&mut cursor).await.unwrap();
        assert_eq!(cursor.height, Some(2));

        // Fork au bloc 2: la nouvelle chaîne garde 0 et 1, remplace 2 et
        // ajoute 3
        let base = raw_chain(3, 1);
        let forked = vec![
            base[0].clone(),
            base[1].clone(),
            raw_block(2, 2, Some(test_hash(1, 1))),
            raw_block(3, 2, None),
        ];
        h.node.set_chain(forked);

        let applied = h.service.tick(&mut cursor).await.unwrap();
        assert_eq!(applied, 0);
        assert_eq!(cursor.height, Some(1));
        assert_eq!(h.repos.rollback_calls(), vec![2]);

        // L'entrée de frais du bloc 2 est revenue au store (qui ne l'a
        // plus): le cache refetch et trouve l'absence
        assert_eq!(h.fee_cache.get(&2).await.unwrap(), None);

        // Le tick suivant applique la branche gagnante
        assert_eq!(h.service.tick(&mut cursor).await.unwrap(), 2);
        assert_eq!(cursor.height, Some(3));
        let block = h.repos.get_block(2).await.unwrap().unwrap();
        assert_eq!(block.hash.0, test_hash(2, 2));
    }

    // Test critique: une réorg plus profonde que la limite est fatale
    #[tokio::test]
    async fn deep_fork_exhausts_rollback_depth() {
        let config = ScraperConfig {
            max_rollback_depth: 2,
            ..Default::default()
        };
        let h = harness(raw_chain(4, 1), config);
        let mut cursor = h.service.load_cursor().await.unwrap();
        h.service.tick(&mut cursor).await.unwrap();

        // La chaîne entière est remplacée: aucun ancêtre commun en vue
        h.node.set_chain(raw_chain(5, 2));

        let err = h.service.tick(&mut cursor).await.unwrap_err();
        assert!(matches!(err, ScrapeError::RollbackExhausted { depth: 2, .. }));
        assert_eq!(h.repos.rollback_calls(), vec![3, 2]);
    }

    #[tokio::test]
    async fn fork_back_to_genesis_restarts_from_scratch() {
        let h = harness(raw_chain(2, 1), ScraperConfig::default());
        let mut cursor = h.service.load_cursor().await.unwrap();
        h.service.tick(&mut cursor).await.unwrap();

        h.node.set_chain(raw_chain(3, 2));

        assert_eq!(h.service.tick(&mut cursor).await.unwrap(), 0);
        assert_eq!(cursor.height, None);
        assert!(cursor.snapshot.is_none());

        assert_eq!(h.service.tick(&mut cursor).await.unwrap(), 3);
        assert_eq!(cursor.height, Some(2));
        let block = h.repos.get_block(0).await.unwrap().unwrap();
        assert_eq!(block.hash.0, test_hash(0, 2));
    }

    #[tokio::test]
    async fn repair_pass_reverifies_lagged_balances() {
        let contract = ContractHash([0xaa; 20]);
        let repos = Arc::new(MemoryRepositories::new());
        repos.insert_contract(nep5_contract(contract.clone(), "XToken", "X"));
        repos.insert_balance(AddressBalance {
            contract: contract.clone(),
            address: "alice".into(),
            balance: BigDecimal::from(0),
            verified_at_block: 0,
        });

        let node = Arc::new(ScriptedNode::with_chain(raw_chain(4, 1)));
        node.set_decimals(contract.clone(), 8);
        node.set_balance(contract.clone(), "alice", "5");

        let registry = build_token_registry(&*repos, &node, &HashSet::new())
            .await
            .unwrap();

        let config = ScraperConfig {
            repair_block_frequency: 2,
            repair_latency_seconds: 30,
            block_time_seconds: 15,
            ..Default::default()
        };
        let service = ScraperService::new(
            config,
            repos.clone(),
            node.clone(),
            Arc::new(system_fee_cache(repos.clone())),
            registry,
            Arc::new(ProcessedIndexChannel::new(64)),
        );

        let mut cursor = service.load_cursor().await.unwrap();
        service.tick(&mut cursor).await.unwrap();

        // chain_height 3, latence 30s / 15s-bloc = 2 blocs de retard
        let repaired = repos.balance(&contract, "alice").unwrap();
        assert_eq!(repaired.balance, BigDecimal::from(5));
        assert_eq!(repaired.verified_at_block, 1);
    }

    #[tokio::test]
    async fn repair_skips_unresolvable_balances() {
        let contract = ContractHash([0xbb; 20]);
        let repos = Arc::new(MemoryRepositories::new());
        repos.insert_contract(nep5_contract(contract.clone(), "YToken", "Y"));
        repos.insert_balance(AddressBalance {
            contract: contract.clone(),
            address: "bob".into(),
            balance: BigDecimal::from(3),
            verified_at_block: 0,
        });

        let node = Arc::new(ScriptedNode::with_chain(raw_chain(4, 1)));
        node.set_decimals(contract.clone(), 8);
        // Pas de balance scriptée pour bob: l'appel RPC échoue

        let registry = build_token_registry(&*repos, &node, &HashSet::new())
            .await
            .unwrap();
        let config = ScraperConfig {
            repair_block_frequency: 2,
            repair_latency_seconds: 0,
            ..Default::default()
        };
        let service = ScraperService::new(
            config,
            repos.clone(),
            node.clone(),
            Arc::new(system_fee_cache(repos.clone())),
            registry,
            Arc::new(ProcessedIndexChannel::new(64)),
        );

        let mut cursor = service.load_cursor().await.unwrap();
        service.tick(&mut cursor).await.unwrap();

        // L'échec est transitoire: l'entrée reste stale pour la
        // prochaine passe
        let untouched = repos.balance(&contract, "bob").unwrap();
        assert_eq!(untouched.verified_at_block, 0);
    }

    #[tokio::test]
    async fn run_loop_stops_on_shutdown() {
        let h = harness(raw_chain(2, 1), ScraperConfig {
            poll_interval: Duration::from_millis(5),
            ..Default::default()
        });
        let mut rx = h.channel.subscribe().await.unwrap();

        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let service = h.service;
        let handle = tokio::spawn(async move { service.run(shutdown_rx).await });

        assert_eq!(rx.recv().await.unwrap(), 0);
        assert_eq!(rx.recv().await.unwrap(), 1);

        shutdown_tx.send(true).unwrap();
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(ScrapeError::ShutdownRequested)));
    }

    #[test]
    fn transform_rejects_malformed_fees() {
        let mut raw = raw_block(0, 1, None);
        raw.transactions[0].system_fee = "not-a-number".into();

        let err = transform_block(&raw, BigDecimal::from(0)).unwrap_err();
        assert!(matches!(err, DomainError::InvalidFee(_)));
    }

    #[test]
    fn transform_derives_transfers_with_stable_ids() {
        use crate::ports::RawTransfer;

        let mut raw = raw_block(5, 1, None);
        raw.transactions[0].transfers = vec![
            RawTransfer {
                contract: [0xcc; 20],
                from: None,
                to: Some("carol".into()),
                amount: "10".into(),
            },
            RawTransfer {
                contract: [0xcc; 20],
                from: Some("carol".into()),
                to: Some("dave".into()),
                amount: "2.5".into(),
            },
        ];

        let (_, _, transfers) = transform_block(&raw, BigDecimal::from(0)).unwrap();
        assert_eq!(transfers.len(), 2);
        assert_eq!(transfers[0].id, "tx-1-5-0");
        assert_eq!(transfers[1].id, "tx-1-5-1");
        assert_eq!(transfers[0].from, None);
        assert_eq!(transfers[1].amount, BigDecimal::from_str("2.5").unwrap());
    }
}
