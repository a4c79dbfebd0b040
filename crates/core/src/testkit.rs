//! Hand-rolled in-memory implementations of the ports, shared by the
//! unit tests in this crate.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::Utc;

use crate::error::{ChainError, ChainResult, StorageError, StorageResult};
use crate::models::{
    AddressBalance, Block, Contract, ContractHash, ScrapePointer, TokenTransfer, Transaction,
    NEP5_CONTRACT_TYPE,
};
use crate::ports::{
    BalanceRepository, BlockData, BlockRepository, ContractRepository, MigrationLedger, NodeRpc,
    PointerRepository, RawBlock, RawTransaction, Repositories,
};

// =============================================================================
// In-memory store
// =============================================================================

#[derive(Default)]
struct StoreState {
    blocks: BTreeMap<u64, Block>,
    transactions: Vec<Transaction>,
    transfers: Vec<TokenTransfer>,
    contracts: Vec<Contract>,
    balances: HashMap<(ContractHash, String), AddressBalance>,
    pointer: Option<ScrapePointer>,
    completed: BTreeSet<String>,
    rollback_calls: Vec<u64>,
}

/// In-memory `Repositories` with fault injection hooks.
pub struct MemoryRepositories {
    state: Mutex<StoreState>,
    fail_next_apply: AtomicBool,
    fail_backfill: AtomicBool,
    healthy: AtomicBool,
    backfill_calls: AtomicU32,
    clear_marks_calls: AtomicU32,
}

impl MemoryRepositories {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            fail_next_apply: AtomicBool::new(false),
            fail_backfill: AtomicBool::new(false),
            healthy: AtomicBool::new(true),
            backfill_calls: AtomicU32::new(0),
            clear_marks_calls: AtomicU32::new(0),
        }
    }

    pub fn insert_contract(&self, contract: Contract) {
        self.state.lock().unwrap().contracts.push(contract);
    }

    pub fn insert_balance(&self, balance: AddressBalance) {
        self.state
            .lock()
            .unwrap()
            .balances
            .insert((balance.contract.clone(), balance.address.clone()), balance);
    }

    pub fn balance(&self, contract: &ContractHash, address: &str) -> Option<AddressBalance> {
        self.state
            .lock()
            .unwrap()
            .balances
            .get(&(contract.clone(), address.to_string()))
            .cloned()
    }

    pub fn stored_pointer(&self) -> Option<ScrapePointer> {
        self.state.lock().unwrap().pointer.clone()
    }

    pub fn stored_block_count(&self) -> usize {
        self.state.lock().unwrap().blocks.len()
    }

    pub fn rollback_calls(&self) -> Vec<u64> {
        self.state.lock().unwrap().rollback_calls.clone()
    }

    pub fn backfill_calls(&self) -> u32 {
        self.backfill_calls.load(Ordering::SeqCst)
    }

    pub fn clear_marks_calls(&self) -> u32 {
        self.clear_marks_calls.load(Ordering::SeqCst)
    }

    /// Make the next `apply_block_atomic` fail once.
    pub fn fail_next_apply(&self) {
        self.fail_next_apply.store(true, Ordering::SeqCst);
    }

    /// Make `backfill_fee_aggregates` fail permanently.
    pub fn fail_backfill(&self) {
        self.fail_backfill.store(true, Ordering::SeqCst);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlockRepository for MemoryRepositories {
    async fn get_block(&self, index: u64) -> StorageResult<Option<Block>> {
        Ok(self.state.lock().unwrap().blocks.get(&index).cloned())
    }

    async fn get_fee_aggregate(&self, index: u64) -> StorageResult<Option<BigDecimal>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .blocks
            .get(&index)
            .map(|b| b.aggregated_system_fee.clone()))
    }

    async fn latest_index(&self) -> StorageResult<Option<u64>> {
        Ok(self.state.lock().unwrap().blocks.keys().next_back().copied())
    }

    async fn backfill_fee_aggregates(&self) -> StorageResult<u64> {
        if self.fail_backfill.load(Ordering::SeqCst) {
            return Err(StorageError::QueryError("injected backfill failure".into()));
        }
        self.backfill_calls.fetch_add(1, Ordering::SeqCst);
        Ok(0)
    }
}

#[async_trait]
impl ContractRepository for MemoryRepositories {
    async fn list_by_type(&self, contract_type: &str) -> StorageResult<Vec<Contract>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .contracts
            .iter()
            .filter(|c| c.contract_type == contract_type)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl BalanceRepository for MemoryRepositories {
    async fn stale_balances(
        &self,
        verified_below: u64,
        limit: u32,
    ) -> StorageResult<Vec<AddressBalance>> {
        let mut stale: Vec<AddressBalance> = self
            .state
            .lock()
            .unwrap()
            .balances
            .values()
            .filter(|b| b.verified_at_block < verified_below)
            .cloned()
            .collect();
        stale.sort_by_key(|b| b.verified_at_block);
        stale.truncate(limit as usize);
        Ok(stale)
    }

    async fn record_balance(&self, balance: &AddressBalance) -> StorageResult<()> {
        self.state
            .lock()
            .unwrap()
            .balances
            .insert((balance.contract.clone(), balance.address.clone()), balance.clone());
        Ok(())
    }

    async fn clear_verification_marks(&self) -> StorageResult<u64> {
        self.clear_marks_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let mut reset = 0;
        for balance in state.balances.values_mut() {
            if balance.verified_at_block != 0 {
                balance.verified_at_block = 0;
                reset += 1;
            }
        }
        Ok(reset)
    }
}

#[async_trait]
impl PointerRepository for MemoryRepositories {
    async fn get(&self) -> StorageResult<Option<ScrapePointer>> {
        Ok(self.state.lock().unwrap().pointer.clone())
    }
}

#[async_trait]
impl MigrationLedger for MemoryRepositories {
    async fn is_completed(&self, name: &str) -> StorageResult<bool> {
        Ok(self.state.lock().unwrap().completed.contains(name))
    }

    async fn record_completed(&self, name: &str) -> StorageResult<()> {
        self.state.lock().unwrap().completed.insert(name.to_string());
        Ok(())
    }
}

#[async_trait]
impl Repositories for MemoryRepositories {
    fn blocks(&self) -> &dyn BlockRepository {
        self
    }

    fn contracts(&self) -> &dyn ContractRepository {
        self
    }

    fn balances(&self) -> &dyn BalanceRepository {
        self
    }

    fn pointer(&self) -> &dyn PointerRepository {
        self
    }

    fn migrations(&self) -> &dyn MigrationLedger {
        self
    }

    async fn apply_block_atomic(&self, data: BlockData<'_>) -> StorageResult<()> {
        if self.fail_next_apply.swap(false, Ordering::SeqCst) {
            return Err(StorageError::TransactionError("injected apply failure".into()));
        }
        let mut state = self.state.lock().unwrap();
        state.blocks.insert(data.block.index, data.block.clone());
        state.transactions.extend_from_slice(data.transactions);
        state.transfers.extend_from_slice(data.transfers);
        state.pointer = Some(data.pointer.clone());
        Ok(())
    }

    async fn rollback_blocks_from(&self, from_index: u64) -> StorageResult<u64> {
        let mut state = self.state.lock().unwrap();
        state.rollback_calls.push(from_index);

        let removed_keys: Vec<u64> = state.blocks.range(from_index..).map(|(k, _)| *k).collect();
        for key in &removed_keys {
            state.blocks.remove(key);
        }
        state.transactions.retain(|t| t.block_index < from_index);
        state.transfers.retain(|t| t.block_index < from_index);

        state.pointer = match from_index.checked_sub(1) {
            Some(prev) => state.blocks.get(&prev).map(|b| ScrapePointer {
                current_index: b.index,
                current_hash: b.hash.clone(),
                updated_at: Utc::now(),
            }),
            None => None,
        };

        Ok(removed_keys.len() as u64)
    }

    async fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Scripted node
// =============================================================================

/// In-memory `NodeRpc` backed by a scripted chain.
pub struct ScriptedNode {
    blocks: Mutex<Vec<RawBlock>>,
    decimals: Mutex<HashMap<ContractHash, u32>>,
    balances: Mutex<HashMap<(ContractHash, String), String>>,
}

impl ScriptedNode {
    pub fn new() -> Self {
        Self {
            blocks: Mutex::new(Vec::new()),
            decimals: Mutex::new(HashMap::new()),
            balances: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_chain(blocks: Vec<RawBlock>) -> Self {
        let node = Self::new();
        node.set_chain(blocks);
        node
    }

    /// Replace the scripted chain wholesale (fork simulation).
    pub fn set_chain(&self, blocks: Vec<RawBlock>) {
        *self.blocks.lock().unwrap() = blocks;
    }

    pub fn set_decimals(&self, contract: ContractHash, decimals: u32) {
        self.decimals.lock().unwrap().insert(contract, decimals);
    }

    pub fn set_balance(&self, contract: ContractHash, address: &str, amount: &str) {
        self.balances
            .lock()
            .unwrap()
            .insert((contract, address.to_string()), amount.to_string());
    }
}

#[async_trait]
impl NodeRpc for ScriptedNode {
    async fn block_count(&self) -> ChainResult<u64> {
        Ok(self.blocks.lock().unwrap().len() as u64)
    }

    async fn get_block(&self, index: u64) -> ChainResult<RawBlock> {
        self.blocks
            .lock()
            .unwrap()
            .get(index as usize)
            .cloned()
            .ok_or_else(|| ChainError::RpcError(format!("block {} not available", index)))
    }

    async fn token_decimals(&self, contract: &ContractHash) -> ChainResult<u32> {
        self.decimals
            .lock()
            .unwrap()
            .get(contract)
            .copied()
            .ok_or_else(|| ChainError::RpcError("decimals unavailable".into()))
    }

    async fn token_balance(
        &self,
        contract: &ContractHash,
        address: &str,
        _decimals: u32,
    ) -> ChainResult<BigDecimal> {
        let balances = self.balances.lock().unwrap();
        let raw = balances
            .get(&(contract.clone(), address.to_string()))
            .ok_or_else(|| ChainError::RpcError("balance unavailable".into()))?;
        BigDecimal::from_str(raw).map_err(|e| ChainError::MalformedResponse(e.to_string()))
    }
}

// =============================================================================
// Builders
// =============================================================================

/// Deterministic block hash for test chains. `tag` distinguishes forks.
pub fn test_hash(index: u64, tag: u8) -> [u8; 32] {
    let mut hash = [0u8; 32];
    hash[0] = tag;
    hash[1..9].copy_from_slice(&(index + 1).to_be_bytes());
    hash
}

/// Build a linked chain of `len` blocks, each carrying one transaction
/// with a system fee of 1.
pub fn raw_chain(len: u64, tag: u8) -> Vec<RawBlock> {
    (0..len).map(|index| raw_block(index, tag, None)).collect()
}

/// Build one block of a chain tagged `tag`, linked to its predecessor
/// (or to `previous_override` when splicing a fork onto another chain).
pub fn raw_block(index: u64, tag: u8, previous_override: Option<[u8; 32]>) -> RawBlock {
    let previous_hash = previous_override.unwrap_or_else(|| match index.checked_sub(1) {
        Some(prev) => test_hash(prev, tag),
        None => [0u8; 32],
    });

    RawBlock {
        index,
        hash: test_hash(index, tag),
        previous_hash,
        merkle_root: test_hash(index, tag.wrapping_add(100)),
        timestamp: 1_500_000_000 + index * 15,
        size: 1024,
        transactions: vec![RawTransaction {
            id: format!("tx-{}-{}", tag, index),
            index: 0,
            tx_type: "ContractTransaction".into(),
            system_fee: "1".into(),
            network_fee: "0.001".into(),
            transfers: Vec::new(),
        }],
    }
}

/// A NEP5 catalogue entry for tests.
pub fn nep5_contract(hash: ContractHash, name: &str, symbol: &str) -> Contract {
    Contract {
        hash,
        contract_type: NEP5_CONTRACT_TYPE.into(),
        name: name.into(),
        symbol: symbol.into(),
        decimals: 8,
        first_seen_block: 0,
    }
}
