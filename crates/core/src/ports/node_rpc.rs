//! Port trait for the blockchain node RPC client.
//!
//! This trait defines the interface for fetching blocks and querying
//! NEP5 token contracts from a NEO node. Implementations live in the
//! infrastructure layer (e.g., `argus-chain`).

use async_trait::async_trait;
use bigdecimal::BigDecimal;

use crate::error::ChainResult;
use crate::models::ContractHash;

/// Raw block data from the node before domain transformation.
#[derive(Debug, Clone)]
pub struct RawBlock {
    /// Block index (height).
    pub index: u64,
    /// Block hash.
    pub hash: [u8; 32],
    /// Previous block hash (all zeros for genesis).
    pub previous_hash: [u8; 32],
    /// Merkle root of the transactions.
    pub merkle_root: [u8; 32],
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// Block size in bytes.
    pub size: u32,
    /// Ordered transactions.
    pub transactions: Vec<RawTransaction>,
}

/// Raw transaction data.
#[derive(Debug, Clone)]
pub struct RawTransaction {
    /// Transaction hash.
    pub id: String,
    /// Index in block.
    pub index: u32,
    /// Transaction type label.
    pub tx_type: String,
    /// System fee as a decimal string.
    pub system_fee: String,
    /// Network fee as a decimal string.
    pub network_fee: String,
    /// NEP5 transfer notifications emitted by this transaction.
    pub transfers: Vec<RawTransfer>,
}

/// Raw NEP5 transfer notification.
#[derive(Debug, Clone)]
pub struct RawTransfer {
    /// Script hash of the emitting contract.
    pub contract: [u8; 20],
    /// Sender address (None for mints).
    pub from: Option<String>,
    /// Recipient address (None for burns).
    pub to: Option<String>,
    /// Amount as a decimal string, in token units.
    pub amount: String,
}

/// Port trait for the node RPC client.
///
/// All operations may fail transiently; retry policy is the caller's
/// concern. Request timeouts are enforced inside implementations and
/// surface as ordinary errors.
#[async_trait]
pub trait NodeRpc: Send + Sync {
    /// Get the number of blocks in the chain (height of the tip + 1).
    async fn block_count(&self) -> ChainResult<u64>;

    /// Fetch the full block at `index`.
    async fn get_block(&self, index: u64) -> ChainResult<RawBlock>;

    /// Resolve the decimal precision of a NEP5 contract.
    async fn token_decimals(&self, contract: &ContractHash) -> ChainResult<u32>;

    /// Query the balance of `address` for a NEP5 contract, scaled to
    /// token units using `decimals`.
    async fn token_balance(
        &self,
        contract: &ContractHash,
        address: &str,
        decimals: u32,
    ) -> ChainResult<BigDecimal>;
}
