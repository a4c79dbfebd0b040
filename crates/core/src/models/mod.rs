//! Domain models representing indexed blockchain data.
//!
//! These models are storage-agnostic and represent the canonical
//! form of indexed data within the domain layer.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Contract type label for NEP5 fungible-token contracts.
pub const NEP5_CONTRACT_TYPE: &str = "NEP5";

// =============================================================================
// Hash Newtypes
// =============================================================================

/// Macro to generate fixed-size hash newtypes with common functionality.
///
/// Generates:
/// - `from_hex()` - Parse from hex string (with or without 0x prefix)
/// - `to_hex()` - Convert to 0x-prefixed hex string
/// - `Display` trait implementation
/// - `From<[u8; N]>` implementation
macro_rules! hash_newtype {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            /// Parse from hex string (with or without 0x prefix).
            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let s = s.strip_prefix("0x").unwrap_or(s);
                let bytes = hex::decode(s)?;
                let arr: [u8; $len] = bytes
                    .try_into()
                    .map_err(|_| hex::FromHexError::InvalidStringLength)?;
                Ok(Self(arr))
            }

            /// Convert to 0x-prefixed hex string.
            pub fn to_hex(&self) -> String {
                format!("0x{}", hex::encode(self.0))
            }

            /// Get the inner bytes.
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }
    };
}

hash_newtype!(
    /// 32-byte block hash (UInt256).
    BlockHash,
    32
);

hash_newtype!(
    /// 20-byte contract script hash (UInt160).
    ContractHash,
    20
);

// =============================================================================
// Block & Chain Data
// =============================================================================

/// Indexed block with all relevant metadata.
///
/// `aggregated_system_fee` is the running total of system fees up to and
/// including this block, so per-range fee sums are a two-row subtraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    /// Block index (height, genesis = 0).
    pub index: u64,
    /// Block hash.
    pub hash: BlockHash,
    /// Previous block hash (all zeros for genesis).
    pub previous_hash: BlockHash,
    /// Merkle root of the block's transactions.
    pub merkle_root: BlockHash,
    /// Block timestamp (if available).
    pub timestamp: Option<DateTime<Utc>>,
    /// Block size in bytes.
    pub size: u32,
    /// Number of transactions in this block.
    pub transaction_count: u32,
    /// Running total of system fees up to and including this block.
    pub aggregated_system_fee: BigDecimal,
    /// When this block was indexed.
    pub indexed_at: DateTime<Utc>,
}

/// Indexed transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction hash.
    pub id: String,
    /// Block index containing this transaction.
    pub block_index: u64,
    /// Index within the block (0-based).
    pub index_in_block: u32,
    /// Transaction type label (e.g., "ContractTransaction", "InvocationTransaction").
    pub tx_type: String,
    /// System fee paid by this transaction.
    pub system_fee: BigDecimal,
    /// Network fee paid by this transaction.
    pub network_fee: BigDecimal,
}

/// NEP5 token transfer derived from a transaction's notifications.
///
/// Transfers seed the address-balance table; the repair pass later verifies
/// the seeded balances against the node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenTransfer {
    /// Unique identifier: transaction_id-notification_index.
    pub id: String,
    /// Transaction that emitted the transfer.
    pub transaction_id: String,
    /// Block index containing the transfer.
    pub block_index: u64,
    /// Token contract that emitted the transfer.
    pub contract: ContractHash,
    /// Sender address (None for mints).
    pub from: Option<String>,
    /// Recipient address (None for burns).
    pub to: Option<String>,
    /// Amount transferred, in token units.
    pub amount: BigDecimal,
}

// =============================================================================
// Contracts & Balances
// =============================================================================

/// Cataloged smart contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    /// Contract script hash.
    pub hash: ContractHash,
    /// Contract type label (see [`NEP5_CONTRACT_TYPE`]).
    pub contract_type: String,
    /// Contract name.
    pub name: String,
    /// Token symbol.
    pub symbol: String,
    /// Decimal precision.
    pub decimals: u32,
    /// Block index where the contract was first seen.
    pub first_seen_block: u64,
}

/// Tracked token balance for a (contract, address) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressBalance {
    /// Token contract.
    pub contract: ContractHash,
    /// Holder address.
    pub address: String,
    /// Last known balance, in token units.
    pub balance: BigDecimal,
    /// Block index at which the balance was last verified against the node.
    pub verified_at_block: u64,
}

// =============================================================================
// Scraper State
// =============================================================================

/// Singleton cursor tracking scrape progress.
///
/// The pointer stores the hash of the block at the current height so
/// previous-hash linkage can be checked across restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapePointer {
    /// Last fully applied block index.
    pub current_index: u64,
    /// Hash of the block at `current_index` (for reorg detection).
    pub current_hash: BlockHash,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// In-memory (index, hash) pair carried by the ingestion loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSnapshot {
    pub index: u64,
    pub hash: BlockHash,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_hash_hex_roundtrip() {
        let hex = "0x1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef";
        let hash = BlockHash::from_hex(hex).unwrap();
        assert_eq!(hash.to_hex(), hex);
    }

    #[test]
    fn block_hash_without_prefix() {
        let hex = "1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef";
        let hash = BlockHash::from_hex(hex).unwrap();
        assert_eq!(hash.to_hex(), format!("0x{}", hex));
    }

    #[test]
    fn contract_hash_hex_roundtrip() {
        let hex = "0xecc6b20d3ccac1ee9ef109af5a7cdb85706b1df9";
        let hash = ContractHash::from_hex(hex).unwrap();
        assert_eq!(hash.to_hex(), hex);
    }

    #[test]
    fn hash_from_bytes() {
        let bytes = [0xab; 20];
        let hash = ContractHash::from(bytes);
        assert_eq!(hash.as_bytes(), &bytes);
    }

    #[test]
    fn hash_invalid_length() {
        // Un hash de 20 octets ne peut pas être parsé comme un hash de bloc
        let hex = "0xecc6b20d3ccac1ee9ef109af5a7cdb85706b1df9";
        assert!(BlockHash::from_hex(hex).is_err());
    }
}
