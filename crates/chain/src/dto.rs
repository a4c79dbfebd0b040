//! Wire DTOs for the NEO JSON-RPC protocol.
//!
//! These structs mirror the node's verbose JSON shapes. Conversion into
//! the domain-facing raw types happens in the client, which also stitches
//! NEP5 transfer notifications (from `getapplicationlog`) onto their
//! transactions.

use serde::Deserialize;

use argus_core::error::{ChainError, ChainResult};
use argus_core::models::{BlockHash, ContractHash};
use argus_core::ports::{RawBlock, RawTransaction, RawTransfer};

use bigdecimal::num_bigint::{BigInt, Sign};

/// The `transfer` event name, as the hex-encoded bytes NEP5 contracts emit.
const TRANSFER_EVENT: &[u8] = b"transfer";

// =============================================================================
// JSON-RPC envelope
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct RpcEnvelope<T> {
    pub result: Option<T>,
    pub error: Option<RpcErrorDto>,
}

#[derive(Debug, Deserialize)]
pub struct RpcErrorDto {
    pub code: i64,
    pub message: String,
}

// =============================================================================
// getblock
// =============================================================================

/// Verbose block returned by `getblock(index, 1)`.
#[derive(Debug, Deserialize)]
pub struct BlockDto {
    pub index: u64,
    pub hash: String,
    pub previousblockhash: String,
    pub merkleroot: String,
    pub time: u64,
    pub size: u32,
    #[serde(default)]
    pub tx: Vec<TransactionDto>,
}

#[derive(Debug, Deserialize)]
pub struct TransactionDto {
    pub txid: String,
    #[serde(rename = "type")]
    pub tx_type: String,
    #[serde(default = "zero_fee")]
    pub sys_fee: String,
    #[serde(default = "zero_fee")]
    pub net_fee: String,
}

fn zero_fee() -> String {
    "0".to_string()
}

impl BlockDto {
    /// Convert into the domain-facing raw block, attaching the transfer
    /// notifications collected per transaction.
    pub fn into_raw(
        self,
        mut transfers: std::collections::HashMap<String, Vec<RawTransfer>>,
    ) -> ChainResult<RawBlock> {
        let transactions = self
            .tx
            .into_iter()
            .enumerate()
            .map(|(index, tx)| RawTransaction {
                transfers: transfers.remove(&tx.txid).unwrap_or_default(),
                id: tx.txid,
                index: index as u32,
                tx_type: tx.tx_type,
                system_fee: tx.sys_fee,
                network_fee: tx.net_fee,
            })
            .collect();

        Ok(RawBlock {
            index: self.index,
            hash: parse_hash32(&self.hash, "block.hash")?,
            previous_hash: parse_hash32(&self.previousblockhash, "block.previousblockhash")?,
            merkle_root: parse_hash32(&self.merkleroot, "block.merkleroot")?,
            timestamp: self.time,
            size: self.size,
            transactions,
        })
    }
}

// =============================================================================
// getapplicationlog
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ApplicationLogDto {
    #[serde(default)]
    pub executions: Vec<ExecutionDto>,
}

#[derive(Debug, Deserialize)]
pub struct ExecutionDto {
    pub vmstate: String,
    #[serde(default)]
    pub notifications: Vec<NotificationDto>,
}

#[derive(Debug, Deserialize)]
pub struct NotificationDto {
    pub contract: String,
    pub state: StackItemDto,
}

/// A parsed NEP5 transfer notification, amount still in raw (unscaled)
/// contract units.
#[derive(Debug)]
pub struct TransferNotification {
    pub contract: ContractHash,
    pub from: Option<String>,
    pub to: Option<String>,
    pub amount: BigInt,
}

impl NotificationDto {
    /// Interpret this notification as a NEP5 `transfer` event.
    ///
    /// Returns `Ok(None)` for notifications that are well-formed but not
    /// transfers; malformed transfer payloads are errors.
    pub fn as_transfer(&self) -> ChainResult<Option<TransferNotification>> {
        let items = match (self.state.item_type.as_str(), self.state.value.as_array()) {
            ("Array", Some(items)) => items,
            _ => return Ok(None),
        };
        if items.len() < 4 {
            return Ok(None);
        }

        let event: Vec<StackItemDto> = items
            .iter()
            .map(|item| {
                serde_json::from_value(item.clone())
                    .map_err(|e| ChainError::MalformedResponse(format!("notification item: {}", e)))
            })
            .collect::<ChainResult<_>>()?;

        if event[0].as_bytes()? != TRANSFER_EVENT {
            return Ok(None);
        }

        Ok(Some(TransferNotification {
            contract: ContractHash::from_hex(&self.contract).map_err(|e| {
                ChainError::MalformedResponse(format!("notification.contract: {}", e))
            })?,
            from: event[1].as_optional_address()?,
            to: event[2].as_optional_address()?,
            amount: event[3].as_int()?,
        }))
    }
}

// =============================================================================
// invokefunction
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct InvokeResultDto {
    pub state: String,
    #[serde(default)]
    pub stack: Vec<StackItemDto>,
}

impl InvokeResultDto {
    pub fn halted(&self) -> bool {
        self.state.contains("HALT")
    }

    /// The invocation's single integer result.
    pub fn stack_int(&self) -> ChainResult<BigInt> {
        self.stack
            .first()
            .ok_or_else(|| ChainError::MalformedResponse("empty invocation stack".into()))?
            .as_int()
    }
}

/// One item of a VM stack or notification state.
#[derive(Debug, Clone, Deserialize)]
pub struct StackItemDto {
    #[serde(rename = "type")]
    pub item_type: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl StackItemDto {
    fn value_str(&self) -> ChainResult<&str> {
        self.value.as_str().ok_or_else(|| {
            ChainError::MalformedResponse(format!("{} value is not a string", self.item_type))
        })
    }

    /// Decode a ByteArray item to its bytes.
    pub fn as_bytes(&self) -> ChainResult<Vec<u8>> {
        match self.item_type.as_str() {
            "ByteArray" => hex::decode(self.value_str()?)
                .map_err(|e| ChainError::MalformedResponse(format!("ByteArray value: {}", e))),
            other => Err(ChainError::MalformedResponse(format!(
                "expected ByteArray, got {}",
                other
            ))),
        }
    }

    /// Interpret as an integer: either an `Integer` item (decimal string)
    /// or a `ByteArray` item (little-endian unsigned bytes).
    pub fn as_int(&self) -> ChainResult<BigInt> {
        match self.item_type.as_str() {
            "Integer" => {
                let raw = self.value_str()?;
                BigInt::parse_bytes(raw.as_bytes(), 10).ok_or_else(|| {
                    ChainError::MalformedResponse(format!("Integer value: {}", raw))
                })
            }
            "ByteArray" => {
                let bytes = self.as_bytes()?;
                Ok(BigInt::from_bytes_le(Sign::Plus, &bytes))
            }
            other => Err(ChainError::MalformedResponse(format!(
                "expected Integer or ByteArray, got {}",
                other
            ))),
        }
    }

    /// Interpret as an optional address: an empty ByteArray means no
    /// address (mint/burn side of a transfer).
    pub fn as_optional_address(&self) -> ChainResult<Option<String>> {
        let bytes = self.as_bytes()?;
        if bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(format!("0x{}", hex::encode(bytes))))
    }
}

// =============================================================================
// Helpers
// =============================================================================

pub fn parse_hash32(value: &str, field: &str) -> ChainResult<[u8; 32]> {
    BlockHash::from_hex(value)
        .map(|hash| hash.0)
        .map_err(|e| ChainError::MalformedResponse(format!("{}: {}", field, e)))
}
