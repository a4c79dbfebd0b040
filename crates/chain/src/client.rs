//! NEO JSON-RPC client implementing the NodeRpc port.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::num_bigint::BigInt;
use bigdecimal::BigDecimal;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, instrument, trace, warn};
use url::Url;

use argus_core::error::{ChainError, ChainResult};
use argus_core::models::ContractHash;
use argus_core::ports::{NodeRpc, RawBlock, RawTransfer};
use argus_core::registry::DEFAULT_DECIMALS;

use crate::dto::{
    ApplicationLogDto, BlockDto, InvokeResultDto, RpcEnvelope, TransferNotification,
};

/// Transaction type that can emit NEP5 notifications.
const INVOCATION_TX_TYPE: &str = "InvocationTransaction";

/// Configuration for the NEO RPC client.
#[derive(Debug, Clone)]
pub struct NeoRpcConfig {
    /// HTTP JSON-RPC endpoint (e.g., "http://localhost:10332").
    pub rpc_url: String,
    /// Per-request timeout, enforced at this boundary and surfaced as an
    /// ordinary fetch failure.
    pub timeout: Duration,
}

impl Default for NeoRpcConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:10332".to_string(),
            timeout: Duration::from_secs(15),
        }
    }
}

/// NEO JSON-RPC adapter implementing the NodeRpc port.
///
/// Transfer amounts are scaled to token units before leaving this layer;
/// the per-contract decimal precision is resolved once and cached for the
/// client's lifetime.
pub struct NeoRpcClient {
    http: reqwest::Client,
    url: Url,
    decimals_cache: Mutex<HashMap<ContractHash, u32>>,
}

impl NeoRpcClient {
    /// Build a client for the given endpoint.
    pub fn new(config: &NeoRpcConfig) -> ChainResult<Self> {
        let url = Url::parse(&config.rpc_url)
            .map_err(|e| ChainError::ConnectionFailed(format!("{}: {}", config.rpc_url, e)))?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ChainError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            http,
            url,
            decimals_cache: Mutex::new(HashMap::new()),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> ChainResult<T> {
        trace!(method, "RPC call");

        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| ChainError::RpcError(format!("{}: {}", method, e)))?;

        let envelope: RpcEnvelope<T> = response
            .json()
            .await
            .map_err(|e| ChainError::MalformedResponse(format!("{}: {}", method, e)))?;

        if let Some(error) = envelope.error {
            return Err(ChainError::RpcError(format!(
                "{} failed ({}): {}",
                method, error.code, error.message
            )));
        }

        envelope
            .result
            .ok_or_else(|| ChainError::MalformedResponse(format!("{}: missing result", method)))
    }

    async fn invoke(
        &self,
        contract: &ContractHash,
        method: &str,
        params: serde_json::Value,
    ) -> ChainResult<InvokeResultDto> {
        let result: InvokeResultDto = self
            .call("invokefunction", json!([contract.to_hex(), method, params]))
            .await?;

        if !result.halted() {
            return Err(ChainError::InvocationFault {
                contract: contract.to_hex(),
                method: method.to_string(),
            });
        }

        Ok(result)
    }

    /// Resolve a contract's decimals, caching successes. Failures fall
    /// back to [`DEFAULT_DECIMALS`] without caching, so a later call
    /// retries the node.
    async fn decimals_or_default(&self, contract: &ContractHash) -> u32 {
        if let Some(decimals) = self.decimals_cache.lock().await.get(contract) {
            return *decimals;
        }

        match self.token_decimals(contract).await {
            Ok(decimals) => {
                self.decimals_cache
                    .lock()
                    .await
                    .insert(contract.clone(), decimals);
                decimals
            }
            Err(e) => {
                warn!(
                    contract = %contract,
                    error = %e,
                    "⚠️  Decimal resolution failed, assuming {}",
                    DEFAULT_DECIMALS
                );
                DEFAULT_DECIMALS
            }
        }
    }

    /// Collect the NEP5 transfers emitted by one transaction, amounts
    /// scaled to token units.
    async fn transfers_for(&self, txid: &str) -> ChainResult<Vec<RawTransfer>> {
        let log: ApplicationLogDto = self.call("getapplicationlog", json!([txid])).await?;

        let mut transfers = Vec::new();
        for execution in &log.executions {
            if !execution.vmstate.contains("HALT") {
                continue;
            }
            for notification in &execution.notifications {
                match notification.as_transfer() {
                    Ok(Some(transfer)) => {
                        transfers.push(self.scale_transfer(transfer).await);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        debug!(txid, error = %e, "Skipping malformed notification");
                    }
                }
            }
        }

        Ok(transfers)
    }

    async fn scale_transfer(&self, transfer: TransferNotification) -> RawTransfer {
        let decimals = self.decimals_or_default(&transfer.contract).await;
        RawTransfer {
            contract: transfer.contract.0,
            from: transfer.from,
            to: transfer.to,
            amount: scale_amount(transfer.amount, decimals),
        }
    }
}

#[async_trait]
impl NodeRpc for NeoRpcClient {
    async fn block_count(&self) -> ChainResult<u64> {
        self.call("getblockcount", json!([])).await
    }

    #[instrument(skip(self))]
    async fn get_block(&self, index: u64) -> ChainResult<RawBlock> {
        let block: BlockDto = self.call("getblock", json!([index, 1])).await?;

        let mut transfers = HashMap::new();
        for tx in &block.tx {
            if tx.tx_type != INVOCATION_TX_TYPE {
                continue;
            }
            let tx_transfers = self.transfers_for(&tx.txid).await?;
            if !tx_transfers.is_empty() {
                transfers.insert(tx.txid.clone(), tx_transfers);
            }
        }

        block.into_raw(transfers)
    }

    async fn token_decimals(&self, contract: &ContractHash) -> ChainResult<u32> {
        let result = self.invoke(contract, "decimals", json!([])).await?;
        let decimals = result.stack_int()?;

        decimals.to_string().parse().map_err(|_| {
            ChainError::MalformedResponse(format!("decimals out of range: {}", decimals))
        })
    }

    async fn token_balance(
        &self,
        contract: &ContractHash,
        address: &str,
        decimals: u32,
    ) -> ChainResult<BigDecimal> {
        let params = json!([{ "type": "Hash160", "value": address.trim_start_matches("0x") }]);
        let result = self.invoke(contract, "balanceOf", params).await?;

        Ok(BigDecimal::new(result.stack_int()?, decimals as i64).normalized())
    }
}

/// Scale a raw contract-unit amount to token units.
fn scale_amount(amount: BigInt, decimals: u32) -> String {
    BigDecimal::new(amount, decimals as i64).normalized().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scales_amounts_by_decimals() {
        assert_eq!(scale_amount(BigInt::from(100_000_000u64), 8), "1");
        assert_eq!(scale_amount(BigInt::from(250_000_000u64), 8), "2.5");
        assert_eq!(scale_amount(BigInt::from(42), 0), "42");
    }

    #[test]
    fn rejects_invalid_endpoint() {
        let config = NeoRpcConfig {
            rpc_url: "not a url".into(),
            ..Default::default()
        };
        assert!(NeoRpcClient::new(&config).is_err());
    }
}
