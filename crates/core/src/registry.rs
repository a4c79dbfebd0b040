//! NEP5 token registry built from the contract catalogue.
//!
//! The registry is an owned, replaceable value inside the processing
//! context: it is rebuilt from scratch on every configuration change and
//! never patched incrementally. Rebuild cost is O(number of tracked
//! contracts), paid once per configuration epoch rather than per block.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bigdecimal::BigDecimal;
use tracing::{debug, instrument, warn};

use crate::error::{ChainResult, ScrapeResult};
use crate::metrics::record_rpc_error;
use crate::models::{ContractHash, NEP5_CONTRACT_TYPE};
use crate::ports::{NodeRpc, Repositories};

/// Decimal precision assumed when RPC resolution fails.
pub const DEFAULT_DECIMALS: u32 = 8;

/// Read-only balance-query proxy for one NEP5 contract, bound to its
/// resolved decimal precision.
pub struct Nep5Token {
    contract: ContractHash,
    decimals: u32,
    node: Arc<dyn NodeRpc>,
}

impl Nep5Token {
    pub fn contract(&self) -> &ContractHash {
        &self.contract
    }

    pub fn decimals(&self) -> u32 {
        self.decimals
    }

    /// Query the current balance of `address`, in token units.
    pub async fn balance_of(&self, address: &str) -> ChainResult<BigDecimal> {
        self.node
            .token_balance(&self.contract, address, self.decimals)
            .await
    }
}

/// Mapping from contract hash to its balance-query proxy.
#[derive(Default)]
pub struct TokenRegistry {
    tokens: HashMap<ContractHash, Nep5Token>,
}

impl TokenRegistry {
    /// An empty registry (no tracked contracts).
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, contract: &ContractHash) -> Option<&Nep5Token> {
        self.tokens.get(contract)
    }

    pub fn contains(&self, contract: &ContractHash) -> bool {
        self.tokens.contains_key(contract)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Build a fresh token registry from the current contract catalogue.
///
/// The catalogue is filtered to NEP5 contracts minus the blacklist. For
/// each remaining contract the decimal precision is resolved via RPC;
/// resolution failure falls back to [`DEFAULT_DECIMALS`] rather than
/// failing the build.
#[instrument(skip_all, fields(blacklisted = blacklist.len()))]
pub async fn build_token_registry<R, N>(
    repos: &R,
    node: &Arc<N>,
    blacklist: &HashSet<ContractHash>,
) -> ScrapeResult<TokenRegistry>
where
    R: Repositories + ?Sized,
    N: NodeRpc + 'static,
{
    let contracts = repos.contracts().list_by_type(NEP5_CONTRACT_TYPE).await?;

    let mut tokens = HashMap::new();
    for contract in contracts {
        if blacklist.contains(&contract.hash) {
            debug!(contract = %contract.hash, "Contract blacklisted, skipping");
            continue;
        }

        let decimals = match node.token_decimals(&contract.hash).await {
            Ok(decimals) => decimals,
            Err(e) => {
                warn!(
                    contract = %contract.hash,
                    error = %e,
                    "⚠️  Decimal resolution failed, assuming {}",
                    DEFAULT_DECIMALS
                );
                record_rpc_error("decimals");
                DEFAULT_DECIMALS
            }
        };

        let node: Arc<dyn NodeRpc> = node.clone();
        tokens.insert(
            contract.hash.clone(),
            Nep5Token {
                contract: contract.hash,
                decimals,
                node,
            },
        );
    }

    Ok(TokenRegistry { tokens })
}
