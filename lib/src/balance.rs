//! Balance gate: both chains must be funded before a mint is allowed.
//!
//! Balances are published through a `watch` channel so a UI (or the CLI) can
//! observe them while a background poller keeps them fresh.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, U256};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::chain::{ChainError, ChainKind, ComputeChain, SettlementChain};
use crate::config::SettlementChainConfig;

/// 0.1 native unit.
pub const DEFAULT_COMPUTE_THRESHOLD: u128 = 100_000_000_000_000_000;
/// 0.25 native unit.
pub const DEFAULT_SETTLEMENT_THRESHOLD: u128 = 250_000_000_000_000_000;

/// Wallet error code for a chain the wallet does not know.
pub const UNRECOGNIZED_CHAIN_CODE: i64 = 4902;

/// Minimum balances, in wei. A balance must be strictly greater.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Thresholds {
    pub compute: U256,
    pub settlement: U256,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            compute: U256::from(DEFAULT_COMPUTE_THRESHOLD),
            settlement: U256::from(DEFAULT_SETTLEMENT_THRESHOLD),
        }
    }
}

impl Thresholds {
    pub fn for_chain(&self, kind: ChainKind) -> U256 {
        match kind {
            ChainKind::Compute => self.compute,
            ChainKind::Settlement => self.settlement,
        }
    }
}

/// Last known balances. `None` until the first successful fetch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Balances {
    pub compute: Option<U256>,
    pub settlement: Option<U256>,
}

impl Balances {
    pub fn get(&self, kind: ChainKind) -> Option<U256> {
        match kind {
            ChainKind::Compute => self.compute,
            ChainKind::Settlement => self.settlement,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateVerdict {
    Ready,
    /// At least one balance has not been fetched yet.
    Unknown,
    Insufficient(ChainKind),
}

impl GateVerdict {
    pub fn is_ready(&self) -> bool {
        matches!(self, GateVerdict::Ready)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkStatus {
    Matched,
    Mismatch { expected: u64, connected: u64 },
}

pub fn network_status(expected: u64, connected: u64) -> NetworkStatus {
    if expected == connected {
        NetworkStatus::Matched
    } else {
        NetworkStatus::Mismatch { expected, connected }
    }
}

#[derive(Debug)]
pub struct BalanceGate {
    thresholds: Thresholds,
    balances: watch::Sender<Balances>,
}

impl BalanceGate {
    pub fn new(thresholds: Thresholds) -> Self {
        let (balances, _) = watch::channel(Balances::default());
        Self { thresholds, balances }
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn balances(&self) -> Balances {
        *self.balances.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Balances> {
        self.balances.subscribe()
    }

    pub fn record(&self, kind: ChainKind, balance: U256) {
        debug!(%kind, %balance, "balance updated");
        self.balances.send_modify(|b| match kind {
            ChainKind::Compute => b.compute = Some(balance),
            ChainKind::Settlement => b.settlement = Some(balance),
        });
    }

    fn is_sufficient(&self, kind: ChainKind, balance: Option<U256>) -> bool {
        balance.is_some_and(|b| b > self.thresholds.for_chain(kind))
    }

    /// Compute chain is checked first.
    pub fn verdict(&self) -> GateVerdict {
        let balances = self.balances();
        let mut unknown = false;
        for kind in [ChainKind::Compute, ChainKind::Settlement] {
            match balances.get(kind) {
                None => unknown = true,
                Some(b) if b <= self.thresholds.for_chain(kind) => {
                    return GateVerdict::Insufficient(kind)
                }
                Some(_) => {}
            }
        }
        if unknown {
            GateVerdict::Unknown
        } else {
            GateVerdict::Ready
        }
    }

    /// Fetch balances not already known to be sufficient. Both chains are
    /// attempted; the first error is returned.
    pub async fn refresh<C, S>(
        &self,
        compute: &C,
        settlement: &S,
        account: Address,
    ) -> Result<Balances, ChainError>
    where
        C: ComputeChain,
        S: SettlementChain,
    {
        let current = self.balances();
        let mut first_err = None;

        if !self.is_sufficient(ChainKind::Compute, current.compute) {
            match compute.balance(account).await {
                Ok(b) => self.record(ChainKind::Compute, b),
                Err(e) => first_err = Some(e),
            }
        }
        if !self.is_sufficient(ChainKind::Settlement, current.settlement) {
            match settlement.balance(account).await {
                Ok(b) => self.record(ChainKind::Settlement, b),
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(self.balances()),
        }
    }

    /// Refresh now and then every `interval` until the poller is stopped or
    /// dropped.
    pub fn start_polling<C, S>(
        self: &Arc<Self>,
        compute: Arc<C>,
        settlement: Arc<S>,
        account: Address,
        interval: Duration,
    ) -> BalancePoller
    where
        C: ComputeChain + 'static,
        S: SettlementChain + 'static,
    {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let gate = Arc::clone(self);
        let period = interval.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        if let Err(e) = gate.refresh(compute.as_ref(), settlement.as_ref(), account).await {
                            warn!("balance refresh failed: {e}");
                        }
                    }
                }
            }
            debug!("balance poller stopped");
        });

        BalancePoller { stop: Some(stop_tx), handle }
    }
}

/// Handle to a running balance poll task.
pub struct BalancePoller {
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl BalancePoller {
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let _ = (&mut self.handle).await;
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

// ---- Network switching ----

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("wallet error {code}: {message}")]
pub struct WalletError {
    pub code: i64,
    pub message: String,
}

/// EIP-1193 style request channel to the user's wallet.
pub trait WalletRpc: Send + Sync {
    fn request(
        &self,
        method: &str,
        params: Value,
    ) -> impl Future<Output = Result<Value, WalletError>> + Send;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// `wallet_addEthereumChain` parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddChainParams {
    pub chain_id: String,
    pub chain_name: String,
    pub rpc_urls: Vec<String>,
    pub block_explorer_urls: Vec<String>,
    pub native_currency: NativeCurrency,
}

impl AddChainParams {
    pub fn from_config(settlement: &SettlementChainConfig) -> Self {
        Self {
            chain_id: format!("{:#x}", settlement.chain_id),
            chain_name: settlement.chain_name.clone(),
            rpc_urls: vec![settlement.rpc_url.clone()],
            block_explorer_urls: vec![settlement.explorer_url.clone()],
            native_currency: NativeCurrency {
                name: settlement.chain_name.clone(),
                symbol: "ETH".to_string(),
                decimals: 18,
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkSwitch {
    Switched,
    Added,
}

/// Ask the wallet to switch to the settlement chain, adding it when the
/// wallet reports it as unknown.
pub async fn switch_network<W: WalletRpc>(
    wallet: &W,
    settlement: &SettlementChainConfig,
) -> Result<NetworkSwitch, WalletError> {
    let chain_id = format!("{:#x}", settlement.chain_id);
    match wallet
        .request("wallet_switchEthereumChain", json!([{ "chainId": chain_id }]))
        .await
    {
        Ok(_) => {
            info!(chain_id = settlement.chain_id, "switched network");
            Ok(NetworkSwitch::Switched)
        }
        Err(e) if e.code == UNRECOGNIZED_CHAIN_CODE => {
            info!(chain_id = settlement.chain_id, "wallet does not know chain, adding it");
            let params = AddChainParams::from_config(settlement);
            let params = serde_json::to_value([params]).map_err(|e| WalletError {
                code: -32602,
                message: e.to_string(),
            })?;
            wallet.request("wallet_addEthereumChain", params).await?;
            Ok(NetworkSwitch::Added)
        }
        Err(e) => Err(e),
    }
}
