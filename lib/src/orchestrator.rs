//! Cross-chain mint orchestration.
//!
//! One mint attempt is an explicit state machine:
//!
//! ```text
//! Idle -> AwaitingConfidentialReceipt -> ConfidentialConfirmed
//!      -> AwaitingSettlementReceipt -> Done
//! ```
//!
//! with `Failed` reachable once a transaction has been attempted. Failed
//! preconditions leave the machine in `Idle`. The settlement leg only runs
//! after the compute receipt succeeded and both compute logs decoded.

use std::sync::Arc;

use alloy_primitives::{Address, B256, U256};
use tracing::{debug, info, warn};

use crate::balance::{network_status, BalanceGate, NetworkStatus};
use crate::cache::{CacheError, CachedNft, KeyValueStore, NftCache};
use crate::chain::{ChainError, ChainKind, ComputeChain, SettlementChain};
use crate::config::DeploymentConfig;
use crate::logs::{decode_settlement_logs, LogError, LogParser, MintResult, SettlementEvent};
use crate::notifications::{abbreviate, explorer_token_url, explorer_tx_url, NotificationCenter};
use crate::request::{ConfidentialRequestBuilder, Credentials, MintRequest, RequestError};
use crate::settlement::{
    decode_address_return, decode_string_return, owner_of_call, render_content, token_data_call,
    token_uri_call, SettlementTransaction,
};
use crate::signature::SignatureError;

/// Phrases the model uses when it declines a prompt.
const REFUSAL_MARKERS: &[&str] = &[
    "sorry",
    "i apologize",
    "i can't",
    "i cannot",
    "unable to",
    "as an ai",
];

/// The connected wallet, created once per connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Session {
    pub account: Address,
    /// Chain id the wallet is currently connected to.
    pub connected_chain_id: u64,
}

/// A completed mint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Minted {
    pub result: MintResult,
    pub settlement_tx: B256,
    pub events: Vec<SettlementEvent>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MintState {
    Idle,
    AwaitingConfidentialReceipt {
        tx_hash: B256,
    },
    ConfidentialConfirmed {
        result: MintResult,
    },
    AwaitingSettlementReceipt {
        result: MintResult,
        settlement: SettlementTransaction,
        tx_hash: B256,
    },
    Done(Minted),
    Failed {
        stage: ChainKind,
        reason: String,
    },
}

impl MintState {
    pub fn name(&self) -> &'static str {
        match self {
            MintState::Idle => "Idle",
            MintState::AwaitingConfidentialReceipt { .. } => "AwaitingConfidentialReceipt",
            MintState::ConfidentialConfirmed { .. } => "ConfidentialConfirmed",
            MintState::AwaitingSettlementReceipt { .. } => "AwaitingSettlementReceipt",
            MintState::Done(_) => "Done",
            MintState::Failed { .. } => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MintState::Done(_) | MintState::Failed { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MintError {
    #[error("no wallet session; connect a wallet first")]
    SessionAbsent,

    #[error("wallet is on chain {connected}, expected chain {expected}")]
    NetworkMismatch { expected: u64, connected: u64 },

    #[error("insufficient funds on {chain}: {balance} wei, need more than {threshold} wei")]
    InsufficientFunds {
        chain: ChainKind,
        balance: U256,
        threshold: U256,
        faucet: Option<String>,
    },

    #[error("balance on {0} is unavailable")]
    BalanceUnavailable(ChainKind),

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("compute chain rejected the request: {0}")]
    UpstreamRejected(String),

    #[error(transparent)]
    Logs(#[from] LogError),

    #[error("settlement chain rejected the mint: {0}")]
    SettlementRejected(String),

    #[error("{chain}: {source}")]
    Chain {
        chain: ChainKind,
        source: ChainError,
    },

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("failed to decode {what}: {reason}")]
    Decode { what: &'static str, reason: String },
}

/// On-chain content of a minted NFT, ready for display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedNft {
    pub token_id: U256,
    pub content: String,
    pub lines: Vec<String>,
    /// `None` when `tokenURI` could not be read.
    pub metadata_uri: Option<String>,
}

/// True when the model output reads like a refusal rather than content.
pub fn looks_like_refusal(text: &str) -> bool {
    let lower = text.to_lowercase();
    REFUSAL_MARKERS.iter().any(|m| lower.contains(m))
}

pub struct Orchestrator<C, S, St> {
    compute: Arc<C>,
    settlement: Arc<S>,
    config: DeploymentConfig,
    builder: ConfidentialRequestBuilder,
    parser: LogParser,
    cache: NftCache<St>,
    notifications: NotificationCenter,
    gate: Arc<BalanceGate>,
    credentials: Option<Credentials>,
    state: MintState,
    history: Vec<MintState>,
}

impl<C, S, St> Orchestrator<C, S, St>
where
    C: ComputeChain,
    S: SettlementChain,
    St: KeyValueStore,
{
    pub fn new(
        compute: Arc<C>,
        settlement: Arc<S>,
        config: DeploymentConfig,
        cache: NftCache<St>,
    ) -> Self {
        let builder = ConfidentialRequestBuilder::new(&config.compute, config.protocol.payload);
        let parser = LogParser::new(config.protocol.result);
        let gate = Arc::new(BalanceGate::new(config.thresholds));
        Self {
            compute,
            settlement,
            config,
            builder,
            parser,
            cache,
            notifications: NotificationCenter::new(),
            gate,
            credentials: None,
            state: MintState::Idle,
            history: vec![MintState::Idle],
        }
    }

    /// Share a gate that a background poller keeps up to date.
    pub fn with_gate(mut self, gate: Arc<BalanceGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn gate(&self) -> &Arc<BalanceGate> {
        &self.gate
    }

    pub fn config(&self) -> &DeploymentConfig {
        &self.config
    }

    pub fn state(&self) -> &MintState {
        &self.state
    }

    /// Every state entered by the current (or last) attempt, oldest first.
    pub fn history(&self) -> &[MintState] {
        &self.history
    }

    pub fn notifications(&self) -> &NotificationCenter {
        &self.notifications
    }

    pub fn notifications_mut(&mut self) -> &mut NotificationCenter {
        &mut self.notifications
    }

    pub fn cache(&self) -> &NftCache<St> {
        &self.cache
    }

    pub fn clear_cache(&mut self) -> Result<(), MintError> {
        self.cache.clear()?;
        Ok(())
    }

    fn transition(&mut self, next: MintState) {
        info!(from = self.state.name(), to = next.name(), "mint state");
        self.history.push(next.clone());
        self.state = next;
    }

    fn reset(&mut self) {
        self.state = MintState::Idle;
        self.history = vec![MintState::Idle];
    }

    fn fail(&mut self, stage: ChainKind, err: MintError) -> MintError {
        warn!(%stage, "mint failed: {err}");
        self.transition(MintState::Failed { stage, reason: err.to_string() });
        err
    }

    fn check_session<'a>(&self, session: Option<&'a Session>) -> Result<&'a Session, MintError> {
        let session = session.ok_or(MintError::SessionAbsent)?;
        match network_status(self.config.settlement.chain_id, session.connected_chain_id) {
            NetworkStatus::Matched => Ok(session),
            NetworkStatus::Mismatch { expected, connected } => {
                Err(MintError::NetworkMismatch { expected, connected })
            }
        }
    }

    /// Refresh balances that are not known to be sufficient, then require
    /// each listed chain to be strictly above its threshold.
    async fn check_funds(&self, account: Address, chains: &[ChainKind]) -> Result<(), MintError> {
        if let Err(e) = self
            .gate
            .refresh(self.compute.as_ref(), self.settlement.as_ref(), account)
            .await
        {
            warn!("balance refresh failed: {e}");
        }

        let balances = self.gate.balances();
        let thresholds = self.gate.thresholds();
        for &chain in chains {
            let balance = balances.get(chain).ok_or(MintError::BalanceUnavailable(chain))?;
            let threshold = thresholds.for_chain(chain);
            if balance <= threshold {
                let faucet = match chain {
                    ChainKind::Compute => self.config.compute.faucet_url.clone(),
                    ChainKind::Settlement => self.config.settlement.faucet_url.clone(),
                };
                return Err(MintError::InsufficientFunds { chain, balance, threshold, faucet });
            }
        }
        Ok(())
    }

    /// Run a full mint: confidential compute, then settlement.
    pub async fn mint<I, P>(&mut self, session: Option<&Session>, prompts: I) -> Result<Minted, MintError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        self.reset();
        let session = *self.check_session(session)?;
        self.check_funds(session.account, &[ChainKind::Compute, ChainKind::Settlement])
            .await?;

        let request = MintRequest::new(session.account, prompts, self.credentials.clone())?;
        let tx = self.builder.build(&request)?;
        debug!(prompts = request.prompts().len(), schema = %self.builder.schema(), "built confidential request");

        // ---- Compute leg ----

        let tx_hash = match self.compute.submit_confidential(session.account, &tx).await {
            Ok(hash) => hash,
            Err(source) => {
                return Err(self.fail(ChainKind::Compute, MintError::Chain { chain: ChainKind::Compute, source }))
            }
        };
        self.transition(MintState::AwaitingConfidentialReceipt { tx_hash });
        let pending_id = self.notify_pending(ChainKind::Compute, "Creating NFT on SUAVE", tx_hash);

        let receipt = match self.compute.wait_for_receipt(tx_hash).await {
            Ok(receipt) => receipt,
            Err(source) => {
                return Err(self.fail(ChainKind::Compute, MintError::Chain { chain: ChainKind::Compute, source }))
            }
        };
        if !receipt.success {
            let err = MintError::UpstreamRejected(format!("confidential request {tx_hash} reverted"));
            return Err(self.fail(ChainKind::Compute, err));
        }
        let result = match self.parser.parse(&receipt) {
            Ok(result) => result,
            Err(e) => return Err(self.fail(ChainKind::Compute, e.into())),
        };

        self.notifications.dismiss(&pending_id);
        self.transition(MintState::ConfidentialConfirmed { result: result.clone() });
        if let Err(e) = self.cache.append(CachedNft::from(&result)) {
            warn!(token_id = %result.token_id, "failed to cache compute result: {e}");
        }
        if looks_like_refusal(&result.query_result) {
            self.notifications.push(
                format!("refusal-{:#x}", result.token_id),
                format!("The model may have declined the prompt: {}", result.query_result),
                None,
            );
        }

        // ---- Settlement leg ----

        self.settle(session.account, result).await
    }

    /// Settle a previously cached compute result without re-running the
    /// confidential request.
    pub async fn settle_cached(
        &mut self,
        session: Option<&Session>,
        nft: &CachedNft,
    ) -> Result<Minted, MintError> {
        self.reset();
        let session = *self.check_session(session)?;
        self.check_funds(session.account, &[ChainKind::Settlement]).await?;

        let result = nft.to_result();
        self.transition(MintState::ConfidentialConfirmed { result: result.clone() });
        self.settle(session.account, result).await
    }

    async fn settle(&mut self, from: Address, result: MintResult) -> Result<Minted, MintError> {
        let settlement = match SettlementTransaction::from_result(&result, &self.config.settlement) {
            Ok(tx) => tx,
            Err(e) => return Err(self.fail(ChainKind::Settlement, e.into())),
        };

        let tx_hash = match self.settlement.submit(from, &settlement).await {
            Ok(hash) => hash,
            Err(source) => {
                let err = MintError::Chain { chain: ChainKind::Settlement, source };
                return Err(self.fail(ChainKind::Settlement, err));
            }
        };
        self.transition(MintState::AwaitingSettlementReceipt {
            result: result.clone(),
            settlement,
            tx_hash,
        });
        let pending_id = self.notify_pending(ChainKind::Settlement, "Minting NFT on L1", tx_hash);

        let receipt = match self.settlement.wait_for_receipt(tx_hash).await {
            Ok(receipt) => receipt,
            Err(source) => {
                let err = MintError::Chain { chain: ChainKind::Settlement, source };
                return Err(self.fail(ChainKind::Settlement, err));
            }
        };
        if !receipt.success {
            let err = MintError::SettlementRejected(format!("mint transaction {tx_hash} reverted"));
            return Err(self.fail(ChainKind::Settlement, err));
        }

        self.notifications.dismiss(&pending_id);
        let events = decode_settlement_logs(&receipt);
        debug!(?events, "decoded settlement logs");

        let explorer = &self.config.settlement.explorer_url;
        self.notifications.push(
            format!("minted-{:#x}", result.token_id),
            format!("Minted NFT #{}", result.token_id),
            Some((
                explorer_token_url(explorer, self.config.settlement.nft_contract, result.token_id),
                abbreviate(&tx_hash.to_string()),
            )),
        );

        let minted = Minted { result, settlement_tx: tx_hash, events };
        self.transition(MintState::Done(minted.clone()));
        Ok(minted)
    }

    /// Push a "pending" notification linking to the chain's explorer.
    fn notify_pending(&mut self, chain: ChainKind, message: &str, tx_hash: B256) -> String {
        let explorer = match chain {
            ChainKind::Compute => &self.config.compute.explorer_url,
            ChainKind::Settlement => &self.config.settlement.explorer_url,
        };
        let id = tx_hash.to_string();
        let link = (explorer_tx_url(explorer, tx_hash), abbreviate(&id));
        self.notifications.push(id.clone(), message, Some(link));
        id
    }

    /// Read the minted content back from the NFT contract.
    ///
    /// `tokenData` is required; `tokenURI` is display-only and tolerated
    /// when it fails.
    pub async fn render(&self, token_id: U256) -> Result<RenderedNft, MintError> {
        let contract = self.config.settlement.nft_contract;

        let raw = self
            .settlement
            .call(contract, token_data_call(token_id))
            .await
            .map_err(|source| MintError::Chain { chain: ChainKind::Settlement, source })?;
        let content = decode_string_return(&raw)
            .map_err(|e| MintError::Decode { what: "tokenData", reason: e.to_string() })?;

        let metadata_uri = match self.settlement.call(contract, token_uri_call(token_id)).await {
            Ok(raw) => match decode_string_return(&raw) {
                Ok(uri) => Some(uri),
                Err(e) => {
                    warn!(%token_id, "tokenURI decode error: {e}");
                    None
                }
            },
            Err(e) => {
                warn!(%token_id, "tokenURI call failed: {e}");
                None
            }
        };

        Ok(RenderedNft { token_id, lines: render_content(&content), content, metadata_uri })
    }

    /// Cached compute results whose token has no owner on the settlement
    /// chain yet.
    pub async fn unsettled(&self) -> Result<Vec<CachedNft>, MintError> {
        let contract = self.config.settlement.nft_contract;
        let mut pending = Vec::new();
        for nft in self.cache.entries() {
            match self.settlement.call(contract, owner_of_call(nft.token_id)).await {
                Ok(raw) => match decode_address_return(&raw) {
                    Ok(owner) if owner != Address::ZERO => {
                        debug!(token_id = %nft.token_id, %owner, "already minted");
                    }
                    _ => pending.push(nft.clone()),
                },
                // ownerOf reverts for tokens that do not exist yet
                Err(ChainError::Reverted(_)) => pending.push(nft.clone()),
                Err(source) => return Err(MintError::Chain { chain: ChainKind::Settlement, source }),
            }
        }
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance::Thresholds;
    use crate::cache::MemoryStore;
    use crate::config::{
        ComputeChainConfig, ProtocolConfig, ResultEncoding, SettlementChainConfig,
        DEFAULT_KETTLE_ADDRESS,
    };
    use crate::testing::*;
    use alloy_primitives::{address, Bytes};
    use alloy_sol_types::SolValue;
    use std::time::Duration;

    const ACCOUNT: Address = address!("0000000000000000000000000000000000000abc");
    const CHATNFT: Address = address!("00000000000000000000000000000000000000c1");
    const NFTEE: Address = address!("00000000000000000000000000000000000000e1");
    const CHAIN_ID: u64 = 17000;

    fn config() -> DeploymentConfig {
        DeploymentConfig {
            compute: ComputeChainConfig {
                rpc_url: "http://localhost:8545".into(),
                contract: CHATNFT,
                kettle: DEFAULT_KETTLE_ADDRESS,
                explorer_url: "https://explorer.suave".into(),
                faucet_url: Some("https://faucet.suave".into()),
                gas: 5_000_000,
                gas_price: 10_000_000_000,
            },
            settlement: SettlementChainConfig {
                rpc_url: "http://localhost:8546".into(),
                chain_id: CHAIN_ID,
                chain_name: "Holesky".into(),
                nft_contract: NFTEE,
                explorer_url: "https://holesky.etherscan.io".into(),
                faucet_url: Some("https://faucet.holesky".into()),
                gas: 900_000,
                gas_price: None,
            },
            protocol: ProtocolConfig::default(),
            thresholds: Thresholds::default(),
            poll_interval: Duration::from_secs(30),
            receipt_timeout: Duration::from_secs(5),
        }
    }

    fn session() -> Session {
        Session { account: ACCOUNT, connected_chain_id: CHAIN_ID }
    }

    fn signature() -> Bytes {
        let mut sig = vec![0xaau8; 32];
        sig.extend([0xbbu8; 32]);
        sig.push(0);
        Bytes::from(sig)
    }

    fn compute_ok(text: &str) -> Scripted {
        Scripted::Mined(receipt(
            B256::repeat_byte(0x01),
            true,
            vec![
                nft_created_log(CHATNFT, U256::from(7), ACCOUNT, signature()),
                query_result_log(CHATNFT, ResultEncoding::Bytes, text),
            ],
        ))
    }

    fn settlement_ok() -> Scripted {
        Scripted::Mined(receipt(
            B256::repeat_byte(0x02),
            true,
            vec![transfer_log(NFTEE, ACCOUNT, U256::from(7))],
        ))
    }

    type TestOrchestrator = Orchestrator<MockComputeChain, MockSettlementChain, Arc<MemoryStore>>;

    async fn funded() -> (TestOrchestrator, Arc<MockComputeChain>, Arc<MockSettlementChain>, Arc<MemoryStore>) {
        let compute = Arc::new(MockComputeChain::new());
        let settlement = Arc::new(MockSettlementChain::new());
        compute.set_balance(U256::from(10u128.pow(18))).await;
        settlement.set_balance(U256::from(10u128.pow(18))).await;
        let store = Arc::new(MemoryStore::new());
        let cache = NftCache::load(store.clone()).unwrap();
        let orchestrator = Orchestrator::new(compute.clone(), settlement.clone(), config(), cache);
        (orchestrator, compute, settlement, store)
    }

    fn state_names(o: &TestOrchestrator) -> Vec<&'static str> {
        o.history().iter().map(MintState::name).collect()
    }

    #[tokio::test]
    async fn test_happy_path_reaches_done() {
        let (mut o, compute, settlement, _) = funded().await;
        compute.script(compute_ok("cat ascii")).await;
        settlement.script(settlement_ok()).await;

        let minted = o.mint(Some(&session()), ["draw a cat"]).await.unwrap();

        assert_eq!(minted.result.token_id, U256::from(7));
        assert_eq!(minted.settlement_tx, B256::repeat_byte(0x02));
        assert_eq!(minted.events.len(), 1);
        assert_eq!(
            state_names(&o),
            vec![
                "Idle",
                "AwaitingConfidentialReceipt",
                "ConfidentialConfirmed",
                "AwaitingSettlementReceipt",
                "Done"
            ]
        );
        assert_eq!(o.cache().len(), 1);

        let submitted = settlement.submitted().await;
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].0, ACCOUNT);
        assert_eq!(submitted[0].1.signature.v, 27);
        assert_eq!(submitted[0].1.content, "cat ascii");
    }

    #[tokio::test]
    async fn test_pending_notifications_retracted_on_success() {
        let (mut o, compute, settlement, _) = funded().await;
        compute.script(compute_ok("cat ascii")).await;
        settlement.script(settlement_ok()).await;

        o.mint(Some(&session()), ["draw a cat"]).await.unwrap();

        let ids: Vec<_> = o.notifications().all().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["minted-0x7"]);
    }

    #[tokio::test]
    async fn test_prompts_are_escaped_in_payload() {
        let (mut o, compute, settlement, _) = funded().await;
        compute.script(compute_ok("ok")).await;
        settlement.script(settlement_ok()).await;

        o.mint(Some(&session()), ["<b>cat</b>"]).await.unwrap();

        let submitted = compute.submitted().await;
        let (recipient, prompts) =
            <(Address, Vec<String>)>::abi_decode(&submitted[0].1.confidential_inputs).unwrap();
        assert_eq!(recipient, ACCOUNT);
        assert_eq!(prompts, vec!["&lt;b&gt;cat&lt;/b&gt;".to_string()]);
    }

    #[tokio::test]
    async fn test_reverted_compute_receipt_fails_without_settlement() {
        let (mut o, compute, settlement, store) = funded().await;
        compute
            .script(Scripted::Mined(receipt(B256::repeat_byte(0x01), false, vec![])))
            .await;

        let err = o.mint(Some(&session()), ["draw a cat"]).await.unwrap_err();

        assert!(matches!(err, MintError::UpstreamRejected(_)));
        assert!(matches!(o.state(), MintState::Failed { stage: ChainKind::Compute, .. }));
        assert_eq!(state_names(&o), vec!["Idle", "AwaitingConfidentialReceipt", "Failed"]);
        assert_eq!(settlement.submit_count(), 0);
        assert!(o.cache().is_empty());
        assert_eq!(store.get(crate::cache::CACHE_KEY).unwrap(), None);
        // pending notification kept so the user retains the reference
        assert!(o.notifications().contains(&B256::repeat_byte(0x01).to_string()));
    }

    #[tokio::test]
    async fn test_missing_query_result_fails_without_settlement() {
        let (mut o, compute, settlement, _) = funded().await;
        compute
            .script(Scripted::Mined(receipt(
                B256::repeat_byte(0x01),
                true,
                vec![nft_created_log(CHATNFT, U256::from(7), ACCOUNT, signature())],
            )))
            .await;

        let err = o.mint(Some(&session()), ["draw a cat"]).await.unwrap_err();

        assert!(matches!(err, MintError::Logs(LogError::MissingLog("QueryResult"))));
        assert_eq!(settlement.submit_count(), 0);
        assert!(o.cache().is_empty());
    }

    #[tokio::test]
    async fn test_lost_compute_receipt_fails() {
        let (mut o, compute, settlement, _) = funded().await;
        compute.script(Scripted::Lost(B256::repeat_byte(0x09))).await;

        let err = o.mint(Some(&session()), ["draw a cat"]).await.unwrap_err();

        assert!(matches!(
            err,
            MintError::Chain { chain: ChainKind::Compute, source: ChainError::ReceiptTimeout(_) }
        ));
        assert_eq!(settlement.submit_count(), 0);
    }

    #[tokio::test]
    async fn test_rejected_compute_submission_fails_from_idle() {
        let (mut o, compute, settlement, store) = funded().await;
        compute.script(Scripted::Rejected("insufficient funds for gas".into())).await;

        let err = o.mint(Some(&session()), ["draw a cat"]).await.unwrap_err();

        assert!(matches!(
            err,
            MintError::Chain { chain: ChainKind::Compute, source: ChainError::Submission(_) }
        ));
        // nothing was broadcast, so there is no pending receipt to wait on
        assert_eq!(state_names(&o), vec!["Idle", "Failed"]);
        assert_eq!(compute.submit_count(), 1);
        assert_eq!(settlement.submit_count(), 0);
        assert!(o.cache().is_empty());
        assert_eq!(store.get(crate::cache::CACHE_KEY).unwrap(), None);
        assert!(o.notifications().all().is_empty());
    }

    #[tokio::test]
    async fn test_clear_cache_drops_entries() {
        let (mut o, compute, settlement, store) = funded().await;
        compute.script(compute_ok("cat ascii")).await;
        settlement.script(settlement_ok()).await;
        o.mint(Some(&session()), ["draw a cat"]).await.unwrap();
        assert_eq!(o.cache().len(), 1);

        o.clear_cache().unwrap();

        assert!(o.cache().is_empty());
        assert_eq!(store.get(crate::cache::CACHE_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_settlement_failure_keeps_cached_result() {
        let (mut o, compute, settlement, _) = funded().await;
        compute.script(compute_ok("cat ascii")).await;
        settlement
            .script(Scripted::Mined(receipt(B256::repeat_byte(0x02), false, vec![])))
            .await;

        let err = o.mint(Some(&session()), ["draw a cat"]).await.unwrap_err();

        assert!(matches!(err, MintError::SettlementRejected(_)));
        assert!(matches!(o.state(), MintState::Failed { stage: ChainKind::Settlement, .. }));
        assert_eq!(o.cache().len(), 1);
        assert_eq!(o.cache().entries()[0].query_result, "cat ascii");
    }

    #[tokio::test]
    async fn test_settle_cached_retries_settlement_only() {
        let (mut o, compute, settlement, _) = funded().await;
        compute.script(compute_ok("cat ascii")).await;
        settlement.script(Scripted::Rejected("nonce too low".into())).await;
        assert!(o.mint(Some(&session()), ["draw a cat"]).await.is_err());

        settlement.script(settlement_ok()).await;
        let cached = o.cache().entries()[0].clone();
        let minted = o.settle_cached(Some(&session()), &cached).await.unwrap();

        assert_eq!(minted.result.query_result, "cat ascii");
        assert_eq!(compute.submit_count(), 1);
        assert_eq!(settlement.submit_count(), 2);
        assert_eq!(
            state_names(&o),
            vec!["Idle", "ConfidentialConfirmed", "AwaitingSettlementReceipt", "Done"]
        );
    }

    #[tokio::test]
    async fn test_preconditions_block_mint() {
        let (mut o, compute, settlement, _) = funded().await;

        let err = o.mint(None, ["draw a cat"]).await.unwrap_err();
        assert!(matches!(err, MintError::SessionAbsent));

        let wrong = Session { account: ACCOUNT, connected_chain_id: 1 };
        let err = o.mint(Some(&wrong), ["draw a cat"]).await.unwrap_err();
        assert!(matches!(err, MintError::NetworkMismatch { expected: CHAIN_ID, connected: 1 }));

        let err = o.mint(Some(&session()), Vec::<String>::new()).await.unwrap_err();
        assert!(matches!(err, MintError::Request(RequestError::EmptyPrompts)));

        assert_eq!(o.state(), &MintState::Idle);
        assert_eq!(compute.submit_count(), 0);
        assert_eq!(settlement.submit_count(), 0);
    }

    #[tokio::test]
    async fn test_insufficient_balance_blocks_mint() {
        let (mut o, compute, _settlement, _) = funded().await;
        compute.set_balance(U256::from(crate::balance::DEFAULT_COMPUTE_THRESHOLD)).await;

        let err = o.mint(Some(&session()), ["draw a cat"]).await.unwrap_err();

        match err {
            MintError::InsufficientFunds { chain, faucet, .. } => {
                assert_eq!(chain, ChainKind::Compute);
                assert_eq!(faucet.as_deref(), Some("https://faucet.suave"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(compute.submit_count(), 0);
    }

    #[tokio::test]
    async fn test_refusal_raises_interim_notification() {
        let (mut o, compute, settlement, _) = funded().await;
        compute.script(compute_ok("I'm sorry, I can't draw that.")).await;
        settlement.script(settlement_ok()).await;

        o.mint(Some(&session()), ["draw something"]).await.unwrap();

        assert!(o.notifications().contains("refusal-0x7"));
    }

    #[test]
    fn test_refusal_heuristic() {
        assert!(looks_like_refusal("Sorry, but no."));
        assert!(looks_like_refusal("As an AI language model"));
        assert!(!looks_like_refusal(" /\\_/\\ \n( o.o )"));
    }

    #[tokio::test]
    async fn test_render_reads_token_data_and_tolerates_missing_uri() {
        let (o, _, settlement, _) = funded().await;
        let content = "line one\\nline two".to_string();
        settlement
            .respond_to(token_data_call(U256::from(7)), Bytes::from(content.abi_encode()))
            .await;

        let rendered = o.render(U256::from(7)).await.unwrap();

        assert_eq!(rendered.content, content);
        assert_eq!(rendered.lines, vec!["line one", "line two"]);
        assert_eq!(rendered.metadata_uri, None);
    }

    #[tokio::test]
    async fn test_render_fails_without_token_data() {
        let (o, _, _, _) = funded().await;
        let err = o.render(U256::from(7)).await.unwrap_err();
        assert!(matches!(err, MintError::Chain { chain: ChainKind::Settlement, .. }));
    }

    #[tokio::test]
    async fn test_unsettled_lists_unowned_tokens() {
        let (mut o, compute, settlement, _) = funded().await;
        compute.script(compute_ok("cat ascii")).await;
        settlement.script(Scripted::Rejected("underpriced".into())).await;
        let _ = o.mint(Some(&session()), ["draw a cat"]).await;

        assert_eq!(o.unsettled().await.unwrap().len(), 1);

        settlement
            .respond_to(owner_of_call(U256::from(7)), Bytes::from(ACCOUNT.abi_encode()))
            .await;
        assert!(o.unsettled().await.unwrap().is_empty());
    }
}
