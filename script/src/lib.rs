//! Alloy-backed adapters and environment loading shared by the binaries.

pub mod chain;
pub mod config;
pub mod wallet;

use std::sync::Arc;

use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};
use chatnft_lib::cache::{KeyValueStore, CACHE_KEY};
use chatnft_lib::{FileStore, NftCache, Orchestrator, PayloadSchema, Session};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::chain::{SettlementRpc, SuaveRpc};
use crate::config::{ScriptConfig, Secrets};
use crate::wallet::WalletEndpoint;

pub type LiveOrchestrator = Orchestrator<SuaveRpc, SettlementRpc, FileStore>;

/// `RUST_LOG` filtering, `info` when unset.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

/// Connected adapters plus the orchestrator driving them.
pub struct Live {
    pub orchestrator: LiveOrchestrator,
    pub compute: Arc<SuaveRpc>,
    pub settlement: Arc<SettlementRpc>,
    /// `None` when no `PRIVATE_KEY` is configured.
    pub session: Option<Session>,
}

pub async fn connect(config: &ScriptConfig, secrets: &Secrets) -> Result<Live> {
    let deployment = &config.deployment;
    let compute = Arc::new(SuaveRpc::new(
        &deployment.compute.rpc_url,
        &config.compute_wallet_rpc,
        deployment.receipt_timeout,
    )?);
    let settlement = Arc::new(SettlementRpc::new(
        &deployment.settlement.rpc_url,
        secrets.private_key.as_deref(),
        deployment.receipt_timeout,
    )?);

    let session = match &secrets.private_key {
        Some(key) => {
            let signer: PrivateKeySigner = key.parse().context("PRIVATE_KEY is not a valid key")?;
            let connected_chain_id = match &config.wallet_rpc {
                Some(url) => WalletEndpoint::new(url)?.chain_id().await?,
                None => settlement.chain_id().await?,
            };
            info!(account = %signer.address(), connected_chain_id, "session connected");
            Some(Session { account: signer.address(), connected_chain_id })
        }
        None => None,
    };

    let cache = NftCache::load_or_reset(FileStore::new(&config.cache_dir))
        .with_context(|| format!("failed to load cache from {}", config.cache_dir.display()))?;
    let mut orchestrator =
        Orchestrator::new(compute.clone(), settlement.clone(), deployment.clone(), cache);
    if deployment.protocol.payload == PayloadSchema::WithCredentials {
        let credentials = secrets
            .credentials()
            .context("PROTOCOL_PAYLOAD=credentials needs OPENAI_API_KEY and a minter key")?;
        orchestrator = orchestrator.with_credentials(credentials);
    }

    Ok(Live { orchestrator, compute, settlement, session })
}

/// Delete the cache file without going through a full connect. Returns how
/// many readable entries were dropped.
pub fn clear_cache(config: &ScriptConfig) -> Result<usize> {
    let store = FileStore::new(&config.cache_dir);
    let count = NftCache::load_or_reset(store.clone()).map(|c| c.len()).unwrap_or_default();
    store
        .remove(CACHE_KEY)
        .with_context(|| format!("failed to remove cache in {}", config.cache_dir.display()))?;
    Ok(count)
}
