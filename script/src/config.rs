//! Environment configuration.
//!
//! Everything is read through a lookup function so tests can feed a map
//! instead of the process environment.

use std::path::PathBuf;
use std::time::Duration;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use chatnft_lib::config::{
    ComputeChainConfig, DeploymentConfig, PayloadSchema, ProtocolConfig, ResultEncoding,
    SettlementChainConfig, DEFAULT_COMPUTE_EXPLORER, DEFAULT_COMPUTE_FAUCET, DEFAULT_COMPUTE_GAS,
    DEFAULT_COMPUTE_GAS_PRICE, DEFAULT_COMPUTE_RPC, DEFAULT_KETTLE_ADDRESS, DEFAULT_POLL_INTERVAL,
    DEFAULT_RECEIPT_TIMEOUT, DEFAULT_SETTLEMENT_CHAIN_ID, DEFAULT_SETTLEMENT_CHAIN_NAME,
    DEFAULT_SETTLEMENT_EXPLORER, DEFAULT_SETTLEMENT_GAS, DEFAULT_SETTLEMENT_RPC, GWEI,
};
use chatnft_lib::{Credentials, Thresholds};

pub const DEFAULT_SETTLEMENT_FAUCET: &str = "https://faucet.quicknode.com/ethereum/sepolia";
pub const DEFAULT_CACHE_DIR: &str = "fixtures";

#[derive(Clone, Debug)]
pub struct ScriptConfig {
    pub deployment: DeploymentConfig,
    /// Endpoint that signs and sends confidential requests.
    pub compute_wallet_rpc: String,
    /// Wallet endpoint used for network switching, if any.
    pub wallet_rpc: Option<String>,
    pub cache_dir: PathBuf,
}

/// Keys and API credentials. Never logged.
#[derive(Clone, Default)]
pub struct Secrets {
    pub private_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub minter_private_key: Option<String>,
}

impl Secrets {
    pub fn load() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());
        Self {
            private_key: get("PRIVATE_KEY"),
            openai_api_key: get("OPENAI_API_KEY"),
            minter_private_key: get("MINTER_PRIVATE_KEY"),
        }
    }

    /// Credentials for payloads that carry a minting key and API key.
    /// The minter key falls back to `PRIVATE_KEY`.
    pub fn credentials(&self) -> Option<Credentials> {
        let minter = self.minter_private_key.as_ref().or(self.private_key.as_ref())?;
        let api_key = self.openai_api_key.as_ref()?;
        Some(Credentials::new(minter, api_key))
    }
}

impl ScriptConfig {
    pub fn load() -> Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());
        let or = |k: &str, default: &str| get(k).unwrap_or_else(|| default.to_string());

        let chatnft: Address = get("CHATNFT_ADDRESS")
            .context("CHATNFT_ADDRESS not set")?
            .parse()
            .context("CHATNFT_ADDRESS is not an address")?;
        let nftee: Address = get("NFTEE_ADDRESS")
            .context("NFTEE_ADDRESS not set")?
            .parse()
            .context("NFTEE_ADDRESS is not an address")?;
        let kettle: Address = match get("SUAVE_KETTLE_ADDRESS") {
            Some(k) => k.parse().context("SUAVE_KETTLE_ADDRESS is not an address")?,
            None => DEFAULT_KETTLE_ADDRESS,
        };

        let compute_gas_price = match get("COMPUTE_GAS_PRICE_GWEI") {
            Some(g) => parse_gwei(&g).context("COMPUTE_GAS_PRICE_GWEI")?,
            None => DEFAULT_COMPUTE_GAS_PRICE,
        };
        let settlement_gas_price = get("SETTLEMENT_GAS_PRICE_GWEI")
            .map(|g| parse_gwei(&g))
            .transpose()
            .context("SETTLEMENT_GAS_PRICE_GWEI")?;

        let compute_rpc = or("SUAVE_RPC_HTTP", DEFAULT_COMPUTE_RPC);
        let compute = ComputeChainConfig {
            rpc_url: compute_rpc.clone(),
            contract: chatnft,
            kettle,
            explorer_url: or("SUAVE_EXPLORER_URL", DEFAULT_COMPUTE_EXPLORER),
            faucet_url: Some(or("SUAVE_FAUCET_URL", DEFAULT_COMPUTE_FAUCET)),
            gas: parse_or(get("COMPUTE_GAS"), DEFAULT_COMPUTE_GAS).context("COMPUTE_GAS")?,
            gas_price: compute_gas_price,
        };

        let settlement = SettlementChainConfig {
            rpc_url: or("L1_RPC_HTTP", DEFAULT_SETTLEMENT_RPC),
            chain_id: parse_or(get("L1_CHAIN_ID"), DEFAULT_SETTLEMENT_CHAIN_ID)
                .context("L1_CHAIN_ID")?,
            chain_name: or("L1_CHAIN_NAME", DEFAULT_SETTLEMENT_CHAIN_NAME),
            nft_contract: nftee,
            explorer_url: or("L1_EXPLORER_URL", DEFAULT_SETTLEMENT_EXPLORER),
            faucet_url: Some(or("L1_FAUCET_URL", DEFAULT_SETTLEMENT_FAUCET)),
            gas: parse_or(get("SETTLEMENT_GAS"), DEFAULT_SETTLEMENT_GAS).context("SETTLEMENT_GAS")?,
            gas_price: settlement_gas_price,
        };

        let protocol = ProtocolConfig {
            payload: get("PROTOCOL_PAYLOAD")
                .map(|p| p.parse::<PayloadSchema>())
                .transpose()?
                .unwrap_or_default(),
            result: get("PROTOCOL_RESULT")
                .map(|r| r.parse::<ResultEncoding>())
                .transpose()?
                .unwrap_or_default(),
        };

        let poll_interval = match get("BALANCE_POLL_SECS") {
            Some(s) => Duration::from_secs(s.parse().context("BALANCE_POLL_SECS")?),
            None => DEFAULT_POLL_INTERVAL,
        };
        let receipt_timeout = match get("RECEIPT_TIMEOUT_SECS") {
            Some(s) => Duration::from_secs(s.parse().context("RECEIPT_TIMEOUT_SECS")?),
            None => DEFAULT_RECEIPT_TIMEOUT,
        };

        Ok(Self {
            deployment: DeploymentConfig {
                compute,
                settlement,
                protocol,
                thresholds: Thresholds::default(),
                poll_interval,
                receipt_timeout,
            },
            compute_wallet_rpc: get("SUAVE_WALLET_RPC").unwrap_or(compute_rpc),
            wallet_rpc: get("WALLET_RPC_HTTP"),
            cache_dir: PathBuf::from(or("CACHE_DIR", DEFAULT_CACHE_DIR)),
        })
    }
}

fn parse_gwei(s: &str) -> Result<u128> {
    let gwei: u128 = s.trim().parse().context("gas price must be a whole number of gwei")?;
    Ok(gwei * GWEI)
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(v) => Ok(v.trim().parse()?),
        None => Ok(default),
    }
}
