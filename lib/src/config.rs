//! Deployment configuration consumed by the core.
//!
//! Values are plain data; loading them from the environment happens at the
//! binary edge.

use std::{fmt, str::FromStr, time::Duration};

use alloy_primitives::{address, Address};

use crate::balance::Thresholds;

pub const GWEI: u128 = 1_000_000_000;

pub const DEFAULT_KETTLE_ADDRESS: Address = address!("03493869959c866713c33669ca118e774a30a0e5");
pub const DEFAULT_COMPUTE_RPC: &str = "https://rpc.toliman.suave.flashbots.net";
pub const DEFAULT_COMPUTE_EXPLORER: &str = "https://explorer.toliman.suave.flashbots.net";
pub const DEFAULT_COMPUTE_FAUCET: &str = "https://faucet.toliman.suave.flashbots.net/";
pub const DEFAULT_SETTLEMENT_RPC: &str = "https://rpc-sepolia.flashbots.net";
pub const DEFAULT_SETTLEMENT_CHAIN_ID: u64 = 11155111;
pub const DEFAULT_SETTLEMENT_CHAIN_NAME: &str = "Sepolia";
pub const DEFAULT_SETTLEMENT_EXPLORER: &str = "https://sepolia.etherscan.io";

pub const DEFAULT_COMPUTE_GAS: u64 = 5_000_000;
pub const DEFAULT_COMPUTE_GAS_PRICE: u128 = 10 * GWEI;
pub const DEFAULT_SETTLEMENT_GAS: u64 = 900_000;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(120);

/// Compute chain (confidential execution) settings.
#[derive(Clone, Debug)]
pub struct ComputeChainConfig {
    pub rpc_url: String,
    /// ChatNFT contract executed by the kettle.
    pub contract: Address,
    pub kettle: Address,
    pub explorer_url: String,
    pub faucet_url: Option<String>,
    pub gas: u64,
    pub gas_price: u128,
}

/// Settlement chain (NFT contract) settings.
#[derive(Clone, Debug)]
pub struct SettlementChainConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub chain_name: String,
    pub nft_contract: Address,
    pub explorer_url: String,
    pub faucet_url: Option<String>,
    pub gas: u64,
    /// `None` defers to the node's current gas price.
    pub gas_price: Option<u128>,
}

/// Shape of the confidential payload tuple.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PayloadSchema {
    /// `(address recipient, string[] prompts)`
    #[default]
    Minimal,
    /// `(string privateKey, address recipient, string[] prompts, string openaiApiKey)`
    WithCredentials,
}

/// ABI type of the `QueryResult` event field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResultEncoding {
    #[default]
    Bytes,
    String,
}

/// The protocol revision a deployment speaks. One of each, never mixed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProtocolConfig {
    pub payload: PayloadSchema,
    pub result: ResultEncoding,
}

#[derive(Clone, Debug)]
pub struct DeploymentConfig {
    pub compute: ComputeChainConfig,
    pub settlement: SettlementChainConfig,
    pub protocol: ProtocolConfig,
    pub thresholds: Thresholds,
    pub poll_interval: Duration,
    pub receipt_timeout: Duration,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown {kind} '{value}'")]
pub struct ParseVariantError {
    kind: &'static str,
    value: String,
}

impl FromStr for PayloadSchema {
    type Err = ParseVariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "minimal" => Ok(Self::Minimal),
            "credentials" | "with-credentials" => Ok(Self::WithCredentials),
            _ => Err(ParseVariantError { kind: "payload schema", value: s.to_string() }),
        }
    }
}

impl FromStr for ResultEncoding {
    type Err = ParseVariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bytes" => Ok(Self::Bytes),
            "string" => Ok(Self::String),
            _ => Err(ParseVariantError { kind: "result encoding", value: s.to_string() }),
        }
    }
}

impl fmt::Display for PayloadSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Minimal => write!(f, "minimal"),
            Self::WithCredentials => write!(f, "credentials"),
        }
    }
}

impl fmt::Display for ResultEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes => write!(f, "bytes"),
            Self::String => write!(f, "string"),
        }
    }
}
