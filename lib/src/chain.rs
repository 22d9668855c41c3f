//! Ports for the two chains the orchestrator talks to.
//!
//! Implementations:
//! - alloy-backed RPC adapters (script crate)
//! - [`crate::testing`] mocks for tests

use std::fmt;
use std::future::Future;

use alloy_primitives::{Address, Bytes, Log, B256, U256};

use crate::request::ConfidentialTransaction;
use crate::settlement::SettlementTransaction;

/// Terminal receipt of a submitted transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: B256,
    pub success: bool,
    pub logs: Vec<Log>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChainKind {
    Compute,
    Settlement,
}

impl fmt::Display for ChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainKind::Compute => write!(f, "compute chain"),
            ChainKind::Settlement => write!(f, "settlement chain"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("transaction submission failed: {0}")]
    Submission(String),

    #[error("timed out waiting for receipt of {0}")]
    ReceiptTimeout(B256),

    #[error("call reverted: {0}")]
    Reverted(String),

    #[error("RPC error: {0}")]
    Rpc(String),
}

/// The chain hosting the confidential compute contract.
pub trait ComputeChain: Send + Sync {
    /// Submit a confidential request signed by `from`. Returns the tx hash.
    fn submit_confidential(
        &self,
        from: Address,
        tx: &ConfidentialTransaction,
    ) -> impl Future<Output = Result<B256, ChainError>> + Send;

    /// Block until the transaction has a terminal receipt.
    fn wait_for_receipt(
        &self,
        tx_hash: B256,
    ) -> impl Future<Output = Result<Receipt, ChainError>> + Send;

    fn balance(&self, account: Address) -> impl Future<Output = Result<U256, ChainError>> + Send;
}

/// The chain hosting the NFT contract.
pub trait SettlementChain: Send + Sync {
    fn submit(
        &self,
        from: Address,
        tx: &SettlementTransaction,
    ) -> impl Future<Output = Result<B256, ChainError>> + Send;

    fn wait_for_receipt(
        &self,
        tx_hash: B256,
    ) -> impl Future<Output = Result<Receipt, ChainError>> + Send;

    fn balance(&self, account: Address) -> impl Future<Output = Result<U256, ChainError>> + Send;

    /// Read-only `eth_call`.
    fn call(&self, to: Address, data: Bytes) -> impl Future<Output = Result<Bytes, ChainError>> + Send;
}
