//! Orchestration core for minting LLM output as an NFT across two chains.
//!
//! A confidential request runs the prompts on the compute chain, whose
//! receipt carries a signed result; that result is then minted on the
//! settlement chain. Chain access goes through the [`chain`] ports so the
//! whole flow runs against [`testing`] mocks as well as real RPC adapters.

pub mod abi;
pub mod balance;
pub mod cache;
pub mod chain;
pub mod config;
pub mod logs;
pub mod notifications;
pub mod orchestrator;
pub mod request;
pub mod settlement;
pub mod signature;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

use tiny_keccak::{Hasher, Keccak};

pub use balance::{BalanceGate, Balances, GateVerdict, Thresholds};
pub use cache::{CachedNft, FileStore, MemoryStore, NftCache};
pub use chain::{ChainError, ChainKind, ComputeChain, Receipt, SettlementChain};
pub use config::{DeploymentConfig, PayloadSchema, ProtocolConfig, ResultEncoding};
pub use logs::{LogParser, MintResult};
pub use orchestrator::{MintError, MintState, Minted, Orchestrator, Session};
pub use request::{ConfidentialRequestBuilder, ConfidentialTransaction, Credentials, MintRequest};
pub use settlement::SettlementTransaction;
pub use signature::SplitSignature;

// =============================================================================
//                          KECCAK256 HELPERS
// =============================================================================

/// Original Keccak-256 (not SHA3-256), as used for event topics.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}
