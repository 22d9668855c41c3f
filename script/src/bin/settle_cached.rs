//! Settle cached compute results that never made it onto the settlement chain.
//!
//! Reads the local NFT cache, asks the NFT contract which cached token ids
//! have no owner yet, and submits the mint for each using the cached
//! signature. The confidential request is not re-run.
//!
//! Usage:
//!   cargo run --release -p chatnft-script --bin settle-cached
//!
//! Required env vars (from .env):
//!   CHATNFT_ADDRESS, NFTEE_ADDRESS, PRIVATE_KEY
//!
//! Optional env vars:
//!   TOKEN_ID   — Only settle this token id (decimal or 0x hex)

use alloy::primitives::U256;
use anyhow::{Context, Result};
use chatnft_script::config::{ScriptConfig, Secrets};
use chatnft_script::{connect, init_tracing};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    println!("\n=== Settle cached NFTs ===\n");

    let config = ScriptConfig::load()?;
    let secrets = Secrets::load();
    let only: Option<U256> = std::env::var("TOKEN_ID")
        .ok()
        .map(|t| t.parse())
        .transpose()
        .context("TOKEN_ID must be a number")?;

    let mut live = connect(&config, &secrets).await?;
    let session = live.session.context("PRIVATE_KEY not set")?;
    println!("[1] Account: {}", session.account);
    println!("    Cached entries: {}", live.orchestrator.cache().len());

    let mut pending = live.orchestrator.unsettled().await?;
    if let Some(id) = only {
        pending.retain(|n| n.token_id == id);
    }
    pending.retain(|n| n.recipient == session.account);
    println!("[2] Unsettled for this account: {}", pending.len());

    let mut settled = 0usize;
    for nft in &pending {
        println!("[3] Settling #{}...", nft.token_id);
        match live.orchestrator.settle_cached(Some(&session), nft).await {
            Ok(minted) => {
                settled += 1;
                println!("    Minted in tx {}", minted.settlement_tx);
            }
            Err(e) => println!("    Failed: {e}"),
        }
    }

    println!("\nSettled {settled}/{} NFTs", pending.len());
    Ok(())
}
