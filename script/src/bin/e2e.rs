//! End-to-end test: confidential compute → settlement mint → read back,
//! against deployed ChatNFT and NFTEE contracts.
//!
//! Usage:
//!   cargo run --release -p chatnft-script --bin e2e
//!
//! Required env vars (from .env):
//!   CHATNFT_ADDRESS   — ChatNFT contract on the compute chain
//!   NFTEE_ADDRESS     — NFT contract on the settlement chain
//!   PRIVATE_KEY       — Key funded on both chains
//!
//! Optional env vars:
//!   E2E_PROMPT        — Prompt to mint (default: the ASCII cat prompt)
//!   SUAVE_RPC_HTTP, SUAVE_WALLET_RPC, L1_RPC_HTTP, L1_CHAIN_ID, ...
//!                       see the `chatnft` CLI

use alloy::primitives::Address;
use anyhow::{ensure, Context, Result};
use chatnft_lib::balance::GateVerdict;
use chatnft_lib::chain::SettlementChain;
use chatnft_lib::request::DEFAULT_PROMPT;
use chatnft_lib::settlement::{decode_address_return, owner_of_call};
use chatnft_lib::MintState;
use chatnft_script::config::{ScriptConfig, Secrets};
use chatnft_script::{connect, init_tracing};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    // ── Step 0: Load config ────────────────────────────────────────────
    println!("\n=== ChatNFT E2E Test ===\n");

    let config = ScriptConfig::load()?;
    let secrets = Secrets::load();
    let prompt = std::env::var("E2E_PROMPT").unwrap_or_else(|_| DEFAULT_PROMPT.to_string());
    let deployment = &config.deployment;

    println!("Compute RPC:      {}", deployment.compute.rpc_url);
    println!("ChatNFT:          {}", deployment.compute.contract);
    println!("Kettle:           {}", deployment.compute.kettle);
    println!("Settlement RPC:   {}", deployment.settlement.rpc_url);
    println!("NFTEE:            {}", deployment.settlement.nft_contract);
    println!("Prompt:           {prompt}\n");

    // ── Step 1: Connect ────────────────────────────────────────────────
    let mut live = connect(&config, &secrets).await?;
    let session = live.session.context("PRIVATE_KEY not set")?;
    println!("[1] Account: {} (chain {})", session.account, session.connected_chain_id);

    // ── Step 2: Balances ───────────────────────────────────────────────
    let gate = live.orchestrator.gate().clone();
    let balances = gate
        .refresh(live.compute.as_ref(), live.settlement.as_ref(), session.account)
        .await?;
    println!("[2] Compute balance:    {:?}", balances.compute);
    println!("    Settlement balance: {:?}", balances.settlement);
    ensure!(gate.verdict() == GateVerdict::Ready, "balance gate closed: {:?}", gate.verdict());

    // ── Step 3: Mint ───────────────────────────────────────────────────
    let cached_before = live.orchestrator.cache().len();
    println!("[3] Minting...");
    let minted = live.orchestrator.mint(Some(&session), [prompt.as_str()]).await?;
    let token_id = minted.result.token_id;
    println!("    Token id:       {token_id}");
    println!("    Recipient:      {}", minted.result.recipient);
    println!("    Settlement tx:  {}", minted.settlement_tx);
    for state in live.orchestrator.history() {
        println!("    -> {}", state.name());
    }
    ensure!(matches!(live.orchestrator.state(), MintState::Done(_)), "mint did not finish");
    ensure!(minted.result.recipient == session.account, "NFT created for the wrong recipient");

    // ── Step 4: Verify on-chain state ──────────────────────────────────
    println!("[4] Verifying on-chain state...");
    let raw_owner = live
        .settlement
        .call(deployment.settlement.nft_contract, owner_of_call(token_id))
        .await?;
    let owner: Address = decode_address_return(&raw_owner)?;
    ensure!(owner == session.account, "owner mismatch: {owner} != {}", session.account);
    println!("    Owner verified: {owner}");

    let rendered = live.orchestrator.render(token_id).await?;
    ensure!(
        rendered.content == minted.result.query_result,
        "on-chain content differs from the compute result"
    );
    println!("    Content verified ({} lines)", rendered.lines.len());

    // ── Step 5: Cache ──────────────────────────────────────────────────
    let cache = live.orchestrator.cache();
    ensure!(cache.len() == cached_before + 1, "compute result was not cached");
    ensure!(cache.find(token_id).is_some(), "token {token_id} missing from cache");
    println!("[5] Cache holds {} entries", cache.len());

    println!("\n=== E2E passed ===");
    Ok(())
}
