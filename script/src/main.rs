//! ChatNFT CLI.
//!
//! Subcommands:
//!   mint            - Run prompts through the compute chain and mint the result
//!   balances        - Show balances on both chains (optionally keep polling)
//!   switch-network  - Ask the wallet to switch to the settlement chain
//!   list            - List cached compute results
//!   render          - Print a minted NFT's on-chain content
//!   clear-cache     - Delete the local NFT cache

use alloy::primitives::{Address, U256};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use chatnft_lib::balance::switch_network;
use chatnft_lib::notifications::NotificationCenter;
use chatnft_lib::orchestrator::RenderedNft;
use chatnft_lib::request::DEFAULT_PROMPT;
use chatnft_lib::{ChainKind, GateVerdict, MintError};
use chatnft_script::config::{ScriptConfig, Secrets};
use chatnft_script::wallet::WalletEndpoint;
use chatnft_script::{clear_cache, connect, init_tracing};

#[derive(Parser)]
#[command(name = "chatnft")]
#[command(about = "Mint LLM output as NFTs via a confidential compute chain")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an NFT from prompts and mint it on the settlement chain
    Mint {
        /// Prompt text; repeat for several prompts
        #[arg(long = "prompt")]
        prompts: Vec<String>,
    },
    /// Print balances and whether minting is enabled
    Balances {
        /// Keep polling until interrupted
        #[arg(long, default_value = "false")]
        watch: bool,
    },
    /// Switch the wallet to the settlement chain, adding it if unknown
    SwitchNetwork,
    /// List cached compute results
    List {
        /// Only entries for this recipient
        #[arg(long)]
        recipient: Option<Address>,
    },
    /// Read a minted NFT back from the settlement chain
    Render {
        /// Token id, decimal or 0x-prefixed hex
        token_id: U256,
    },
    /// Delete every cached compute result
    ClearCache,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    let config = ScriptConfig::load()?;
    let secrets = Secrets::load();

    match cli.command {
        Commands::Mint { prompts } => mint(&config, &secrets, prompts).await,
        Commands::Balances { watch } => balances(&config, &secrets, watch).await,
        Commands::SwitchNetwork => {
            let url = config.wallet_rpc.as_deref().context("WALLET_RPC_HTTP not set")?;
            let wallet = WalletEndpoint::new(url)?;
            let outcome = switch_network(&wallet, &config.deployment.settlement).await?;
            println!(
                "{outcome:?} to {} (chain {})",
                config.deployment.settlement.chain_name, config.deployment.settlement.chain_id
            );
            Ok(())
        }
        Commands::List { recipient } => {
            let live = connect(&config, &secrets).await?;
            let cache = live.orchestrator.cache();
            let entries: Vec<_> = match recipient {
                Some(r) => cache.for_recipient(r).collect(),
                None => cache.entries().iter().collect(),
            };
            if entries.is_empty() {
                println!("No cached NFTs");
            }
            for nft in entries {
                let preview: String = nft.query_result.chars().take(16).collect();
                println!("#{:<6} {}  {preview}", nft.token_id, nft.recipient);
            }
            Ok(())
        }
        Commands::Render { token_id } => {
            let live = connect(&config, &secrets).await?;
            let rendered = live.orchestrator.render(token_id).await?;
            print_rendered(&rendered);
            Ok(())
        }
        Commands::ClearCache => {
            let count = clear_cache(&config)?;
            println!("Removed {count} cached NFTs");
            Ok(())
        }
    }
}

async fn mint(config: &ScriptConfig, secrets: &Secrets, mut prompts: Vec<String>) -> Result<()> {
    if prompts.is_empty() {
        prompts.push(DEFAULT_PROMPT.to_string());
    }
    let mut live = connect(config, secrets).await?;

    println!("\n=== ChatNFT Mint ===\n");
    println!("Compute RPC:      {}", config.deployment.compute.rpc_url);
    println!("ChatNFT:          {}", config.deployment.compute.contract);
    println!("Settlement RPC:   {}", config.deployment.settlement.rpc_url);
    println!("NFTEE:            {}", config.deployment.settlement.nft_contract);
    println!("Protocol:         {} payload, {} result\n", config.deployment.protocol.payload, config.deployment.protocol.result);
    for (i, p) in prompts.iter().enumerate() {
        println!("Prompt {}: {p}", i + 1);
    }

    let outcome = live.orchestrator.mint(live.session.as_ref(), &prompts).await;
    print_notifications(live.orchestrator.notifications());

    let minted = match outcome {
        Ok(minted) => minted,
        Err(MintError::InsufficientFunds { chain, balance, threshold, faucet }) => {
            let faucet = faucet.map(|f| format!("; top up at {f}")).unwrap_or_default();
            bail!("{chain} balance {balance} wei must exceed {threshold} wei{faucet}");
        }
        Err(MintError::SessionAbsent) => bail!("PRIVATE_KEY not set; no account to mint from"),
        Err(e) => {
            println!("\nState: {}", live.orchestrator.state().name());
            return Err(e.into());
        }
    };

    println!("\n[1] Token #{} created for {}", minted.result.token_id, minted.result.recipient);
    println!("[2] Minted in tx {}", minted.settlement_tx);
    for event in &minted.events {
        println!("    {event:?}");
    }

    println!("[3] Reading NFT back...");
    let rendered = live.orchestrator.render(minted.result.token_id).await?;
    print_rendered(&rendered);
    Ok(())
}

async fn balances(config: &ScriptConfig, secrets: &Secrets, watch: bool) -> Result<()> {
    let live = connect(config, secrets).await?;
    let session = live.session.context("PRIVATE_KEY not set; no account to check")?;
    let gate = live.orchestrator.gate().clone();

    if !watch {
        if let Err(e) = gate.refresh(live.compute.as_ref(), live.settlement.as_ref(), session.account).await {
            println!("Balance fetch failed: {e}");
        }
        print_gate(config, &gate.balances(), gate.verdict());
        return Ok(());
    }

    let mut updates = gate.subscribe();
    let poller = gate.start_polling(
        live.compute.clone(),
        live.settlement.clone(),
        session.account,
        config.deployment.poll_interval,
    );
    println!("Polling every {:?}, Ctrl-C to stop", config.deployment.poll_interval);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = *updates.borrow_and_update();
                print_gate(config, &snapshot, gate.verdict());
            }
        }
    }
    poller.stop().await;
    Ok(())
}

fn print_gate(config: &ScriptConfig, balances: &chatnft_lib::Balances, verdict: GateVerdict) {
    let show = |b: Option<U256>| b.map(|b| format!("{b} wei")).unwrap_or_else(|| "unknown".into());
    println!("Compute chain:     {}", show(balances.compute));
    println!("Settlement chain:  {}", show(balances.settlement));
    match verdict {
        GateVerdict::Ready => println!("Minting enabled"),
        GateVerdict::Unknown => println!("Minting disabled: balances not loaded"),
        GateVerdict::Insufficient(chain) => {
            let faucet = match chain {
                ChainKind::Compute => config.deployment.compute.faucet_url.as_deref(),
                ChainKind::Settlement => config.deployment.settlement.faucet_url.as_deref(),
            };
            println!("Minting disabled: fund the {chain}{}", faucet.map(|f| format!(" at {f}")).unwrap_or_default());
        }
    }
}

fn print_notifications(center: &NotificationCenter) {
    for n in center.active() {
        match (&n.href, &n.link_text) {
            (Some(href), Some(text)) => println!("  * {} [{text}] {href}", n.message),
            _ => println!("  * {}", n.message),
        }
    }
}

fn print_rendered(rendered: &RenderedNft) {
    println!("\n--- NFT #{} ---", rendered.token_id);
    for line in &rendered.lines {
        println!("{line}");
    }
    println!("---");
    if let Some(uri) = &rendered.metadata_uri {
        println!("Metadata: {uri}");
    }
}
