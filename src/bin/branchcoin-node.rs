#![forbid(unsafe_code)]
//! Branchcoin ledger node

use branchcoin::blockchain::Blockchain;
use branchcoin::config::load_config;
use branchcoin::crypto::{KeyPair, Secp256k1Verifier};
use branchcoin::node::{Node, Outbound};
use branchcoin::persistence::FileChainStore;
use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "branchcoin-node", version, about = "Run a Branchcoin ledger node")]
struct Args {
    /// Configuration file (defaults to ./branchcoin.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the chain file
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Recipient key for mined rewards
    #[arg(long)]
    coinbase_key: Option<String>,

    /// Validate and relay only
    #[arg(long)]
    no_mine: bool,

    /// Print a fresh key pair and exit
    #[arg(long)]
    generate_key: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run(Args::parse()).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    if args.generate_key {
        let keypair = KeyPair::generate();
        println!("secret key:    {}", keypair.secret_key_hex());
        println!("recipient key: {}", keypair.recipient_key());
        return Ok(());
    }

    let mut config = load_config(args.config.as_deref())?;
    if let Some(dir) = args.data_dir {
        config.node.data_dir = dir;
    }
    if let Some(key) = args.coinbase_key {
        config.node.coinbase_key = key;
    }
    if args.no_mine {
        config.miner.enabled = false;
    }
    config.validate()?;

    let chain_path = config.chain_path();
    info!(path = %chain_path.display(), "opening chain");
    let chain = Blockchain::open(
        Box::new(FileChainStore::new(chain_path)),
        Box::new(Secp256k1Verifier),
        config.node.coinbase_key.clone(),
    )?;

    let (node, handle, mut outbound) = Node::new(chain, config.node_settings());
    let node_task = tokio::spawn(node.run());

    // No transport is wired in; outbound traffic is only logged.
    let drain = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            match message {
                Outbound::Send(peer, message) => debug!(peer, kind = message.kind(), "outbound"),
                Outbound::Broadcast(message) => debug!(kind = message.kind(), "broadcast"),
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    handle.shutdown();

    let chain = node_task.await??;
    drain.abort();
    info!(height = chain.current_height(), tip = chain.best_tip_hash(), "chain saved");
    Ok(())
}
