use std::path::PathBuf;

use clap::Parser;
use colored::*;
use figlet_rs::FIGfont;
use relay_node::config::Config;
use relay_node::node::RelayNode;
use relay_node::peer::ProposalKey;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn print_banner() {
    let Ok(font) = FIGfont::standard() else {
        return;
    };
    let Some(figure) = font.convert("Bridge Relay") else {
        return;
    };

    println!("{}", "═══════════════════════════════════════════════════════════════════════════════".bright_magenta());
    println!("{}", figure.to_string().bright_cyan().bold());
    println!("{}", "═══════════════════════════════════════════════════════════════════════════════".bright_magenta());
    println!("{}", "Header sync • Merkle proposals • Peer signatures".bright_yellow());
    println!("{}", "═══════════════════════════════════════════════════════════════════════════════".bright_magenta());
    println!();
}

#[derive(Parser, Debug)]
#[command(name = "relay-node")]
#[command(about = "Relay node for a two-chain header bridge", long_about = None)]
struct Args {
    /// Path to the JSON config file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Overrides `port` from the config file
    #[arg(short, long)]
    port: Option<u16>,

    /// Overrides `datadir` from the config file
    #[arg(long)]
    datadir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    print_banner();

    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config = Config::from_file(&args.config)?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(datadir) = args.datadir {
        config.datadir = datadir;
    }
    let (chain_a, chain_b) = config.chains()?;
    info!(%chain_a, %chain_b, address = %config.address, "starting relay");

    let (node, mut signature_requests) = RelayNode::new(&config)?;
    let signatures = node.signatures();

    // The wallet consumes signature requests from here.
    tokio::spawn(async move {
        while let Some(proposal) = signature_requests.recv().await {
            let collected = signatures
                .signatures(&ProposalKey::from(&proposal))
                .await
                .len();
            info!(
                chain = %proposal.chain,
                start = proposal.start_block,
                end = proposal.end_block,
                root = %proposal.merkle_root,
                collected,
                "signature request queued for wallet"
            );
        }
    });

    tokio::select! {
        result = node.run() => {
            if let Err(e) = &result {
                error!("{e}");
            }
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
        }
    }

    Ok(())
}
