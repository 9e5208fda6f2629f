#![forbid(unsafe_code)]
//! bookledger node: serves the ledger API and keeps the chain in step with
//! its peers.

use bookledger::config::{load_config_from, DEFAULT_CONFIG_PATH};
use bookledger::node::{init_tracing, Node};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,
    /// Address to bind
    #[arg(long)]
    host: Option<String>,
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Peer to register at startup (repeatable)
    #[arg(long = "peer")]
    peers: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = load_config_from(&cli.config)?;
    if let Some(port) = cli.port {
        config.network.api_port = port;
    }
    if let Some(host) = cli.host {
        config.network.host = host;
    }
    config.network.bootstrap_peers.extend(cli.peers);
    config.validate()?;

    init_tracing(&config.log.level);

    let node = Arc::new(Node::init(config)?);
    node.start().await?;
    Ok(())
}
