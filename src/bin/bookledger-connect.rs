#![forbid(unsafe_code)]
//! Operator CLI for a running bookledger node.

use bookledger::network::{ChainResponse, HttpTransport};
use bookledger::transaction::TransactionRequest;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Node to talk to
    #[arg(long, default_value = "127.0.0.1:5000")]
    node: String,
    /// Request timeout in milliseconds
    #[arg(long, default_value_t = 5_000)]
    timeout_ms: u64,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Registers one or more peers with the node
    Peer {
        #[arg(required = true)]
        addresses: Vec<String>,
    },
    /// Runs a consensus round on the node
    Resolve,
    /// Prints the node's chain
    Chain,
    /// Submits a transaction
    Send {
        sender: String,
        receiver: String,
        book: String,
    },
    /// Seals the node's pending transactions into a block
    Mine,
    /// Pushes the node's pending transactions to its peers
    Propagate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = HttpTransport::new(Duration::from_millis(cli.timeout_ms));
    let node = cli.node.as_str();

    match cli.command {
        Commands::Peer { addresses } => {
            let reply: Value = client
                .post_json(node, "/new_nodes", &json!({ "nodes": addresses }))
                .await?;
            println!("Registered peers:");
            if let Some(peers) = reply["total_nodes"].as_array() {
                for peer in peers {
                    println!("  {}", peer.as_str().unwrap_or_default());
                }
            }
        }
        Commands::Resolve => {
            let reply: Value = client.get_json(node, "/check_consensus").await?;
            let length = reply["chain"].as_array().map(Vec::len).unwrap_or(0);
            println!(
                "{} (replaced: {}, length: {})",
                reply["message"].as_str().unwrap_or_default(),
                reply["replaced"],
                length
            );
        }
        Commands::Chain => {
            let reply: ChainResponse = client.get_json(node, "/get_chain").await?;
            println!("Chain length: {}", reply.length);
            for block in &reply.chain {
                println!(
                    "#{:<4} {} tx  prev {}  hash {}",
                    block.index,
                    block.transactions.len(),
                    block.previous_hash,
                    block.hash()?
                );
            }
        }
        Commands::Send {
            sender,
            receiver,
            book,
        } => {
            let request = TransactionRequest {
                sender_key: Some(sender),
                receiver_key: Some(receiver),
                book_key: Some(book),
            };
            let reply: Value = client.post_json(node, "/add_transaction", &request).await?;
            println!("{}", reply["message"].as_str().unwrap_or_default());
        }
        Commands::Mine => {
            let reply: Value = client.get_json(node, "/add_block").await?;
            println!(
                "Sealed block {} with {} transaction(s)",
                reply["index"],
                reply["transaction"].as_array().map(Vec::len).unwrap_or(0)
            );
        }
        Commands::Propagate => {
            let reply: Value = client.get_json(node, "/propagate").await?;
            println!("{}", serde_json::to_string_pretty(&reply)?);
        }
    }

    Ok(())
}
