//! Command-line interface for darwinx-pool.
//!
//! This binary provides a CLI for querying the pool daemon's stats API.

use std::env;

use anyhow::Result;

use darwinx_pool::api_client;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: darwinx-cli <command>");
        eprintln!();
        eprintln!("Commands:");
        eprintln!("  status            Show pool-wide stats");
        eprintln!("  miner <username>  Show a single miner's share/balance summary");
        eprintln!();
        eprintln!("Environment:");
        eprintln!("  DARWINX_POOL_API_URL    API base URL (default: http://127.0.0.1:7785)");
        std::process::exit(1);
    }

    let command = &args[1];

    match command.as_str() {
        "status" => cmd_status().await?,
        "miner" => {
            let Some(username) = args.get(2) else {
                eprintln!("Usage: darwinx-cli miner <username>");
                std::process::exit(1);
            };
            cmd_miner(username).await?
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            eprintln!("Run without arguments to see usage.");
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Build an API client, honoring DARWINX_POOL_API_URL if set.
fn make_client() -> api_client::Client {
    match env::var("DARWINX_POOL_API_URL") {
        Ok(url) => api_client::Client::with_base_url(url),
        Err(_) => api_client::Client::new(),
    }
}

/// Print a summary of pool-wide stats.
async fn cmd_status() -> Result<()> {
    let client = make_client();
    let stats = client.get_stats().await?;

    println!("Miners online (24h): {}", stats.miners_online);
    println!("Shares (24h):        {}", stats.shares_last_24h);
    println!("Current round:       {}", stats.current_round_id);
    println!("Network difficulty:  {}", stats.network_difficulty);

    Ok(())
}

/// Print a single miner's share/balance summary.
async fn cmd_miner(username: &str) -> Result<()> {
    let client = make_client();
    let summary = client.get_miner(username).await?;

    println!("Username:  {}", summary.username);
    println!("Accepted:  {}", summary.total_accepted);
    println!("Rejected:  {}", summary.total_rejected);
    println!("Balance:   {} sats", summary.balance_sats);

    Ok(())
}
