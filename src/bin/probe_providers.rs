//! Probe: snapshot providers
//!
//! Calls every configured provider for one address, bypassing the fallback
//! chain, and documents for each:
//! - Whether it returned data, nothing, or an error
//! - Latency against its own timeout
//! - The normalized snapshot it would contribute
//!
//! Usage: probe-providers <address> [--config config.toml]

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;

use wallet_signal::config::{AppConfig, CONFIG_PATH};
use wallet_signal::providers::{build_http_client, build_providers};
use wallet_signal::reporter;
use wallet_signal::resolver::Resolver;
use wallet_signal::types::canonical_address;

#[derive(Parser)]
#[command(name = "probe-providers", about = "Query each snapshot provider directly")]
struct Args {
    /// Wallet address to look up
    address: String,

    /// Path to the TOML config file
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = AppConfig::load_or_default(&args.config)?;
    config.apply_env_overrides(|key| std::env::var(key).ok())?;
    config.validate()?;

    let address = canonical_address(&args.address);
    let client = build_http_client(&config)?;
    let providers = build_providers(&config, &client);

    println!("=== Probe: snapshot providers ===");
    println!("Address: {address}");
    println!();

    for (i, provider) in providers.iter().enumerate() {
        println!("--- {}. {} (timeout {:?}) ---", i + 1, provider.name(), provider.timeout());
        let start = Instant::now();
        let result = tokio::time::timeout(provider.timeout(), provider.try_fetch(&address)).await;
        let latency = start.elapsed();
        println!("Latency: {latency:?}");
        match result {
            Ok(Ok(Some(snap))) => println!("{}", reporter::format_snapshot(&snap.normalized())),
            Ok(Ok(None)) => println!("No data"),
            Ok(Err(e)) => println!("Error: {e:#}"),
            Err(_) => println!("Timed out"),
        }
        println!();
    }

    println!("--- Resolver (first provider with data wins) ---");
    let resolver = Resolver::new(providers);
    match resolver.resolve(&address).await {
        Some(snap) => println!("Winner: {}", snap.source),
        None => println!("No provider had data"),
    }

    Ok(())
}
