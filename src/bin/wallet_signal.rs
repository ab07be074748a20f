use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use wallet_signal::config::{AppConfig, CONFIG_PATH};
use wallet_signal::notifier::{ConsoleNotifier, Notifier, TelegramNotifier};
use wallet_signal::poller::{Poller, Recipients};
use wallet_signal::providers::{build_http_client, build_providers};
use wallet_signal::reporter;
use wallet_signal::resolver::Resolver;
use wallet_signal::solana::TradeMonitor;
use wallet_signal::store::{JsonStateStore, ListFile, StateStore};
use wallet_signal::types::canonical_address;

#[derive(Parser)]
#[command(name = "wallet-signal", about = "Wallet change signal bot")]
struct Args {
    /// Path to the TOML config file
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll watched wallets and send signals until Ctrl+C
    Run {
        /// Print signals as JSON lines instead of sending them to Telegram
        #[arg(long)]
        dry_run: bool,
    },
    /// Add a wallet to the watch-list
    Add { address: String },
    /// Remove a wallet from the watch-list and forget its stored state
    Remove { address: String },
    /// Print the watch-list
    List,
    /// Print poller settings and counts
    Status,
    /// Subscribe a Telegram chat to signals
    Subscribe { chat_id: String },
    /// Unsubscribe a Telegram chat
    Unsubscribe { chat_id: String },
    /// Fetch a snapshot now without recording it
    Lookup { address: String },
    /// Write the default configuration to the config path
    InitConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = AppConfig::load_or_default(&args.config)?;
    config.apply_env_overrides(|key| std::env::var(key).ok())?;
    config.validate()?;

    let watchlist = ListFile::new(&config.settings.wallets_file);
    let subscribers = ListFile::new(&config.settings.subscribers_file);

    match args.command {
        Command::Run { dry_run } => run(config, watchlist, subscribers, dry_run).await?,
        Command::Add { address } => {
            let address = canonical_address(&address);
            if address.is_empty() {
                bail!("address must not be empty");
            }
            if watchlist.add(&address)? {
                println!("Added {address}");
            } else {
                println!("{address} is already watched");
            }
        }
        Command::Remove { address } => {
            let address = canonical_address(&address);
            let removed = watchlist.remove(&address)?;
            let store = JsonStateStore::open(&config.settings.state_file)?;
            store.remove(&address)?;
            if removed {
                println!("Removed {address}");
            } else {
                println!("{address} was not watched");
            }
        }
        Command::List => {
            let wallets = watchlist.entries()?;
            if wallets.is_empty() {
                println!("No wallets watched.");
            } else {
                for w in wallets {
                    println!("{w}");
                }
            }
        }
        Command::Status => {
            let store = JsonStateStore::open(&config.settings.state_file)?;
            println!("Interval: {}s", config.settings.poll_interval_secs);
            println!("Wallets: {}", watchlist.entries()?.len());
            println!("Stored states: {}", store.len());
            println!("Subscribers: {}", subscribers.entries()?.len());
            let order: Vec<String> = config.providers.order.iter().map(|k| k.to_string()).collect();
            println!("Providers: {}", order.join(", "));
            println!(
                "Solana monitor: {}",
                if config.solana.enabled { "on" } else { "off" }
            );
        }
        Command::Subscribe { chat_id } => {
            if subscribers.add(chat_id.trim())? {
                println!("Subscribed {chat_id}");
            } else {
                println!("{chat_id} is already subscribed");
            }
        }
        Command::Unsubscribe { chat_id } => {
            if subscribers.remove(chat_id.trim())? {
                println!("Unsubscribed {chat_id}");
            } else {
                println!("{chat_id} was not subscribed");
            }
        }
        Command::Lookup { address } => {
            // Read-only: goes through the resolver but never writes state.
            let client = build_http_client(&config)?;
            let resolver = Resolver::new(build_providers(&config, &client));
            match resolver.resolve(&canonical_address(&address)).await {
                Some(snap) => println!("{}", reporter::format_snapshot(&snap)),
                None => println!("No data available for {address}"),
            }
        }
        Command::InitConfig => {
            if args.config.exists() {
                bail!("{} already exists", args.config.display());
            }
            AppConfig::default().save(&args.config)?;
            println!("Wrote {}", args.config.display());
        }
    }

    Ok(())
}

async fn run(
    config: AppConfig,
    watchlist: ListFile,
    subscribers: ListFile,
    dry_run: bool,
) -> Result<()> {
    let client = build_http_client(&config)?;

    let notifier: Arc<dyn Notifier> = if dry_run {
        Arc::new(ConsoleNotifier)
    } else {
        let Some(token) = config.telegram.bot_token.as_deref() else {
            bail!("telegram.bot_token (or BOT_TOKEN) is required unless --dry-run is set");
        };
        Arc::new(TelegramNotifier::new(
            client.clone(),
            &config.telegram.api_base,
            token,
        ))
    };

    let store = Arc::new(JsonStateStore::open(&config.settings.state_file)?);
    info!(
        "Loaded {} stored wallet state(s) from {}",
        store.len(),
        config.settings.state_file
    );

    if config.providers.coinglass_api_key.is_none() {
        warn!("No CoinGlass API key configured; that provider will be skipped");
    }

    let resolver = Resolver::new(build_providers(&config, &client));
    let mut poller = Poller::new(resolver, store, notifier, config.thresholds.clone());
    if config.solana.enabled {
        info!("Solana trade monitor enabled ({})", config.solana.rpc_url);
        poller = poller.with_trade_monitor(TradeMonitor::new(&config.solana, client.clone()));
    }

    // Dry runs print every signal once, whether or not anyone is subscribed.
    let recipients = if dry_run {
        Recipients::Fixed(vec!["console".to_string()])
    } else {
        Recipients::Subscribers(subscribers)
    };

    let mode = if dry_run { "dry-run" } else { "live" };
    info!(
        "Starting wallet-signal ({mode}) — wallets file={} poll={}s. Press Ctrl+C to stop.",
        config.settings.wallets_file, config.settings.poll_interval_secs
    );

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
        }
    };
    poller
        .run(
            &watchlist,
            &recipients,
            Duration::from_secs(config.settings.poll_interval_secs),
            shutdown,
        )
        .await;

    Ok(())
}
