pub mod config;
pub mod diff;
pub mod notifier;
pub mod poller;
pub mod providers;
pub mod reporter;
pub mod resolver;
pub mod solana;
pub mod store;
pub mod types;

/// CoinGlass open API base URL (requires `CG-API-KEY`)
pub const COINGLASS_API_BASE: &str = "https://open-api-v4.coinglass.com";

/// DeBank public API base URL
pub const DEBANK_API_BASE: &str = "https://api.debank.com";

/// DexScreener API base URL (public, no auth required)
pub const DEXSCREENER_API_BASE: &str = "https://api.dexscreener.com";

/// HyperDash web base URL; trader pages embed position state as JSON
pub const HYPERDASH_BASE: &str = "https://hyperdash.info";

/// Solana mainnet JSON-RPC endpoint
pub const SOLANA_RPC_URL: &str = "https://api.mainnet-beta.solana.com";

/// Telegram Bot API base URL
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
