use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::diff::DiffThresholds;
use crate::providers::ProviderKind;
use crate::{
    COINGLASS_API_BASE, DEBANK_API_BASE, DEXSCREENER_API_BASE, HYPERDASH_BASE, SOLANA_RPC_URL,
    TELEGRAM_API_BASE,
};

/// Default config file path.
pub const CONFIG_PATH: &str = "config.toml";

/// Top-level application config deserialized from `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub settings: SettingsConfig,
    #[serde(default)]
    pub thresholds: DiffThresholds,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub solana: SolanaConfig,
}

/// Runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsConfig {
    /// Delay between poll cycles in seconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Per-request HTTP timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Optional HTTP(S) proxy for all upstream requests.
    #[serde(default)]
    pub proxy_url: Option<String>,
    #[serde(default = "default_wallets_file")]
    pub wallets_file: String,
    #[serde(default = "default_subscribers_file")]
    pub subscribers_file: String,
    #[serde(default = "default_state_file")]
    pub state_file: String,
}

fn default_poll_interval() -> u64 {
    300
}

fn default_request_timeout() -> u64 {
    12
}

fn default_user_agent() -> String {
    "SignalBot/1.0".to_string()
}

fn default_wallets_file() -> String {
    "wallets.json".to_string()
}

fn default_subscribers_file() -> String {
    "authorized_chats.json".to_string()
}

fn default_state_file() -> String {
    "state.json".to_string()
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            request_timeout_secs: default_request_timeout(),
            user_agent: default_user_agent(),
            proxy_url: None,
            wallets_file: default_wallets_file(),
            subscribers_file: default_subscribers_file(),
            state_file: default_state_file(),
        }
    }
}

/// Snapshot provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Providers tried for every address, highest priority first.
    #[serde(default = "default_provider_order")]
    pub order: Vec<ProviderKind>,
    /// Budget for one provider attempt, covering all of its requests.
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub coinglass_api_key: Option<String>,
    #[serde(default = "default_coinglass_base")]
    pub coinglass_base: String,
    #[serde(default = "default_debank_base")]
    pub debank_base: String,
    #[serde(default = "default_dexscreener_base")]
    pub dexscreener_base: String,
    #[serde(default = "default_hyperdash_base")]
    pub hyperdash_base: String,
}

fn default_provider_order() -> Vec<ProviderKind> {
    vec![
        ProviderKind::CoinGlass,
        ProviderKind::DeBank,
        ProviderKind::DexScreener,
        ProviderKind::HyperDash,
    ]
}

fn default_provider_timeout() -> u64 {
    default_request_timeout() * 2
}

fn default_coinglass_base() -> String {
    COINGLASS_API_BASE.to_string()
}

fn default_debank_base() -> String {
    DEBANK_API_BASE.to_string()
}

fn default_dexscreener_base() -> String {
    DEXSCREENER_API_BASE.to_string()
}

fn default_hyperdash_base() -> String {
    HYPERDASH_BASE.to_string()
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            order: default_provider_order(),
            timeout_secs: default_provider_timeout(),
            coinglass_api_key: None,
            coinglass_base: default_coinglass_base(),
            debank_base: default_debank_base(),
            dexscreener_base: default_dexscreener_base(),
            hyperdash_base: default_hyperdash_base(),
        }
    }
}

/// Telegram Bot API credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default = "default_telegram_base")]
    pub api_base: String,
}

fn default_telegram_base() -> String {
    TELEGRAM_API_BASE.to_string()
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_base: default_telegram_base(),
        }
    }
}

/// On-chain Solana trade monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolanaConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_solana_rpc")]
    pub rpc_url: String,
    /// Minimum absolute SOL movement for a transaction to be considered.
    #[serde(default = "default_min_sol")]
    pub min_sol: f64,
    /// SOL movement that raises a whale alert when no token leg matched.
    #[serde(default = "default_whale_sol")]
    pub whale_sol: f64,
    #[serde(default = "default_signature_limit")]
    pub signature_limit: u32,
    /// Alert on the latest transaction the first time an address is seen.
    #[serde(default)]
    pub alert_on_first_seen: bool,
}

fn default_solana_rpc() -> String {
    SOLANA_RPC_URL.to_string()
}

fn default_min_sol() -> f64 {
    1.0
}

fn default_whale_sol() -> f64 {
    50.0
}

fn default_signature_limit() -> u32 {
    5
}

impl Default for SolanaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rpc_url: default_solana_rpc(),
            min_sol: default_min_sol(),
            whale_sol: default_whale_sol(),
            signature_limit: default_signature_limit(),
            alert_on_first_seen: false,
        }
    }
}

impl AppConfig {
    /// Load config from the given TOML file path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Load config if the file exists, otherwise start from defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write config to the given TOML file path.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(path, contents)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    /// Apply the environment variables used by existing deployments.
    ///
    /// `lookup` is usually `|k| std::env::var(k).ok()`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = var("BOT_TOKEN") {
            self.telegram.bot_token = Some(token);
        }
        if let Some(key) = var("COINGLASS_API_KEY") {
            self.providers.coinglass_api_key = Some(key);
        }
        if let Some(proxy) = var("PROXY_URL") {
            self.settings.proxy_url = Some(proxy);
        }
        if let Some(interval) = var("POLL_INTERVAL") {
            self.settings.poll_interval_secs = interval
                .trim()
                .parse()
                .with_context(|| format!("invalid POLL_INTERVAL: {interval}"))?;
        }
        if let Some(min) = var("MIN_POSITION_VALUE_USD") {
            self.thresholds.min_position_usd = min
                .trim()
                .parse()
                .with_context(|| format!("invalid MIN_POSITION_VALUE_USD: {min}"))?;
        }
        if let Some(path) = var("WALLETS_FILE") {
            self.settings.wallets_file = path;
        }
        if let Some(path) = var("STATE_FILE") {
            self.settings.state_file = path;
        }
        if let Some(path) = var("AUTHORIZED_CHATS_FILE") {
            self.settings.subscribers_file = path;
        }
        if let Some(url) = var("SOLANA_RPC") {
            self.solana.rpc_url = url;
        }
        Ok(())
    }

    /// Reject settings that would make the poller misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.settings.poll_interval_secs == 0 {
            bail!("settings.poll_interval_secs must be positive");
        }
        if self.settings.request_timeout_secs == 0 || self.providers.timeout_secs == 0 {
            bail!("timeouts must be positive");
        }

        let t = &self.thresholds;
        for (name, value) in [
            ("min_new_token_usd", t.min_new_token_usd),
            ("token_noise_usd", t.token_noise_usd),
            ("balance_change_usd", t.balance_change_usd),
            ("min_position_usd", t.min_position_usd),
        ] {
            if !value.is_finite() || value < 0.0 {
                bail!("thresholds.{name} must be a non-negative number");
            }
        }
        for (name, value) in [
            ("token_noise_relative", t.token_noise_relative),
            ("balance_change_relative", t.balance_change_relative),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("thresholds.{name} must be between 0 and 1");
            }
        }
        if !t.growth_factor.is_finite() || t.growth_factor < 1.0 {
            bail!("thresholds.growth_factor must be at least 1.0");
        }

        if self.providers.order.is_empty() {
            bail!("providers.order must name at least one provider");
        }
        let mut seen = HashSet::new();
        for kind in &self.providers.order {
            if !seen.insert(kind) {
                bail!("providers.order lists {kind} more than once");
            }
        }

        if self.solana.enabled && (!self.solana.min_sol.is_finite() || self.solana.min_sol < 0.0) {
            bail!("solana.min_sol must be a non-negative number");
        }
        Ok(())
    }
}
