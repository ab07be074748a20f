//! Source-specific snapshot adapters.
//!
//! Upstream payloads are loosely documented and change without notice, so every
//! adapter walks `serde_json::Value` defensively instead of deserializing into
//! fixed structs.

pub mod coinglass;
pub mod debank;
pub mod dexscreener;
pub mod hyperdash;

use std::fmt;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::AppConfig;
use crate::types::Snapshot;

pub use coinglass::CoinGlassProvider;
pub use debank::DeBankProvider;
pub use dexscreener::DexScreenerProvider;
pub use hyperdash::HyperDashProvider;

/// One upstream that may be able to describe an address.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Short identifier recorded as `Snapshot::source`.
    fn name(&self) -> &'static str;

    /// Upper bound for a whole `try_fetch` call, including every request it makes.
    fn timeout(&self) -> Duration;

    /// Attempt to build a snapshot. `Ok(None)` means the source has nothing for
    /// this address; `Err` covers transport, status and payload failures.
    async fn try_fetch(&self, address: &str) -> Result<Option<Snapshot>>;
}

/// The closed set of supported providers, as named in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    CoinGlass,
    DeBank,
    DexScreener,
    HyperDash,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderKind::CoinGlass => "coinglass",
            ProviderKind::DeBank => "debank",
            ProviderKind::DexScreener => "dexscreener",
            ProviderKind::HyperDash => "hyperdash",
        };
        f.write_str(name)
    }
}

/// Build the shared HTTP client from config.
pub fn build_http_client(config: &AppConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.settings.request_timeout_secs))
        .user_agent(config.settings.user_agent.clone());
    if let Some(proxy) = config.settings.proxy_url.as_deref().filter(|p| !p.is_empty()) {
        builder = builder.proxy(reqwest::Proxy::all(proxy)?);
    }
    Ok(builder.build()?)
}

/// Instantiate providers in the configured priority order.
pub fn build_providers(
    config: &AppConfig,
    client: &reqwest::Client,
) -> Vec<Box<dyn SnapshotProvider>> {
    let providers = &config.providers;
    let min_position_usd = config.thresholds.min_position_usd;
    let timeout = Duration::from_secs(providers.timeout_secs);

    providers
        .order
        .iter()
        .map(|kind| -> Box<dyn SnapshotProvider> {
            match kind {
                ProviderKind::CoinGlass => Box::new(CoinGlassProvider::new(
                    client.clone(),
                    &providers.coinglass_base,
                    providers.coinglass_api_key.clone(),
                    min_position_usd,
                    timeout,
                )),
                ProviderKind::DeBank => Box::new(DeBankProvider::new(
                    client.clone(),
                    &providers.debank_base,
                    timeout,
                )),
                ProviderKind::DexScreener => Box::new(DexScreenerProvider::new(
                    client.clone(),
                    &providers.dexscreener_base,
                    timeout,
                )),
                ProviderKind::HyperDash => Box::new(HyperDashProvider::new(
                    client.clone(),
                    &providers.hyperdash_base,
                    min_position_usd,
                    timeout,
                )),
            }
        })
        .collect()
}

/// Read a number that upstreams sometimes encode as a string. Missing or
/// unparsable values read as zero.
pub(crate) fn lossy_f64(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// First non-empty string among `keys` on `obj`.
pub(crate) fn first_str<'a>(obj: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| obj.get(*k).and_then(Value::as_str))
        .find(|s| !s.is_empty())
}

/// Trim trailing slashes so paths can be appended with `/`.
pub(crate) fn base_url(raw: &str) -> String {
    raw.trim_end_matches('/').to_string()
}
