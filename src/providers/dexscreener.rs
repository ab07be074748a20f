use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::{SnapshotProvider, base_url, lossy_f64};
use crate::types::Snapshot;

/// DEX pairs matching the address via DexScreener search.
///
/// Token magnitudes here are pooled liquidity depth, not holdings.
pub struct DexScreenerProvider {
    client: reqwest::Client,
    base: String,
    timeout: Duration,
}

impl DexScreenerProvider {
    pub fn new(client: reqwest::Client, base: &str, timeout: Duration) -> Self {
        Self {
            client,
            base: base_url(base),
            timeout,
        }
    }
}

#[async_trait]
impl SnapshotProvider for DexScreenerProvider {
    fn name(&self) -> &'static str {
        "dexscreener"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn try_fetch(&self, address: &str) -> Result<Option<Snapshot>> {
        let url = format!("{}/latest/dex/search", self.base);
        let body: Value = self
            .client
            .get(&url)
            .query(&[("q", address)])
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()?
            .json()
            .await
            .context("invalid dexscreener JSON")?;

        let mut snap = Snapshot::empty(address, self.name());
        for pair in body.get("pairs").and_then(Value::as_array).into_iter().flatten() {
            let Some(symbol) = pair
                .get("baseToken")
                .and_then(|t| t.get("symbol"))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
            else {
                continue;
            };
            let liquidity = lossy_f64(pair.get("liquidity").and_then(|l| l.get("usd")));
            snap.add_token(symbol, liquidity);
        }

        if snap.tokens.is_empty() {
            return Ok(None);
        }
        snap.usd_total = snap.token_sum();
        Ok(Some(snap))
    }
}
