use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{SnapshotProvider, base_url, first_str, lossy_f64};
use crate::types::{Position, Side, Snapshot, short_id};

const API_KEY_HEADER: &str = "CG-API-KEY";

/// Exchange balances plus Hyperliquid positions from CoinGlass.
///
/// Requires an API key; without one the provider always reports nothing.
pub struct CoinGlassProvider {
    client: reqwest::Client,
    base: String,
    api_key: Option<String>,
    min_position_usd: f64,
    timeout: Duration,
}

impl CoinGlassProvider {
    pub fn new(
        client: reqwest::Client,
        base: &str,
        api_key: Option<String>,
        min_position_usd: f64,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            base: base_url(base),
            api_key: api_key.filter(|k| !k.is_empty()),
            min_position_usd,
            timeout,
        }
    }

    async fn get_json(&self, path: &str, query: &[(&str, &str)], api_key: &str) -> Result<Value> {
        let url = format!("{}{path}", self.base);
        let resp = self
            .client
            .get(&url)
            .query(query)
            .header(API_KEY_HEADER, api_key)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()?;
        resp.json().await.context("invalid coinglass JSON")
    }

    /// Parse `data.list[]` into positions, adding their notional to the snapshot total.
    fn apply_positions(&self, body: &Value, snap: &mut Snapshot) {
        let Some(list) = body
            .get("data")
            .and_then(|d| d.get("list"))
            .and_then(Value::as_array)
        else {
            return;
        };

        for item in list {
            let value = lossy_f64(item.get("position_value_usd")).abs();
            if value < self.min_position_usd {
                continue;
            }
            let size = lossy_f64(item.get("position_size"));
            let side = if size > 0.0 {
                Side::Long
            } else if size < 0.0 {
                Side::Short
            } else {
                Side::Unknown
            };
            let symbol = first_str(item, &["symbol"]).unwrap_or("?");
            snap.positions.push(Position::new(symbol, side, value));
            snap.usd_total += value;
        }
    }
}

#[async_trait]
impl SnapshotProvider for CoinGlassProvider {
    fn name(&self) -> &'static str {
        "coinglass"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn try_fetch(&self, address: &str) -> Result<Option<Snapshot>> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Ok(None);
        };

        let assets = self
            .get_json(
                "/api/exchange/assets",
                &[("wallet_address", address)],
                api_key,
            )
            .await?;

        let mut snap = Snapshot::empty(address, self.name());
        if let Some(items) = assets.get("data").and_then(Value::as_array) {
            for item in items {
                let Some(symbol) = first_str(item, &["symbol"]) else {
                    continue;
                };
                let usd = lossy_f64(item.get("balance_usd"));
                snap.add_token(symbol, usd);
                snap.usd_total += usd;
            }
        }

        // Positions are best-effort: balances alone are still a valid observation.
        match self
            .get_json("/api/hyperliquid/position", &[("user", address)], api_key)
            .await
        {
            Ok(body) => self.apply_positions(&body, &mut snap),
            Err(e) => debug!("[{}] coinglass positions unavailable: {e:#}", short_id(address)),
        }

        Ok(Some(snap))
    }
}
