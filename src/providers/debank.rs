use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::{SnapshotProvider, base_url, first_str, lossy_f64};
use crate::types::Snapshot;

/// Wallet balances from the DeBank total-balance endpoint. No positions.
pub struct DeBankProvider {
    client: reqwest::Client,
    base: String,
    timeout: Duration,
}

impl DeBankProvider {
    pub fn new(client: reqwest::Client, base: &str, timeout: Duration) -> Self {
        Self {
            client,
            base: base_url(base),
            timeout,
        }
    }
}

#[async_trait]
impl SnapshotProvider for DeBankProvider {
    fn name(&self) -> &'static str {
        "debank"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn try_fetch(&self, address: &str) -> Result<Option<Snapshot>> {
        let url = format!("{}/user/total_balance", self.base);
        let body: Value = self
            .client
            .get(&url)
            .query(&[("id", address)])
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()?
            .json()
            .await
            .context("invalid debank JSON")?;

        let Some(data) = body.get("data").filter(|d| d.is_object()) else {
            return Ok(None);
        };

        let mut snap = Snapshot::empty(address, self.name());
        snap.usd_total = lossy_f64(data.get("total_usd_value"));

        if let Some(assets) = data.get("wallet_asset_list").and_then(Value::as_array) {
            for asset in assets {
                let Some(symbol) = first_str(asset, &["symbol", "name"]) else {
                    continue;
                };
                let usd = lossy_f64(asset.get("price")) * lossy_f64(asset.get("amount"));
                snap.add_token(symbol, usd);
            }
        }

        Ok(Some(snap))
    }
}
