use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::{SnapshotProvider, base_url, first_str, lossy_f64};
use crate::types::{Position, Side, Snapshot};

const POSITIONS_MARKER: &str = "\"positions\":";

/// Perp positions scraped from a HyperDash trader page.
///
/// The page embeds its state as JSON inside HTML; only the first
/// `"positions":[…]` array is read.
pub struct HyperDashProvider {
    client: reqwest::Client,
    base: String,
    min_position_usd: f64,
    timeout: Duration,
}

impl HyperDashProvider {
    pub fn new(client: reqwest::Client, base: &str, min_position_usd: f64, timeout: Duration) -> Self {
        Self {
            client,
            base: base_url(base),
            min_position_usd,
            timeout,
        }
    }
}

/// Extract the JSON array that follows the first `"positions":` in `page`.
///
/// Parses exactly one JSON value after the marker, so nested arrays and
/// brackets inside strings are handled correctly.
fn embedded_positions(page: &str) -> Option<Vec<Value>> {
    let start = page.find(POSITIONS_MARKER)? + POSITIONS_MARKER.len();
    let rest = page[start..].trim_start();
    if !rest.starts_with('[') {
        return None;
    }
    let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<Value>();
    match stream.next()? {
        Ok(Value::Array(items)) => Some(items),
        _ => None,
    }
}

#[async_trait]
impl SnapshotProvider for HyperDashProvider {
    fn name(&self) -> &'static str {
        "hyperdash"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn try_fetch(&self, address: &str) -> Result<Option<Snapshot>> {
        let url = format!("{}/trader/{address}", self.base);
        let page = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()?
            .text()
            .await
            .context("failed to read hyperdash page")?;

        let Some(items) = embedded_positions(&page) else {
            return Ok(None);
        };

        let mut snap = Snapshot::empty(address, self.name());
        for item in &items {
            let size = lossy_f64(item.get("notional"));
            if size < self.min_position_usd {
                continue;
            }
            let Some(symbol) = first_str(item, &["symbol", "market"]) else {
                continue;
            };
            let side = match item.get("isLong").and_then(Value::as_bool) {
                Some(true) => Side::Long,
                _ => Side::Short,
            };
            snap.positions.push(Position::new(symbol, side, size));
        }

        if snap.positions.is_empty() {
            return Ok(None);
        }
        snap.usd_total = snap.position_sum();
        Ok(Some(snap))
    }
}
