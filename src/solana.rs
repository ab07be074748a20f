//! On-chain trade detection for Solana wallets via JSON-RPC.
//!
//! Independent of the snapshot pipeline: each cycle looks at the newest
//! transaction signature for an address and, when it changed, classifies that
//! transaction into trade or whale alerts.

use std::collections::{BTreeMap, HashMap};

use anyhow::{Context, Result, bail};
use serde_json::{Value, json};
use tracing::debug;

use crate::config::SolanaConfig;
use crate::types::{TradeAction, TradeAlert, short_id};

const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

/// Minimal Solana JSON-RPC client.
pub struct SolanaRpc {
    client: reqwest::Client,
    url: String,
}

impl SolanaRpc {
    pub fn new(client: reqwest::Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let body: Value = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("{method} request failed"))?
            .error_for_status()?
            .json()
            .await
            .with_context(|| format!("invalid {method} response"))?;

        if let Some(err) = body.get("error") {
            bail!("{method} RPC error: {err}");
        }
        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Newest transaction signature touching `address`.
    pub async fn latest_signature(&self, address: &str, limit: u32) -> Result<Option<String>> {
        let result = self
            .call("getSignaturesForAddress", json!([address, {"limit": limit}]))
            .await?;
        Ok(result
            .as_array()
            .and_then(|sigs| sigs.first())
            .and_then(|s| s.get("signature"))
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    /// Parsed transaction, or `None` if the node does not have it.
    pub async fn transaction(&self, signature: &str) -> Result<Option<Value>> {
        let result = self
            .call(
                "getTransaction",
                json!([signature, {"encoding": "jsonParsed", "maxSupportedTransactionVersion": 0}]),
            )
            .await?;
        Ok((!result.is_null()).then_some(result))
    }
}

/// Tracks the last seen signature per address and turns new transactions into alerts.
pub struct TradeMonitor {
    rpc: SolanaRpc,
    min_sol: f64,
    whale_sol: f64,
    signature_limit: u32,
    alert_on_first_seen: bool,
    last_seen: HashMap<String, String>,
}

impl TradeMonitor {
    pub fn new(config: &SolanaConfig, client: reqwest::Client) -> Self {
        Self {
            rpc: SolanaRpc::new(client, &config.rpc_url),
            min_sol: config.min_sol,
            whale_sol: config.whale_sol,
            signature_limit: config.signature_limit,
            alert_on_first_seen: config.alert_on_first_seen,
            last_seen: HashMap::new(),
        }
    }

    /// EVM-style addresses are never valid Solana accounts.
    pub fn watches(address: &str) -> bool {
        !address.starts_with("0x")
    }

    /// Forget baselines for addresses no longer being watched.
    pub fn retain(&mut self, addresses: &[String]) {
        self.last_seen.retain(|addr, _| addresses.contains(addr));
    }

    /// Alerts for the newest transaction of `address`, if it has not been seen yet.
    pub async fn check(&mut self, address: &str) -> Result<Vec<TradeAlert>> {
        let short = short_id(address);
        let Some(signature) = self
            .rpc
            .latest_signature(address, self.signature_limit)
            .await?
        else {
            return Ok(Vec::new());
        };

        match self.last_seen.get(address) {
            Some(prev) if *prev == signature => return Ok(Vec::new()),
            None if !self.alert_on_first_seen => {
                debug!("[{short}] solana baseline signature recorded");
                self.last_seen.insert(address.to_string(), signature);
                return Ok(Vec::new());
            }
            _ => {}
        }

        // The signature is only marked seen once its transaction was read, so
        // a failed or pending lookup is retried next cycle.
        let Some(tx) = self.rpc.transaction(&signature).await? else {
            debug!("[{short}] transaction {signature} not available yet");
            return Ok(Vec::new());
        };
        self.last_seen.insert(address.to_string(), signature.clone());
        Ok(classify_transaction(
            &tx,
            address,
            &signature,
            self.min_sol,
            self.whale_sol,
        ))
    }
}

/// Token balances per mint for the wallet's accounts in one balance list.
fn token_balances(list: Option<&Value>, owner: &str) -> BTreeMap<String, f64> {
    let mut balances = BTreeMap::new();
    for entry in list.and_then(Value::as_array).into_iter().flatten() {
        if let Some(entry_owner) = entry.get("owner").and_then(Value::as_str) {
            if entry_owner != owner {
                continue;
            }
        }
        let Some(mint) = entry.get("mint").and_then(Value::as_str) else {
            continue;
        };
        let amount = entry
            .get("uiTokenAmount")
            .and_then(|a| a.get("uiAmount"))
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        *balances.entry(mint.to_string()).or_insert(0.0) += amount;
    }
    balances
}

/// Classify one parsed transaction from the point of view of `owner`.
///
/// The fee payer's SOL balance (account 0) decides direction: SOL out with a token
/// in is a buy, SOL in with a token out is a sell. A large SOL movement with no
/// matching token leg is reported as a whale transfer when SOL left the wallet.
pub fn classify_transaction(
    tx: &Value,
    owner: &str,
    signature: &str,
    min_sol: f64,
    whale_sol: f64,
) -> Vec<TradeAlert> {
    let Some(meta) = tx.get("meta").filter(|m| m.is_object()) else {
        return Vec::new();
    };
    let lamports = |key: &str| {
        meta.get(key)
            .and_then(Value::as_array)
            .and_then(|b| b.first())
            .and_then(Value::as_f64)
    };
    let (Some(pre), Some(post)) = (lamports("preBalances"), lamports("postBalances")) else {
        return Vec::new();
    };

    // Positive when SOL left the wallet.
    let sol_spent = (pre - post) / LAMPORTS_PER_SOL;
    if sol_spent.abs() < min_sol {
        return Vec::new();
    }

    let pre_tokens = token_balances(meta.get("preTokenBalances"), owner);
    let post_tokens = token_balances(meta.get("postTokenBalances"), owner);

    let mut mints: Vec<&String> = pre_tokens.keys().chain(post_tokens.keys()).collect();
    mints.sort();
    mints.dedup();

    let mut alerts = Vec::new();
    for mint in mints {
        let before = pre_tokens.get(mint).copied().unwrap_or(0.0);
        let after = post_tokens.get(mint).copied().unwrap_or(0.0);
        let delta = after - before;

        let action = if sol_spent > 0.0 && delta > 0.0 {
            TradeAction::Buy
        } else if sol_spent < 0.0 && delta < 0.0 {
            TradeAction::Sell
        } else {
            continue;
        };
        alerts.push(TradeAlert::Trade {
            action,
            mint: mint.clone(),
            token_amount: delta.abs(),
            sol_change: sol_spent,
            signature: signature.to_string(),
        });
    }

    if alerts.is_empty() && sol_spent >= whale_sol {
        alerts.push(TradeAlert::Whale {
            sol_change: sol_spent,
            signature: signature.to_string(),
        });
    }
    alerts
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const OWNER: &str = "Wa11etOwner1111111111111111111111111111111";

    fn token(mint: &str, owner: &str, amount: f64) -> Value {
        json!({"mint": mint, "owner": owner, "uiTokenAmount": {"uiAmount": amount}})
    }

    fn tx(pre: u64, post: u64, pre_tokens: Vec<Value>, post_tokens: Vec<Value>) -> Value {
        json!({"meta": {
            "preBalances": [pre, 5],
            "postBalances": [post, 5],
            "preTokenBalances": pre_tokens,
            "postTokenBalances": post_tokens
        }})
    }

    // ── classification ─────────────────────────────────────────────

    #[test]
    fn sol_out_token_in_is_buy() {
        let t = tx(
            10_000_000_000,
            7_000_000_000,
            vec![],
            vec![token("MintA", OWNER, 1500.0)],
        );
        let alerts = classify_transaction(&t, OWNER, "sig", 1.0, 50.0);
        assert_eq!(
            alerts,
            vec![TradeAlert::Trade {
                action: TradeAction::Buy,
                mint: "MintA".into(),
                token_amount: 1500.0,
                sol_change: 3.0,
                signature: "sig".into(),
            }]
        );
    }

    #[test]
    fn sol_in_token_out_is_sell() {
        let t = tx(
            1_000_000_000,
            4_000_000_000,
            vec![token("MintA", OWNER, 800.0)],
            vec![],
        );
        let alerts = classify_transaction(&t, OWNER, "sig", 1.0, 50.0);
        assert!(matches!(
            &alerts[..],
            [TradeAlert::Trade { action: TradeAction::Sell, token_amount, .. }] if *token_amount == 800.0
        ));
    }

    #[test]
    fn other_owners_are_ignored() {
        let t = tx(
            10_000_000_000,
            7_000_000_000,
            vec![token("MintA", "PoolVault", 9000.0)],
            vec![token("MintA", "PoolVault", 7500.0)],
        );
        assert!(classify_transaction(&t, OWNER, "sig", 1.0, 50.0).is_empty());
    }

    #[test]
    fn small_sol_change_is_ignored() {
        let t = tx(
            1_500_000_000,
            1_000_000_000,
            vec![],
            vec![token("MintA", OWNER, 10.0)],
        );
        assert!(classify_transaction(&t, OWNER, "sig", 1.0, 50.0).is_empty());
    }

    #[test]
    fn large_plain_transfer_is_whale() {
        let t = tx(100_000_000_000, 20_000_000_000, vec![], vec![]);
        assert_eq!(
            classify_transaction(&t, OWNER, "sig", 1.0, 50.0),
            vec![TradeAlert::Whale {
                sol_change: 80.0,
                signature: "sig".into()
            }]
        );
    }

    #[test]
    fn large_incoming_transfer_is_not_whale() {
        let t = tx(20_000_000_000, 100_000_000_000, vec![], vec![]);
        assert!(classify_transaction(&t, OWNER, "sig", 1.0, 50.0).is_empty());
    }

    #[test]
    fn missing_meta_is_ignored() {
        assert!(classify_transaction(&json!({"meta": null}), OWNER, "s", 0.0, 0.0).is_empty());
        assert!(classify_transaction(&json!({}), OWNER, "s", 0.0, 0.0).is_empty());
    }

    // ── monitor ────────────────────────────────────────────────────

    async fn mount_rpc(server: &MockServer, signature: &str, transaction: Value) {
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "getSignaturesForAddress"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "result": [{"signature": signature}, {"signature": "older"}]
            })))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "getTransaction"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1, "result": transaction
            })))
            .mount(server)
            .await;
    }

    fn monitor(server: &MockServer, alert_on_first_seen: bool) -> TradeMonitor {
        let config = SolanaConfig {
            enabled: true,
            rpc_url: server.uri(),
            alert_on_first_seen,
            ..SolanaConfig::default()
        };
        TradeMonitor::new(&config, reqwest::Client::new())
    }

    #[tokio::test]
    async fn first_seen_records_baseline_only() {
        let server = MockServer::start().await;
        mount_rpc(&server, "sig1", tx(100_000_000_000, 10_000_000_000, vec![], vec![])).await;
        let mut m = monitor(&server, false);
        assert!(m.check(OWNER).await.unwrap().is_empty());
        // Same signature again: still nothing.
        assert!(m.check(OWNER).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn alerts_once_per_signature() {
        let server = MockServer::start().await;
        mount_rpc(&server, "sig1", tx(100_000_000_000, 10_000_000_000, vec![], vec![])).await;
        let mut m = monitor(&server, true);
        let alerts = m.check(OWNER).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert!(matches!(alerts[0], TradeAlert::Whale { .. }));
        assert!(m.check(OWNER).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_transaction_lookup_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "getSignaturesForAddress"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1, "result": [{"signature": "sig1"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "getTransaction"})))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "getTransaction"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "result": tx(100_000_000_000, 10_000_000_000, vec![], vec![])
            })))
            .mount(&server)
            .await;

        let mut m = monitor(&server, true);
        assert!(m.check(OWNER).await.is_err());
        let alerts = m.check(OWNER).await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert!(matches!(alerts[0], TradeAlert::Whale { .. }));
        assert!(m.check(OWNER).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pending_transaction_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "getSignaturesForAddress"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1, "result": [{"signature": "sig1"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "getTransaction"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1, "result": null
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "getTransaction"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "result": tx(100_000_000_000, 10_000_000_000, vec![], vec![])
            })))
            .mount(&server)
            .await;

        let mut m = monitor(&server, true);
        assert!(m.check(OWNER).await.unwrap().is_empty());
        assert_eq!(m.check(OWNER).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn retain_drops_unwatched_baselines() {
        let server = MockServer::start().await;
        mount_rpc(&server, "sig1", tx(100_000_000_000, 10_000_000_000, vec![], vec![])).await;
        let mut m = monitor(&server, false);
        m.check(OWNER).await.unwrap();
        m.check("OtherWa11et").await.unwrap();
        assert_eq!(m.last_seen.len(), 2);

        m.retain(&["OtherWa11et".to_string()]);
        assert_eq!(m.last_seen.len(), 1);
        assert!(m.last_seen.contains_key("OtherWa11et"));
    }

    #[tokio::test]
    async fn rpc_error_is_err() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0", "id": 1,
                "error": {"code": -32602, "message": "Invalid param: WrongSize"}
            })))
            .mount(&server)
            .await;
        assert!(monitor(&server, true).check("0xnotsolana").await.is_err());
    }

    #[test]
    fn watches_only_non_evm() {
        assert!(TradeMonitor::watches(OWNER));
        assert!(!TradeMonitor::watches("0xabc"));
    }
}
