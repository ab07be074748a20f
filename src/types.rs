use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical form of a watched address.
///
/// EVM hex addresses (`0x…`) are case-insensitive and are lower-cased. Other
/// addresses, such as base58 Solana keys, are case-sensitive and are only trimmed.
pub fn canonical_address(raw: &str) -> String {
    let trimmed = raw.trim();
    let is_hex = trimmed.len() > 2
        && trimmed
            .get(..2)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("0x"));
    if is_hex {
        trimmed.to_lowercase()
    } else {
        trimmed.to_string()
    }
}

/// Last six characters of an address, used as a log prefix.
pub fn short_id(address: &str) -> &str {
    let start = address
        .char_indices()
        .rev()
        .nth(5)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &address[start..]
}

/// Direction of a leveraged position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
    #[serde(alias = "")]
    Unknown,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => f.write_str("long"),
            Side::Short => f.write_str("short"),
            Side::Unknown => f.write_str("unknown"),
        }
    }
}

/// An open leveraged/derivative exposure. Identity is `(symbol, side)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: Side,
    #[serde(default)]
    pub size_usd: f64,
}

impl Position {
    pub fn new(symbol: impl Into<String>, side: Side, size_usd: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            size_usd,
        }
    }

    pub fn key(&self) -> (&str, Side) {
        (self.symbol.as_str(), self.side)
    }
}

/// A provider's point-in-time view of one address.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub address: String,
    pub usd_total: f64,
    /// Symbol → USD magnitude.
    ///
    /// The magnitude is source-dependent: balance providers report the USD value
    /// held, DEX search providers report pooled liquidity depth for the symbol.
    /// Both are diffed identically.
    pub tokens: BTreeMap<String, f64>,
    pub positions: Vec<Position>,
    /// Provider that produced the snapshot. Diagnostic only.
    pub source: String,
    pub updated_at: DateTime<Utc>,
}

impl Snapshot {
    /// An empty snapshot for `address` attributed to `source`.
    pub fn empty(address: &str, source: &str) -> Self {
        Self {
            address: address.to_string(),
            usd_total: 0.0,
            tokens: BTreeMap::new(),
            positions: Vec::new(),
            source: source.to_string(),
            updated_at: Utc::now(),
        }
    }

    /// Add `usd` to the magnitude of `symbol`, creating the entry if needed.
    pub fn add_token(&mut self, symbol: &str, usd: f64) {
        *self.tokens.entry(symbol.to_string()).or_insert(0.0) += usd;
    }

    /// Sum of all token magnitudes.
    pub fn token_sum(&self) -> f64 {
        self.tokens.values().sum()
    }

    /// Sum of all position sizes.
    pub fn position_sum(&self) -> f64 {
        self.positions.iter().map(|p| p.size_usd).sum()
    }

    /// Enforce the invariants the diff engine relies on.
    pub fn normalized(mut self) -> Self {
        self.address = canonical_address(&self.address);
        if !self.usd_total.is_finite() || self.usd_total < 0.0 {
            self.usd_total = 0.0;
        }
        self.tokens.retain(|_, v| v.is_finite());
        self.positions.retain(|p| p.size_usd.is_finite());
        for p in &mut self.positions {
            p.size_usd = p.size_usd.abs();
        }
        self
    }
}

/// The persisted diff baseline for one address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WalletState {
    #[serde(default)]
    pub tokens: BTreeMap<String, f64>,
    #[serde(default)]
    pub positions: Vec<Position>,
    #[serde(default)]
    pub usd_total: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&Snapshot> for WalletState {
    fn from(snap: &Snapshot) -> Self {
        Self {
            tokens: snap.tokens.clone(),
            positions: snap.positions.clone(),
            usd_total: snap.usd_total,
            updated_at: Some(snap.updated_at),
        }
    }
}

/// A discrete change derived by comparing two snapshots of one address.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WalletEvent {
    NewToken { symbol: String, usd: f64 },
    Buy { symbol: String, from: f64, to: f64 },
    Sell { symbol: String, from: f64, to: f64 },
    BalanceChanged { from: f64, to: f64 },
    PositionOpened { symbol: String, side: Side, size_usd: f64 },
    PositionIncreased { symbol: String, side: Side, from: f64, to: f64 },
    PositionClosed { symbol: String, side: Side, size_usd: f64 },
}

impl fmt::Display for WalletEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalletEvent::NewToken { symbol, usd } => {
                write!(f, "📥 New token: {symbol} → ${usd:.2}")
            }
            WalletEvent::Buy { symbol, from, to } => {
                write!(f, "🟢 BUY {symbol}: ${from:.2} → ${to:.2}")
            }
            WalletEvent::Sell { symbol, from, to } => {
                write!(f, "🔴 SELL {symbol}: ${from:.2} → ${to:.2}")
            }
            WalletEvent::BalanceChanged { from, to } => {
                write!(f, "ℹ️ Balance: ${from:.2} → ${to:.2}")
            }
            WalletEvent::PositionOpened {
                symbol,
                side,
                size_usd,
            } => write!(f, "⚡ OPEN {symbol} {side} ${size_usd:.0}"),
            WalletEvent::PositionIncreased {
                symbol,
                side,
                from,
                to,
            } => write!(f, "⚡ INCREASE {symbol} {side} ${from:.0} → ${to:.0}"),
            WalletEvent::PositionClosed {
                symbol,
                side,
                size_usd,
            } => write!(f, "⚡ CLOSE {symbol} {side} (${size_usd:.0})"),
        }
    }
}

/// Direction of an on-chain trade leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
}

/// An alert raised from a single on-chain transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TradeAlert {
    /// A token leg paired with an opposite SOL movement.
    Trade {
        action: TradeAction,
        mint: String,
        token_amount: f64,
        sol_change: f64,
        signature: String,
    },
    /// A large SOL movement with no qualifying token leg.
    Whale { sol_change: f64, signature: String },
}

impl fmt::Display for TradeAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeAlert::Trade {
                action,
                mint,
                token_amount,
                sol_change,
                signature,
            } => {
                let label = match action {
                    TradeAction::Buy => "🟢 BUY",
                    TradeAction::Sell => "🔴 SELL",
                };
                write!(
                    f,
                    "{label} Solana trade\nToken mint: {mint}\nToken amount: {token_amount:.2}\n\
                     SOL change: {:.2} SOL\nSolscan: https://solscan.io/tx/{signature}",
                    sol_change.abs()
                )
            }
            TradeAlert::Whale {
                sol_change,
                signature,
            } => write!(
                f,
                "🐋 Whale transfer: {:.2} SOL\nSolscan: https://solscan.io/tx/{signature}",
                sol_change.abs()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── addresses ──────────────────────────────────────────────────

    #[test]
    fn canonical_lowercases_hex() {
        assert_eq!(canonical_address("  0xABCdef01 "), "0xabcdef01");
        assert_eq!(canonical_address("0XABC"), "0xabc");
    }

    #[test]
    fn canonical_keeps_base58_case() {
        let sol = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU";
        assert_eq!(canonical_address(sol), sol);
    }

    #[test]
    fn short_id_takes_tail() {
        assert_eq!(short_id("0x1234567890"), "567890");
        assert_eq!(short_id("abc"), "abc");
    }

    // ── normalization ──────────────────────────────────────────────

    #[test]
    fn normalized_clamps_total_and_drops_nan() {
        let mut snap = Snapshot::empty("0xABC", "test");
        snap.usd_total = -3.0;
        snap.add_token("BTC", f64::NAN);
        snap.add_token("ETH", 5.0);
        snap.positions.push(Position::new("AAA", Side::Short, -40.0));
        snap.positions.push(Position::new("BBB", Side::Long, f64::INFINITY));
        let snap = snap.normalized();
        assert_eq!(snap.address, "0xabc");
        assert_eq!(snap.usd_total, 0.0);
        assert_eq!(snap.tokens.len(), 1);
        assert_eq!(snap.positions, vec![Position::new("AAA", Side::Short, 40.0)]);
    }

    #[test]
    fn add_token_accumulates() {
        let mut snap = Snapshot::empty("a", "test");
        snap.add_token("SOL", 10.0);
        snap.add_token("SOL", 2.5);
        assert_eq!(snap.tokens["SOL"], 12.5);
        assert_eq!(snap.token_sum(), 12.5);
    }

    // ── wallet state ───────────────────────────────────────────────

    #[test]
    fn state_reads_legacy_layout() {
        let raw = r#"{
            "updated_at": "2024-05-01T10:00:00+00:00",
            "usd_total": 120.5,
            "tokens": {"ETH": 100.0},
            "positions": [{"symbol": "BTC", "size_usd": 50.0, "side": ""}]
        }"#;
        let state: WalletState = serde_json::from_str(raw).expect("legacy state parses");
        assert_eq!(state.usd_total, 120.5);
        assert_eq!(state.positions[0].side, Side::Unknown);
        assert!(state.updated_at.is_some());
    }

    #[test]
    fn state_missing_fields_default() {
        let state: WalletState = serde_json::from_str("{}").expect("empty object parses");
        assert_eq!(state, WalletState::default());
    }

    #[test]
    fn state_from_snapshot_copies_fields() {
        let mut snap = Snapshot::empty("0xa", "debank");
        snap.add_token("ETH", 3.0);
        snap.usd_total = 3.0;
        let state = WalletState::from(&snap);
        assert_eq!(state.tokens, snap.tokens);
        assert_eq!(state.usd_total, 3.0);
        assert_eq!(state.updated_at, Some(snap.updated_at));
    }

    // ── rendering ──────────────────────────────────────────────────

    #[test]
    fn event_text() {
        let e = WalletEvent::NewToken {
            symbol: "ETH".into(),
            usd: 40.0,
        };
        assert_eq!(e.to_string(), "📥 New token: ETH → $40.00");
        let e = WalletEvent::Buy {
            symbol: "BTC".into(),
            from: 100.0,
            to: 250.0,
        };
        assert_eq!(e.to_string(), "🟢 BUY BTC: $100.00 → $250.00");
        let e = WalletEvent::BalanceChanged {
            from: 1000.0,
            to: 1010.0,
        };
        assert_eq!(e.to_string(), "ℹ️ Balance: $1000.00 → $1010.00");
        let e = WalletEvent::PositionClosed {
            symbol: "AAA".into(),
            side: Side::Long,
            size_usd: 500.0,
        };
        assert_eq!(e.to_string(), "⚡ CLOSE AAA long ($500)");
    }

    #[test]
    fn event_serializes_with_kind_tag() {
        let e = WalletEvent::PositionOpened {
            symbol: "AAA".into(),
            side: Side::Short,
            size_usd: 12.0,
        };
        let json = serde_json::to_value(&e).expect("serializes");
        assert_eq!(json["kind"], "position_opened");
        assert_eq!(json["side"], "short");
    }

    #[test]
    fn whale_alert_text() {
        let a = TradeAlert::Whale {
            sol_change: -75.5,
            signature: "sig1".into(),
        };
        assert_eq!(
            a.to_string(),
            "🐋 Whale transfer: 75.50 SOL\nSolscan: https://solscan.io/tx/sig1"
        );
    }
}
