use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::types::{Side, Snapshot, WalletEvent, WalletState};

/// Thresholds controlling which changes are reported.
///
/// Upstream noise differs per provider, so every value is configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffThresholds {
    /// A first-seen token is reported only if its magnitude exceeds this.
    #[serde(default = "default_min_new_token")]
    pub min_new_token_usd: f64,
    /// Absolute floor below which a token delta is treated as noise.
    #[serde(default = "default_token_noise")]
    pub token_noise_usd: f64,
    /// Fraction of the larger magnitude below which a token delta is noise (0 disables).
    #[serde(default)]
    pub token_noise_relative: f64,
    /// Total-value changes at or below this are not reported.
    #[serde(default = "default_balance_change")]
    pub balance_change_usd: f64,
    /// Fraction of the previous total the change must also exceed (0 disables).
    #[serde(default)]
    pub balance_change_relative: f64,
    /// New positions smaller than this are not reported as opened.
    #[serde(default = "default_min_position")]
    pub min_position_usd: f64,
    /// A position is reported as increased when `new > old * growth_factor`.
    #[serde(default = "default_growth_factor")]
    pub growth_factor: f64,
}

fn default_min_new_token() -> f64 {
    10.0
}

fn default_token_noise() -> f64 {
    1.0
}

fn default_balance_change() -> f64 {
    5.0
}

fn default_min_position() -> f64 {
    10.0
}

fn default_growth_factor() -> f64 {
    1.05
}

impl Default for DiffThresholds {
    fn default() -> Self {
        Self {
            min_new_token_usd: default_min_new_token(),
            token_noise_usd: default_token_noise(),
            token_noise_relative: 0.0,
            balance_change_usd: default_balance_change(),
            balance_change_relative: 0.0,
            min_position_usd: default_min_position(),
            growth_factor: default_growth_factor(),
        }
    }
}

/// Derive the ordered list of events between a stored state and a fresh snapshot.
///
/// Stages run in a fixed order and all of them run: new tokens, token deltas,
/// total balance, then position lifecycle. Tokens iterate in symbol order and
/// positions in snapshot order, so identical inputs always produce identical output.
///
/// A first-seen token is reported twice: once as `NewToken` and once as a `Buy`
/// from zero.
pub fn diff_snapshots(
    previous: &WalletState,
    current: &Snapshot,
    thresholds: &DiffThresholds,
) -> Vec<WalletEvent> {
    debug_assert!(
        current.usd_total >= 0.0,
        "snapshot must be normalized before diffing"
    );

    let mut events = Vec::new();
    new_token_events(previous, current, thresholds, &mut events);
    token_delta_events(previous, current, thresholds, &mut events);
    balance_event(previous, current, thresholds, &mut events);
    position_events(previous, current, thresholds, &mut events);
    events
}

fn new_token_events(
    previous: &WalletState,
    current: &Snapshot,
    thresholds: &DiffThresholds,
    events: &mut Vec<WalletEvent>,
) {
    for (symbol, &usd) in &current.tokens {
        if !previous.tokens.contains_key(symbol) && usd > thresholds.min_new_token_usd {
            events.push(WalletEvent::NewToken {
                symbol: symbol.clone(),
                usd,
            });
        }
    }
}

fn token_delta_events(
    previous: &WalletState,
    current: &Snapshot,
    thresholds: &DiffThresholds,
    events: &mut Vec<WalletEvent>,
) {
    let symbols: BTreeSet<&String> = previous.tokens.keys().chain(current.tokens.keys()).collect();

    for symbol in symbols {
        let from = previous.tokens.get(symbol).copied().unwrap_or(0.0);
        let to = current.tokens.get(symbol).copied().unwrap_or(0.0);
        let delta = to - from;

        let noise = thresholds
            .token_noise_usd
            .max(thresholds.token_noise_relative * from.abs().max(to.abs()));
        if delta.abs() < noise {
            continue;
        }

        if delta > 0.0 {
            events.push(WalletEvent::Buy {
                symbol: symbol.clone(),
                from,
                to,
            });
        } else if delta < 0.0 {
            events.push(WalletEvent::Sell {
                symbol: symbol.clone(),
                from,
                to,
            });
        }
    }
}

fn balance_event(
    previous: &WalletState,
    current: &Snapshot,
    thresholds: &DiffThresholds,
    events: &mut Vec<WalletEvent>,
) {
    let from = previous.usd_total;
    let to = current.usd_total;
    let change = (to - from).abs();

    if change > thresholds.balance_change_usd
        && change > thresholds.balance_change_relative * from.abs()
    {
        events.push(WalletEvent::BalanceChanged { from, to });
    }
}

fn position_events(
    previous: &WalletState,
    current: &Snapshot,
    thresholds: &DiffThresholds,
    events: &mut Vec<WalletEvent>,
) {
    let prev_by_key: HashMap<(&str, Side), f64> = previous
        .positions
        .iter()
        .map(|p| (p.key(), p.size_usd))
        .collect();

    for pos in &current.positions {
        match prev_by_key.get(&pos.key()) {
            None => {
                if pos.size_usd >= thresholds.min_position_usd {
                    events.push(WalletEvent::PositionOpened {
                        symbol: pos.symbol.clone(),
                        side: pos.side,
                        size_usd: pos.size_usd,
                    });
                }
            }
            Some(&old) => {
                // Partial reductions are intentionally silent.
                if pos.size_usd > old * thresholds.growth_factor {
                    events.push(WalletEvent::PositionIncreased {
                        symbol: pos.symbol.clone(),
                        side: pos.side,
                        from: old,
                        to: pos.size_usd,
                    });
                }
            }
        }
    }

    let current_keys: BTreeSet<(&str, Side)> = current.positions.iter().map(|p| p.key()).collect();
    for prev in &previous.positions {
        if !current_keys.contains(&prev.key()) {
            events.push(WalletEvent::PositionClosed {
                symbol: prev.symbol.clone(),
                side: prev.side,
                size_usd: prev.size_usd,
            });
        }
    }
}
