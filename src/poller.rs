use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use futures_util::FutureExt;
use tracing::{debug, error, info, warn};

use crate::diff::{DiffThresholds, diff_snapshots};
use crate::notifier::{Notifier, broadcast};
use crate::reporter::format_signal;
use crate::resolver::Resolver;
use crate::solana::TradeMonitor;
use crate::store::{ListFile, StateStore};
use crate::types::{WalletState, canonical_address, short_id};

/// What happened to one address in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletOutcome {
    /// No provider had data; state was left untouched.
    NoData,
    /// State was updated; this many events were derived.
    Updated { events: usize },
}

/// Where each cycle gets its notification recipients from.
#[derive(Debug, Clone)]
pub enum Recipients {
    /// Re-read from the subscriber list before every cycle.
    Subscribers(ListFile),
    /// A fixed set, such as the console sink of a dry run.
    Fixed(Vec<String>),
}

impl Recipients {
    fn current(&self) -> Vec<String> {
        match self {
            Recipients::Subscribers(list) => read_list(list, "subscriber list"),
            Recipients::Fixed(ids) => ids.clone(),
        }
    }
}

/// Per-cycle totals, logged after every cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub wallets: usize,
    pub updated: usize,
    pub no_data: usize,
    pub failed: usize,
    pub events: usize,
}

/// Drives resolve → diff → persist → notify for every watched address.
///
/// Addresses are processed one at a time and cycles never overlap, so the store
/// sees exactly one writer per address.
pub struct Poller {
    resolver: Resolver,
    store: Arc<dyn StateStore>,
    notifier: Arc<dyn Notifier>,
    thresholds: DiffThresholds,
    trade_monitor: Option<TradeMonitor>,
}

impl Poller {
    pub fn new(
        resolver: Resolver,
        store: Arc<dyn StateStore>,
        notifier: Arc<dyn Notifier>,
        thresholds: DiffThresholds,
    ) -> Self {
        Self {
            resolver,
            store,
            notifier,
            thresholds,
            trade_monitor: None,
        }
    }

    /// Also check non-EVM addresses for on-chain Solana trades each cycle.
    pub fn with_trade_monitor(mut self, monitor: TradeMonitor) -> Self {
        self.trade_monitor = Some(monitor);
        self
    }

    /// Process one address.
    ///
    /// Events are only delivered after the new state has been written, so a
    /// failed write never produces notifications that the next diff would not
    /// agree with.
    pub async fn process_wallet(&self, address: &str, recipients: &[String]) -> Result<WalletOutcome> {
        let key = canonical_address(address);
        let short = short_id(&key);

        let Some(snapshot) = self.resolver.resolve(&key).await else {
            return Ok(WalletOutcome::NoData);
        };

        let previous = self
            .store
            .load(&key)
            .with_context(|| format!("failed to load state for {key}"))?;
        let events = diff_snapshots(&previous, &snapshot, &self.thresholds);

        if let Err(e) = self.store.save(&key, &WalletState::from(&snapshot)) {
            error!("[{short}] failed to persist state, dropping {} event(s): {e:#}", events.len());
            return Err(e);
        }

        debug!(
            "[{short}] {} from {} (${:.2}), {} event(s)",
            if previous.updated_at.is_some() { "updated" } else { "first snapshot" },
            snapshot.source,
            snapshot.usd_total,
            events.len()
        );

        let now = Utc::now();
        for event in &events {
            info!("[{short}] {event}");
            let text = format_signal(&key, event, now);
            broadcast(self.notifier.as_ref(), recipients, &text).await;
        }

        Ok(WalletOutcome::Updated {
            events: events.len(),
        })
    }

    /// Run the on-chain check for one address; failures only affect that address.
    async fn check_trades(&mut self, address: &str, recipients: &[String]) {
        let Some(monitor) = self.trade_monitor.as_mut() else {
            return;
        };
        if !TradeMonitor::watches(address) {
            return;
        }
        let short = short_id(address);
        match monitor.check(address).await {
            Ok(alerts) => {
                let now = Utc::now();
                for alert in &alerts {
                    info!("[{short}] {alert}");
                    let text = format_signal(address, alert, now);
                    broadcast(self.notifier.as_ref(), recipients, &text).await;
                }
            }
            Err(e) => debug!("[{short}] solana check failed: {e:#}"),
        }
    }

    /// One pass over `addresses`. Never fails: every per-address error, including
    /// a panic, is logged and the cycle moves on.
    pub async fn run_cycle(&mut self, addresses: &[String], recipients: &[String]) -> CycleSummary {
        let mut summary = CycleSummary {
            wallets: addresses.len(),
            ..CycleSummary::default()
        };
        if let Some(monitor) = self.trade_monitor.as_mut() {
            monitor.retain(addresses);
        }

        for address in addresses {
            let short = short_id(address);
            let outcome = AssertUnwindSafe(self.process_wallet(address, recipients))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(WalletOutcome::NoData)) => {
                    debug!("[{short}] no data this cycle");
                    summary.no_data += 1;
                }
                Ok(Ok(WalletOutcome::Updated { events })) => {
                    summary.updated += 1;
                    summary.events += events;
                }
                Ok(Err(e)) => {
                    warn!("[{short}] poll error: {e:#}");
                    summary.failed += 1;
                }
                Err(_) => {
                    error!("[{short}] processing panicked, skipping address this cycle");
                    summary.failed += 1;
                }
            }

            self.check_trades(address, recipients).await;
        }

        summary
    }

    /// Poll forever until `shutdown` resolves.
    ///
    /// The watch-list and recipients are re-read before every cycle. A cycle
    /// interrupted by shutdown leaves state consistent because each address is
    /// persisted atomically before its events are sent.
    pub async fn run(
        &mut self,
        watchlist: &ListFile,
        recipients: &Recipients,
        interval: Duration,
        shutdown: impl Future<Output = ()>,
    ) {
        info!(
            "Poller started (interval: {}s, providers: {})",
            interval.as_secs(),
            self.resolver.provider_names().join(" → ")
        );
        tokio::pin!(shutdown);

        loop {
            let addresses = read_list(watchlist, "watch-list");
            let recipients = recipients.current();

            if addresses.is_empty() {
                debug!("Watch-list is empty");
            } else {
                tokio::select! {
                    _ = &mut shutdown => break,
                    summary = self.run_cycle(&addresses, &recipients) => {
                        info!(
                            "Cycle complete: {} wallet(s), {} updated, {} without data, {} failed, {} event(s) → {} subscriber(s)",
                            summary.wallets,
                            summary.updated,
                            summary.no_data,
                            summary.failed,
                            summary.events,
                            recipients.len(),
                        );
                    }
                }
            }

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("Poller stopped");
    }
}

fn read_list(list: &ListFile, what: &str) -> Vec<String> {
    match list.entries() {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Failed to read {what} {}: {e:#}", list.path().display());
            Vec::new()
        }
    }
}
