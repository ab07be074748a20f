use std::fmt::{self, Display, Write};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::Snapshot;

/// One outbound message as emitted by the console notifier.
#[derive(Debug, Serialize)]
pub struct SignalRecord<'a> {
    pub timestamp: String,
    pub recipient: &'a str,
    pub text: &'a str,
}

/// Wrap one event (or alert) in the standard signal envelope.
pub fn format_signal(address: &str, body: &impl Display, at: DateTime<Utc>) -> String {
    format!(
        "⚡ Signal — `{address}`\n{body}\n⏱ {}",
        at.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

/// Emit a signal record as a single JSON line to stdout.
pub fn report_signal(record: &SignalRecord<'_>) {
    if let Ok(json) = serde_json::to_string(record) {
        println!("{json}");
    }
}

/// Multi-line human summary of a snapshot, used for on-demand lookups.
pub fn format_snapshot(snap: &Snapshot) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = write_snapshot(&mut out, snap);
    out
}

fn write_snapshot(out: &mut String, snap: &Snapshot) -> fmt::Result {
    writeln!(out, "Address: {}", snap.address)?;
    writeln!(out, "Source: {}", snap.source)?;
    writeln!(out, "Total: ${:.2}", snap.usd_total)?;
    if snap.tokens.is_empty() {
        writeln!(out, "Tokens: none")?;
    } else {
        writeln!(out, "Tokens:")?;
        for (symbol, usd) in &snap.tokens {
            writeln!(out, "  {symbol}: ${usd:.2}")?;
        }
    }
    if snap.positions.is_empty() {
        write!(out, "Positions: none")?;
    } else {
        write!(out, "Positions:")?;
        for p in &snap.positions {
            write!(out, "\n  {} {} ${:.0}", p.symbol, p.side, p.size_usd)?;
        }
    }
    Ok(())
}
