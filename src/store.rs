use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::types::{WalletState, canonical_address};

/// Durable mapping from address to the last diffed state.
///
/// The poller is the only writer. On-demand lookups must not call `save`, or the
/// next scheduled cycle would diff against a baseline nobody was notified about.
pub trait StateStore: Send + Sync {
    /// Stored state for `address`, or an empty state if none exists yet.
    fn load(&self, address: &str) -> Result<WalletState>;

    /// Replace the stored state for `address`.
    fn save(&self, address: &str, state: &WalletState) -> Result<()>;

    /// Delete the stored state. Returns whether anything was removed.
    fn remove(&self, address: &str) -> Result<bool>;
}

/// Read a JSON file, returning `T::default()` when the file does not exist.
pub fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
        Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
    };
    serde_json::from_str(&contents).with_context(|| format!("failed to parse {}", path.display()))
}

/// Write JSON to a sibling temp file, then rename it over `path`.
///
/// A crash leaves either the old file or the new one, never a torn mix.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let contents = serde_json::to_string_pretty(value).context("failed to serialize JSON")?;
    let tmp = temp_path(path);
    std::fs::write(&tmp, contents).with_context(|| format!("failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("failed to move {} into place", path.display()))?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// All wallet states kept in one JSON object keyed by address.
///
/// Every operation re-reads the file, so a removal made by another process
/// (the CLI while the poller runs) is not written back by a later save. The
/// in-memory copy only reflects the last read or write.
pub struct JsonStateStore {
    path: PathBuf,
    states: Mutex<BTreeMap<String, WalletState>>,
}

impl JsonStateStore {
    /// Open the store, loading any existing file.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let states: BTreeMap<String, WalletState> = read_json_or_default(&path)?;
        debug!("Loaded {} wallet state(s) from {}", states.len(), path.display());
        Ok(Self {
            path,
            states: Mutex::new(states),
        })
    }

    pub fn len(&self) -> usize {
        self.states.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, WalletState>>> {
        self.states
            .lock()
            .map_err(|_| anyhow!("state store lock poisoned"))
    }
}

impl StateStore for JsonStateStore {
    fn load(&self, address: &str) -> Result<WalletState> {
        let mut states = self.lock()?;
        *states = read_json_or_default(&self.path)?;
        Ok(states
            .get(&canonical_address(address))
            .cloned()
            .unwrap_or_default())
    }

    fn save(&self, address: &str, state: &WalletState) -> Result<()> {
        let mut states = self.lock()?;
        let mut next: BTreeMap<String, WalletState> = read_json_or_default(&self.path)?;
        next.insert(canonical_address(address), state.clone());
        write_json_atomic(&self.path, &next)?;
        *states = next;
        Ok(())
    }

    fn remove(&self, address: &str) -> Result<bool> {
        let mut states = self.lock()?;
        let mut next: BTreeMap<String, WalletState> = read_json_or_default(&self.path)?;
        let removed = next.remove(&canonical_address(address)).is_some();
        if removed {
            write_json_atomic(&self.path, &next)?;
        }
        *states = next;
        Ok(removed)
    }
}

/// An ordered, duplicate-free list of strings persisted as a JSON array.
///
/// Backs both the watch-list and the subscriber list. The file is re-read on
/// every access so edits made by another process are picked up.
#[derive(Debug, Clone)]
pub struct ListFile {
    path: PathBuf,
}

impl ListFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current entries in insertion order.
    pub fn entries(&self) -> Result<Vec<String>> {
        let raw: Vec<serde_json::Value> = read_json_or_default(&self.path)?;
        let mut entries: Vec<String> = Vec::with_capacity(raw.len());
        for value in raw {
            // Older files store chat ids as numbers.
            let entry = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => n.to_string(),
                _ => continue,
            };
            if !entries.contains(&entry) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Append `entry` if absent. Returns whether the list changed.
    pub fn add(&self, entry: &str) -> Result<bool> {
        let mut entries = self.entries()?;
        if entries.iter().any(|e| e == entry) {
            return Ok(false);
        }
        entries.push(entry.to_string());
        write_json_atomic(&self.path, &entries)?;
        Ok(true)
    }

    /// Remove `entry` if present. Returns whether the list changed.
    pub fn remove(&self, entry: &str) -> Result<bool> {
        let mut entries = self.entries()?;
        let before = entries.len();
        entries.retain(|e| e != entry);
        if entries.len() == before {
            return Ok(false);
        }
        write_json_atomic(&self.path, &entries)?;
        Ok(true)
    }
}
