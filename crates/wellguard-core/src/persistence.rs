//! State persistence bridge.
//!
//! The ledger is flattened into five independent keys so that losing or
//! corrupting one of them never takes the others down with it:
//!
//! | key             | value                                  |
//! |-----------------|----------------------------------------|
//! | `usage`         | `{ package: seconds }`                 |
//! | `limits`        | `{ package: seconds }`                 |
//! | `blocked`       | `[package]`                            |
//! | `shown_welcome` | `[package]`                            |
//! | `milestones`    | `{ package: [30, 70, 100] }`           |
//!
//! Every value is a JSON document. `limits` is authoritative: a package
//! without a limit is not restored, whatever the other keys say.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, StorageError};
use crate::ledger::{AppState, Ledger, Milestone, MilestoneSet, MonitoredApp};

pub mod keys {
    pub const USAGE: &str = "usage";
    pub const LIMITS: &str = "limits";
    pub const BLOCKED: &str = "blocked";
    pub const SHOWN_WELCOME: &str = "shown_welcome";
    pub const MILESTONES: &str = "milestones";

    pub const ALL: [&str; 5] = [USAGE, LIMITS, BLOCKED, SHOWN_WELCOME, MILESTONES];
}

/// Encoded ledger state, one JSON document per key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    values: BTreeMap<String, String>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        serde_json::from_slice(bytes).map_err(|e| StorageError::MalformedSnapshot(e.to_string()))
    }
}

fn encode<T: Serialize>(value: &T) -> String {
    // Maps and sets of strings and integers always serialize.
    serde_json::to_string(value).unwrap_or_default()
}

/// Flatten the ledger into its persisted layout.
pub fn snapshot(ledger: &Ledger) -> Snapshot {
    let mut usage = BTreeMap::new();
    let mut limits = BTreeMap::new();
    let mut blocked = BTreeSet::new();
    let mut shown_welcome = BTreeSet::new();
    let mut milestones = BTreeMap::new();

    for app in ledger.apps() {
        usage.insert(app.package_id.as_str(), app.usage_seconds);
        limits.insert(app.package_id.as_str(), app.limit_seconds);
        if app.is_blocked() {
            blocked.insert(app.package_id.as_str());
        }
        if app.welcome_shown {
            shown_welcome.insert(app.package_id.as_str());
        }
        if !app.milestones_fired.is_empty() {
            milestones.insert(app.package_id.as_str(), &app.milestones_fired);
        }
    }

    let mut snap = Snapshot::new();
    snap.set(keys::USAGE, encode(&usage));
    snap.set(keys::LIMITS, encode(&limits));
    snap.set(keys::BLOCKED, encode(&blocked));
    snap.set(keys::SHOWN_WELCOME, encode(&shown_welcome));
    snap.set(keys::MILESTONES, encode(&milestones));
    snap
}

fn read_key<T: DeserializeOwned + Default>(snapshot: &Snapshot, key: &str) -> T {
    let Some(raw) = snapshot.get(key) else {
        debug!(key, "no persisted value, starting empty");
        return T::default();
    };
    match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!(key, error = %e, "discarding corrupt persisted value");
            T::default()
        }
    }
}

/// Rebuild a ledger. Never fails: each key falls back to empty on its own.
pub fn restore(snapshot: &Snapshot) -> Ledger {
    let usage: BTreeMap<String, u64> = read_key(snapshot, keys::USAGE);
    let limits: BTreeMap<String, u64> = read_key(snapshot, keys::LIMITS);
    let blocked: BTreeSet<String> = read_key(snapshot, keys::BLOCKED);
    let shown_welcome: BTreeSet<String> = read_key(snapshot, keys::SHOWN_WELCOME);
    let milestones: BTreeMap<String, Vec<u64>> = read_key(snapshot, keys::MILESTONES);

    let apps = limits
        .into_iter()
        .filter(|(_, limit)| *limit > 0)
        .map(|(package_id, limit_seconds)| {
            let mut usage_seconds = usage.get(&package_id).copied().unwrap_or(0);
            if blocked.contains(&package_id) {
                usage_seconds = usage_seconds.max(limit_seconds);
            }

            let mut milestones_fired: MilestoneSet = milestones
                .get(&package_id)
                .into_iter()
                .flatten()
                .filter_map(|v| u8::try_from(*v).ok().and_then(Milestone::from_percent))
                .collect();

            let state = if usage_seconds >= limit_seconds {
                for m in Milestone::ALL {
                    milestones_fired.insert(m);
                }
                AppState::Blocked
            } else {
                AppState::Tracking
            };

            MonitoredApp {
                welcome_shown: shown_welcome.contains(&package_id),
                package_id,
                limit_seconds,
                usage_seconds,
                state,
                milestones_fired,
            }
        });

    let ledger = Ledger::from_apps(apps);
    debug!(
        tracked = ledger.len(),
        blocked = ledger.blocked_packages().len(),
        "ledger restored"
    );
    ledger
}

/// Restore from raw bytes, treating unreadable bytes as an empty ledger.
pub fn restore_bytes(bytes: &[u8]) -> Ledger {
    match Snapshot::from_bytes(bytes) {
        Ok(snap) => restore(&snap),
        Err(e) => {
            warn!(error = %e, "persisted snapshot unreadable, starting empty");
            Ledger::new()
        }
    }
}

/// Key-value backend for snapshots.
pub trait StateStore: Send {
    fn load(&self, key: &str) -> Result<Option<String>>;

    /// Write every key of the snapshot.
    fn save(&self, snapshot: &Snapshot) -> Result<()>;

    /// Read all known keys. A key that fails to load is left out and
    /// restores as empty.
    fn load_snapshot(&self) -> Snapshot {
        let mut snap = Snapshot::new();
        for key in keys::ALL {
            match self.load(key) {
                Ok(Some(value)) => snap.set(key, value),
                Ok(None) => {}
                Err(e) => warn!(key, error = %e, "failed to load persisted key"),
            }
        }
        snap
    }
}

/// In-process store used by tests and replays.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        match self.values.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Overwrite one key with arbitrary text.
    #[cfg(test)]
    pub(crate) fn put_raw(&self, key: &str, value: &str) {
        self.values().insert(key.to_string(), value.to_string());
    }

    pub fn len(&self) -> usize {
        self.values().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values().is_empty()
    }
}

impl StateStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values().get(key).cloned())
    }

    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let mut values = self.values();
        for (k, v) in snapshot.iter() {
            values.insert(k.to_string(), v.to_string());
        }
        Ok(())
    }
}

impl<S: StateStore + Sync> StateStore for std::sync::Arc<S> {
    fn load(&self, key: &str) -> Result<Option<String>> {
        (**self).load(key)
    }

    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        (**self).save(snapshot)
    }
}
