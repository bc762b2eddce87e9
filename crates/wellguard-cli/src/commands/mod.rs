pub mod apps;
pub mod config;
pub mod replay;
pub mod run;

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::warn;
use wellguard_core::storage::data_dir;
use wellguard_core::{Config, Database, Event, LimitEntry, LogGateway, Monitor, SystemClock};

const RUN_LOCK: &str = "run.lock";

/// Marks the data directory as owned by a running `wellguard run`. The file
/// holds the owner's pid and is removed on drop.
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire() -> Result<Self, Box<dyn std::error::Error>> {
        let path = data_dir()?.join(RUN_LOCK);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(format!(
                    "a monitor is already running (remove {} if it is stale)",
                    path.display()
                )
                .into());
            }
            Err(e) => return Err(e.into()),
        };
        writeln!(file, "{}", std::process::id())?;
        Ok(Self { path })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(error = %e, path = %self.path.display(), "failed to remove run lock");
        }
    }
}

/// Refuse to change persisted state underneath a running monitor, whose next
/// snapshot would overwrite it.
pub fn ensure_not_running() -> Result<(), Box<dyn std::error::Error>> {
    let path = data_dir()?.join(RUN_LOCK);
    if path.exists() {
        return Err(format!(
            "a monitor is running; send `configure` or `unblock` lines to its stdin \
             instead (remove {} if it is stale)",
            path.display()
        )
        .into());
    }
    Ok(())
}

/// Monitor over the on-disk database, as every one-shot command uses it.
pub fn open_monitor(config: &Config) -> Result<Monitor, Box<dyn std::error::Error>> {
    let db = Database::open()?;
    Ok(Monitor::new(
        Arc::new(SystemClock),
        Arc::new(LogGateway),
        Box::new(db),
        config,
    ))
}

/// Print one event as a JSON line on stdout.
pub fn print_event(event: &Event) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string(event)?);
    Ok(())
}

/// Parse a duration in seconds: `90`, `90s`, `15m` or `2h`.
pub fn parse_seconds(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let (digits, scale) = match s.char_indices().last() {
        Some((i, 's')) => (&s[..i], 1),
        Some((i, 'm')) => (&s[..i], 60),
        Some((i, 'h')) => (&s[..i], 3600),
        _ => (s, 1),
    };
    let n: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration: {s:?}"))?;
    n.checked_mul(scale)
        .ok_or_else(|| format!("duration out of range: {s:?}"))
}

/// Parse `PKG=LIMIT[:USAGE][:blocked]`.
pub fn parse_app(s: &str) -> Result<LimitEntry, String> {
    let (package, rest) = s
        .split_once('=')
        .ok_or_else(|| format!("expected PKG=LIMIT, got {s:?}"))?;
    let mut parts = rest.split(':');
    let limit = parse_seconds(parts.next().unwrap_or_default())?;
    let mut entry = LimitEntry::new(package.trim(), limit);
    for part in parts {
        if part == "blocked" {
            entry = entry.with_blocked(true);
        } else if entry.usage_seconds.is_none() && entry.blocked.is_none() {
            entry = entry.with_usage(parse_seconds(part)?);
        } else {
            return Err(format!("unexpected {part:?} in {s:?}"));
        }
    }
    Ok(entry)
}
