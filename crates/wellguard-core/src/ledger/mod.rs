//! Usage ledger.
//!
//! The ledger is the single source of truth for how much foreground time each
//! monitored package has consumed. It uses increment-on-tick accrual: every
//! `tick()` credits the whole seconds elapsed since the last credit to the open
//! foreground session, and a foreground change closes the session by crediting
//! only the remainder since the last tick. Sub-second remainders carry over
//! between ticks and are dropped when the session closes.
//!
//! ## State Transitions
//!
//! ```text
//! (not configured) -> Tracking -> Blocked -> (removed on unblock)
//! ```

pub mod milestone;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clock::to_datetime;
use crate::error::ValidationError;
use crate::events::Event;

pub use milestone::{percentage, Milestone, MilestoneSet};

/// Limits are daily caps.
pub const MAX_LIMIT_SECONDS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppState {
    Unmonitored,
    Tracking,
    Blocked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredApp {
    pub package_id: String,
    pub limit_seconds: u64,
    pub usage_seconds: u64,
    pub state: AppState,
    pub milestones_fired: MilestoneSet,
    pub welcome_shown: bool,
}

impl MonitoredApp {
    pub fn new(package_id: impl Into<String>, limit_seconds: u64) -> Self {
        Self {
            package_id: package_id.into(),
            limit_seconds,
            usage_seconds: 0,
            state: AppState::Tracking,
            milestones_fired: MilestoneSet::new(),
            welcome_shown: false,
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.state == AppState::Blocked
    }

    pub fn limit_reached(&self) -> bool {
        self.limit_seconds > 0 && self.usage_seconds >= self.limit_seconds
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.limit_seconds.saturating_sub(self.usage_seconds)
    }

    pub fn percentage(&self) -> Option<u64> {
        percentage(self.usage_seconds, self.limit_seconds)
    }

    fn derive_state(&mut self) {
        self.state = if self.limit_reached() {
            AppState::Blocked
        } else {
            AppState::Tracking
        };
    }
}

/// One configured limit, as supplied by the controlling UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitEntry {
    #[serde(alias = "packageName")]
    pub package_id: String,
    #[serde(default)]
    pub limit_seconds: u64,
    #[serde(default)]
    pub usage_seconds: Option<u64>,
    #[serde(default)]
    pub blocked: Option<bool>,
}

impl LimitEntry {
    pub fn new(package_id: impl Into<String>, limit_seconds: u64) -> Self {
        Self {
            package_id: package_id.into(),
            limit_seconds,
            usage_seconds: None,
            blocked: None,
        }
    }

    pub fn with_usage(mut self, usage_seconds: u64) -> Self {
        self.usage_seconds = Some(usage_seconds);
        self
    }

    pub fn with_blocked(mut self, blocked: bool) -> Self {
        self.blocked = Some(blocked);
        self
    }
}

/// Read-only view of one tracked package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub package_id: String,
    pub usage_seconds: u64,
    pub limit_seconds: u64,
    pub blocked: bool,
}

/// The currently foregrounded tracked package. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForegroundSession {
    pub package_id: String,
    /// Instant up to which whole seconds have been credited.
    pub accrued_through_ms: i64,
}

/// What a foreground change did, for the blocking coordinator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForegroundOutcome {
    pub events: Vec<Event>,
    /// The new foreground package is blocked and needs its surface re-asserted.
    pub reassert_block: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    apps: BTreeMap<String, MonitoredApp>,
    session: Option<ForegroundSession>,
    foreground: Option<String>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from previously persisted records. The foreground session is
    /// never restored.
    pub fn from_apps(apps: impl IntoIterator<Item = MonitoredApp>) -> Self {
        Self {
            apps: apps
                .into_iter()
                .filter(|a| a.limit_seconds > 0)
                .map(|a| (a.package_id.clone(), a))
                .collect(),
            session: None,
            foreground: None,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn get(&self, package_id: &str) -> Option<&MonitoredApp> {
        self.apps.get(package_id)
    }

    pub fn apps(&self) -> impl Iterator<Item = &MonitoredApp> {
        self.apps.values()
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    pub fn state_of(&self, package_id: &str) -> AppState {
        self.apps
            .get(package_id)
            .map(|a| a.state)
            .unwrap_or(AppState::Unmonitored)
    }

    pub fn is_blocked(&self, package_id: &str) -> bool {
        self.state_of(package_id) == AppState::Blocked
    }

    pub fn session(&self) -> Option<&ForegroundSession> {
        self.session.as_ref()
    }

    /// Last reported foreground package, tracked or not.
    pub fn foreground(&self) -> Option<&str> {
        self.foreground.as_deref()
    }

    pub fn blocked_packages(&self) -> Vec<String> {
        self.apps
            .values()
            .filter(|a| a.is_blocked())
            .map(|a| a.package_id.clone())
            .collect()
    }

    pub fn usage_snapshot(&self) -> Vec<UsageRecord> {
        self.apps
            .values()
            .map(|a| UsageRecord {
                package_id: a.package_id.clone(),
                usage_seconds: a.usage_seconds,
                limit_seconds: a.limit_seconds,
                blocked: a.is_blocked(),
            })
            .collect()
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Replace the tracked configuration.
    ///
    /// Entries with a zero limit are skipped. Usage of packages that are
    /// re-supplied is preserved unless the entry carries its own; milestone
    /// and welcome flags restart unless the package stays blocked.
    pub fn configure(
        &mut self,
        entries: Vec<LimitEntry>,
        now_ms: i64,
    ) -> Result<Vec<Event>, ValidationError> {
        validate(&entries)?;

        let mut events = Vec::new();
        // Credit the running session against the old configuration first.
        events.extend(self.close_session(now_ms));

        let mut previous = std::mem::take(&mut self.apps);
        for entry in entries.into_iter().filter(|e| e.limit_seconds > 0) {
            let LimitEntry {
                package_id,
                limit_seconds,
                usage_seconds,
                blocked,
            } = entry;

            let old = previous.remove(&package_id);
            let was_blocked = old.as_ref().map(MonitoredApp::is_blocked).unwrap_or(false);

            let mut app = MonitoredApp::new(package_id.clone(), limit_seconds);
            app.usage_seconds = usage_seconds
                .or_else(|| old.as_ref().map(|o| o.usage_seconds))
                .unwrap_or(0);
            if blocked == Some(true) {
                app.usage_seconds = app.usage_seconds.max(limit_seconds);
            }
            app.derive_state();

            match old {
                Some(old) if was_blocked && app.is_blocked() => {
                    app.milestones_fired = old.milestones_fired;
                    app.welcome_shown = old.welcome_shown;
                }
                _ => {
                    if app.is_blocked() {
                        events.extend(announce_block(&mut app, now_ms));
                    }
                }
            }

            self.apps.insert(package_id, app);
        }

        info!(
            tracked = self.apps.len(),
            dropped = previous.len(),
            "monitoring configuration replaced"
        );
        events.push(Event::Configured {
            tracked: self.apps.len(),
            at: to_datetime(now_ms),
        });

        if let Some(fg) = self.foreground.clone() {
            self.open_session(&fg, now_ms);
        }
        Ok(events)
    }

    /// Close the running session and open one for `package_id` if it is
    /// tracked and not blocked.
    pub fn on_foreground_changed(&mut self, package_id: &str, timestamp_ms: i64) -> ForegroundOutcome {
        let mut outcome = ForegroundOutcome {
            events: self.close_session(timestamp_ms),
            reassert_block: false,
        };

        self.foreground = Some(package_id.to_string());

        if let Some(app) = self.apps.get_mut(package_id) {
            if app.is_blocked() {
                outcome.reassert_block = true;
            } else if !app.welcome_shown {
                app.welcome_shown = true;
                outcome.events.push(Event::Welcome {
                    package_id: app.package_id.clone(),
                    limit_seconds: app.limit_seconds,
                    at: to_datetime(timestamp_ms),
                });
            }
        }
        self.open_session(package_id, timestamp_ms);
        outcome
    }

    /// Credit elapsed whole seconds to the open session.
    pub fn tick(&mut self, now_ms: i64) -> Vec<Event> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        let elapsed_ms = now_ms.saturating_sub(session.accrued_through_ms);
        if elapsed_ms < 0 {
            debug!(
                package_id = %session.package_id,
                elapsed_ms,
                "clock moved backwards, re-anchoring session"
            );
            session.accrued_through_ms = now_ms;
            return Vec::new();
        }
        let secs = elapsed_ms / 1000;
        if secs == 0 {
            return Vec::new();
        }
        session.accrued_through_ms = session.accrued_through_ms.saturating_add(secs * 1000);
        let package_id = session.package_id.clone();
        self.credit(&package_id, secs.unsigned_abs(), now_ms)
    }

    /// Remove a package entirely. Returns whether anything was removed.
    pub fn unblock(&mut self, package_id: &str) -> bool {
        if self
            .session
            .as_ref()
            .is_some_and(|s| s.package_id == package_id)
        {
            self.session = None;
        }
        self.apps.remove(package_id).is_some()
    }

    /// Drop the session without crediting the partial interval.
    pub fn clear_session(&mut self) {
        self.session = None;
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn open_session(&mut self, package_id: &str, now_ms: i64) {
        self.session = match self.apps.get(package_id) {
            Some(app) if app.state == AppState::Tracking => Some(ForegroundSession {
                package_id: package_id.to_string(),
                accrued_through_ms: now_ms,
            }),
            _ => None,
        };
    }

    fn close_session(&mut self, timestamp_ms: i64) -> Vec<Event> {
        let Some(session) = self.session.take() else {
            return Vec::new();
        };
        // Negative elapsed (clock went backwards) credits nothing.
        let secs = (timestamp_ms.saturating_sub(session.accrued_through_ms) / 1000).max(0);
        if secs == 0 {
            return Vec::new();
        }
        self.credit(&session.package_id, secs.unsigned_abs(), timestamp_ms)
    }

    fn credit(&mut self, package_id: &str, secs: u64, now_ms: i64) -> Vec<Event> {
        let Some(app) = self.apps.get_mut(package_id) else {
            return Vec::new();
        };
        if app.state != AppState::Tracking {
            return Vec::new();
        }
        app.usage_seconds = app.usage_seconds.saturating_add(secs);
        debug!(
            package_id,
            credited = secs,
            usage = app.usage_seconds,
            limit = app.limit_seconds,
            "usage credited"
        );

        let events = evaluate(app, now_ms);
        if app.is_blocked()
            && self
                .session
                .as_ref()
                .is_some_and(|s| s.package_id == package_id)
        {
            self.session = None;
        }
        events
    }
}

/// Fire newly crossed milestones and the block transition for one package.
fn evaluate(app: &mut MonitoredApp, now_ms: i64) -> Vec<Event> {
    let Some(pct) = app.percentage() else {
        return Vec::new();
    };
    let mut events = Vec::new();
    for milestone in app.milestones_fired.advance(pct) {
        if milestone.is_limit() {
            continue;
        }
        info!(package_id = %app.package_id, %milestone, "milestone reached");
        events.push(Event::Milestone {
            package_id: app.package_id.clone(),
            percent: milestone.percent(),
            usage_seconds: app.usage_seconds,
            limit_seconds: app.limit_seconds,
            remaining_seconds: app.remaining_seconds(),
            at: to_datetime(now_ms),
        });
    }
    if app.limit_reached() && !app.is_blocked() {
        events.extend(announce_block(app, now_ms));
    }
    events
}

/// Mark a package blocked, filling in every milestone it skipped without
/// announcing the ordinary ones.
fn announce_block(app: &mut MonitoredApp, now_ms: i64) -> Option<Event> {
    app.state = AppState::Blocked;
    for m in Milestone::ALL {
        app.milestones_fired.insert(m);
    }
    info!(
        package_id = %app.package_id,
        usage = app.usage_seconds,
        limit = app.limit_seconds,
        "limit reached, blocking"
    );
    Some(Event::Blocked {
        package_id: app.package_id.clone(),
        usage_seconds: app.usage_seconds,
        limit_seconds: app.limit_seconds,
        at: to_datetime(now_ms),
    })
}

fn validate(entries: &[LimitEntry]) -> Result<(), ValidationError> {
    let mut seen = std::collections::BTreeSet::new();
    for entry in entries {
        if entry.package_id.trim().is_empty() {
            return Err(ValidationError::EmptyPackageId);
        }
        if entry.limit_seconds > MAX_LIMIT_SECONDS {
            return Err(ValidationError::LimitTooLarge {
                package_id: entry.package_id.clone(),
                limit_seconds: entry.limit_seconds,
                max_seconds: MAX_LIMIT_SECONDS,
            });
        }
        if !seen.insert(entry.package_id.as_str()) {
            return Err(ValidationError::DuplicatePackage(entry.package_id.clone()));
        }
    }
    Ok(())
}
