//! Monitor - the single owner of ledger and blocking state
//!
//! Every command and every loop step goes through [`Monitor`]. Ledger,
//! blocking coordinator and the running flag live behind one mutex, so a tick
//! and a foreground change can never interleave halfway. Events produced
//! under the lock are rendered and broadcast only after it is released.
//!
//! ## Persistence
//!
//! A snapshot is written after every state-changing event (configure, block,
//! unblock, milestone, welcome), periodically by the runtime, and once on
//! shutdown. Storage failures are logged and never stop monitoring.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::blocking::{BlockingCoordinator, PresentationPending};
use crate::clock::{to_datetime, Clock};
use crate::error::{CoreError, Result};
use crate::events::Event;
use crate::gateway::{Notice, PresentationGateway};
use crate::ledger::{Ledger, LimitEntry, UsageRecord};
use crate::messages::{self, NoticeOptions};
use crate::persistence::{self, Snapshot, StateStore};
use crate::source::ForegroundEvent;
use crate::storage::Config;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Oldest foreground timestamp taken at face value.
const MAX_EVENT_AGE_MS: i64 = 60_000;

/// Summary for the persistent status notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStatus {
    pub running: bool,
    pub tracked: usize,
    pub blocked: Vec<String>,
    pub foreground: Option<String>,
    pub pending_presentation: Option<PresentationPending>,
    pub notice: Notice,
}

struct MonitorState {
    ledger: Ledger,
    coordinator: BlockingCoordinator,
    running: bool,
}

impl MonitorState {
    /// Request the blocking surface for every newly blocked package that is
    /// currently in front.
    fn present_new_blocks(
        &mut self,
        events: &[Event],
        now_ms: i64,
        gateway: &dyn PresentationGateway,
    ) -> Vec<Event> {
        let mut out = Vec::new();
        for event in events {
            if let Event::Blocked { package_id, .. } = event {
                if self.ledger.foreground() == Some(package_id.as_str()) {
                    out.extend(self.coordinator.request(package_id, now_ms, gateway));
                }
            }
        }
        out
    }
}

pub struct Monitor {
    state: Mutex<MonitorState>,
    clock: Arc<dyn Clock>,
    gateway: Arc<dyn PresentationGateway>,
    store: Mutex<Box<dyn StateStore>>,
    notices: NoticeOptions,
    events: broadcast::Sender<Event>,
}

impl Monitor {
    /// Create a monitor, restoring any ledger state held by `store`.
    pub fn new(
        clock: Arc<dyn Clock>,
        gateway: Arc<dyn PresentationGateway>,
        store: Box<dyn StateStore>,
        config: &Config,
    ) -> Self {
        let ledger = persistence::restore(&store.load_snapshot());
        info!(
            tracked = ledger.len(),
            blocked = ledger.blocked_packages().len(),
            "monitor started"
        );
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(MonitorState {
                ledger,
                coordinator: BlockingCoordinator::new(config.escalation()),
                running: true,
            }),
            clock,
            gateway,
            store: Mutex::new(store),
            notices: config.notice_options(),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("monitor state lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Every event the monitor produces, in order. Slow receivers may lag.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Replace the monitored packages and their limits.
    ///
    /// # Errors
    /// Returns a validation error for malformed entries, or
    /// [`CoreError::Stopped`] after shutdown.
    pub fn configure(&self, entries: Vec<LimitEntry>) -> Result<Vec<Event>> {
        let now = self.clock.now_ms();
        let (events, snapshot) = {
            let mut guard = self.lock();
            let st = &mut *guard;
            if !st.running {
                return Err(CoreError::Stopped);
            }
            let mut events = st.ledger.configure(entries, now)?;
            let ledger = &st.ledger;
            st.coordinator.retain(|p| ledger.is_blocked(p));
            let presented = st.present_new_blocks(&events, now, self.gateway.as_ref());
            events.extend(presented);
            (events, persistence::snapshot(&st.ledger))
        };
        self.save(&snapshot);
        self.dispatch(&events);
        Ok(events)
    }

    /// Remove a package from monitoring, lifting its block. Unknown packages
    /// are a no-op.
    ///
    /// # Errors
    /// Returns [`CoreError::Stopped`] after shutdown.
    pub fn unblock_app(&self, package_id: &str) -> Result<Vec<Event>> {
        let now = self.clock.now_ms();
        let (events, snapshot) = {
            let mut st = self.lock();
            if !st.running {
                return Err(CoreError::Stopped);
            }
            st.coordinator.cancel(package_id);
            if !st.ledger.unblock(package_id) {
                debug!(package_id, "unblock of unknown package ignored");
                return Ok(Vec::new());
            }
            info!(package_id, "package unblocked and removed from monitoring");
            let events = vec![Event::Unblocked {
                package_id: package_id.to_string(),
                at: to_datetime(now),
            }];
            (events, persistence::snapshot(&st.ledger))
        };
        self.save(&snapshot);
        self.dispatch(&events);
        Ok(events)
    }

    /// Feed one foreground change. Ignored after shutdown.
    pub fn on_foreground_changed(&self, event: ForegroundEvent) -> Vec<Event> {
        let now = self.clock.now_ms();
        let (events, snapshot) = {
            let mut guard = self.lock();
            let st = &mut *guard;
            if !st.running {
                debug!(package_id = %event.package_id, "foreground change after shutdown ignored");
                return Vec::new();
            }
            let timestamp_ms = accepted_timestamp(&event, now);
            let outcome = st
                .ledger
                .on_foreground_changed(&event.package_id, timestamp_ms);
            let mut events = outcome.events;
            let presented = st.present_new_blocks(&events, now, self.gateway.as_ref());
            events.extend(presented);
            if outcome.reassert_block {
                debug!(package_id = %event.package_id, "blocked package in front, re-asserting");
                events.extend(
                    st.coordinator
                        .request(&event.package_id, now, self.gateway.as_ref()),
                );
            }
            let snapshot = needs_snapshot(&events).then(|| persistence::snapshot(&st.ledger));
            (events, snapshot)
        };
        if let Some(snapshot) = snapshot {
            self.save(&snapshot);
        }
        self.dispatch(&events);
        events
    }

    /// Credit elapsed time and advance any pending presentation.
    pub fn tick(&self) -> Vec<Event> {
        let now = self.clock.now_ms();
        let (events, snapshot) = {
            let mut guard = self.lock();
            let st = &mut *guard;
            if !st.running {
                return Vec::new();
            }
            let gateway = self.gateway.as_ref();
            let mut events = st.ledger.tick(now);
            let presented = st.present_new_blocks(&events, now, gateway);
            events.extend(presented);
            let ledger = &st.ledger;
            events.extend(st.coordinator.poll(now, |p| ledger.is_blocked(p), gateway));
            let snapshot = needs_snapshot(&events).then(|| persistence::snapshot(&st.ledger));
            (events, snapshot)
        };
        if let Some(snapshot) = snapshot {
            self.save(&snapshot);
        }
        self.dispatch(&events);
        events
    }

    /// Write the current ledger to the store.
    ///
    /// # Errors
    /// Returns the store's error.
    pub fn persist(&self) -> Result<()> {
        let snapshot = persistence::snapshot(&self.lock().ledger);
        self.store_guard().save(&snapshot)
    }

    /// Stop monitoring: credit the open session, flush a final snapshot and
    /// refuse further commands. Idempotent.
    pub fn shutdown(&self) -> Vec<Event> {
        let now = self.clock.now_ms();
        let (events, snapshot) = {
            let mut st = self.lock();
            if !st.running {
                return Vec::new();
            }
            let mut events = st.ledger.tick(now);
            st.ledger.clear_session();
            st.coordinator.clear();
            st.running = false;
            events.push(Event::MonitoringStopped {
                at: to_datetime(now),
            });
            (events, persistence::snapshot(&st.ledger))
        };
        info!("monitoring stopped");
        self.save(&snapshot);
        self.dispatch(&events);
        events
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn blocked_apps(&self) -> Vec<String> {
        self.lock().ledger.blocked_packages()
    }

    pub fn usage_snapshot(&self) -> Vec<UsageRecord> {
        self.lock().ledger.usage_snapshot()
    }

    /// Lets a blocking surface poll whether it may dismiss itself.
    pub fn is_blocked(&self, package_id: &str) -> bool {
        self.lock().ledger.is_blocked(package_id)
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    pub fn status(&self) -> MonitorStatus {
        let st = self.lock();
        let blocked = st.ledger.blocked_packages();
        MonitorStatus {
            running: st.running,
            tracked: st.ledger.len(),
            notice: messages::status_notice(st.ledger.len(), blocked.len()),
            blocked,
            foreground: st.ledger.foreground().map(str::to_string),
            pending_presentation: st.coordinator.pending().cloned(),
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn store_guard(&self) -> MutexGuard<'_, Box<dyn StateStore>> {
        match self.store.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("state store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn save(&self, snapshot: &Snapshot) {
        if let Err(e) = self.store_guard().save(snapshot) {
            warn!(error = %e, "failed to persist ledger snapshot");
        }
    }

    fn dispatch(&self, events: &[Event]) {
        for event in events {
            if let Some(notice) = messages::notice_for(event, self.notices) {
                if let Err(e) = self.gateway.notify(&notice) {
                    warn!(error = %e, kind = ?notice.kind, "failed to show notification");
                }
            }
            // No receivers is fine.
            let _ = self.events.send(event.clone());
        }
    }
}

/// Adapter timestamps from the future or from long ago are replaced by the
/// monitor's own clock reading.
fn accepted_timestamp(event: &ForegroundEvent, now_ms: i64) -> i64 {
    let ts = event.timestamp_ms;
    if ts > now_ms || ts < now_ms.saturating_sub(MAX_EVENT_AGE_MS) {
        debug!(
            package_id = %event.package_id,
            timestamp_ms = ts,
            now_ms,
            "foreground timestamp out of range, using clock"
        );
        now_ms
    } else {
        ts
    }
}

fn needs_snapshot(events: &[Event]) -> bool {
    events.iter().any(Event::is_state_change)
}
