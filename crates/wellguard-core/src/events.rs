use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::gateway::SurfaceKind;

/// Every user-visible state change in the monitor produces an Event.
/// The presentation gateway renders them; the CLI prints them as JSON lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Tracked configuration replaced.
    Configured {
        tracked: usize,
        at: DateTime<Utc>,
    },
    /// First foreground of a tracked package in this cycle.
    Welcome {
        package_id: String,
        limit_seconds: u64,
        at: DateTime<Utc>,
    },
    /// A 30% or 70% threshold was crossed.
    Milestone {
        package_id: String,
        percent: u8,
        usage_seconds: u64,
        limit_seconds: u64,
        remaining_seconds: u64,
        at: DateTime<Utc>,
    },
    /// Usage reached the limit. Reported once per cycle; this is the 100%
    /// milestone.
    Blocked {
        package_id: String,
        usage_seconds: u64,
        limit_seconds: u64,
        at: DateTime<Utc>,
    },
    /// A blocking surface was requested from the gateway.
    PresentationRequested {
        package_id: String,
        surface: SurfaceKind,
        attempt: u8,
        at: DateTime<Utc>,
    },
    /// The gateway could not render a blocking surface; only a passive
    /// notification was shown.
    PresentationDegraded {
        package_id: String,
        reason: String,
        at: DateTime<Utc>,
    },
    Unblocked {
        package_id: String,
        at: DateTime<Utc>,
    },
    MonitoringStopped {
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn package_id(&self) -> Option<&str> {
        match self {
            Event::Welcome { package_id, .. }
            | Event::Milestone { package_id, .. }
            | Event::Blocked { package_id, .. }
            | Event::PresentationRequested { package_id, .. }
            | Event::PresentationDegraded { package_id, .. }
            | Event::Unblocked { package_id, .. } => Some(package_id),
            Event::Configured { .. } | Event::MonitoringStopped { .. } => None,
        }
    }

    /// Whether this event changes durable state and must trigger a snapshot.
    pub fn is_state_change(&self) -> bool {
        matches!(
            self,
            Event::Configured { .. }
                | Event::Blocked { .. }
                | Event::Unblocked { .. }
                | Event::Welcome { .. }
                | Event::Milestone { .. }
        )
    }
}
