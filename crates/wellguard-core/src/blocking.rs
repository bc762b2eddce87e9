//! Blocking coordinator - escalating presentation of the blocking surface
//!
//! Once a package is blocked, the coordinator makes sure a blocking surface
//! actually reaches the screen. Platforms routinely swallow the first request
//! (background launch restrictions, overlay permission revoked), so a request
//! is an explicit pending state that escalates on deadlines:
//!
//! ## Escalation
//!
//! - **Attempt 1**: primary mechanism (overlay when available, else screen),
//!   deadline `start + retry_after_ms`
//! - **Attempt 2**: primary mechanism again, deadline `start + fallback_after_ms`
//! - **Attempt 3**: full-screen notification, then the attempt is finished
//!
//! A surface confirmed showing, an unblock, or a reconfiguration that drops
//! the package cancels the pending attempt.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::to_datetime;
use crate::events::Event;
use crate::gateway::{PresentationError, PresentationGateway, SurfaceKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationPolicy {
    /// Delay before the primary mechanism is re-issued.
    pub retry_after_ms: u64,
    /// Delay before falling back to a full-screen notification.
    pub fallback_after_ms: u64,
    pub prefer_overlay: bool,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            retry_after_ms: 500,
            fallback_after_ms: 1500,
            prefer_overlay: true,
        }
    }
}

/// An in-flight presentation request waiting for its next deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentationPending {
    pub package_id: String,
    pub attempt: u8,
    pub primary: SurfaceKind,
    pub started_at_ms: i64,
    pub deadline_ms: i64,
}

#[derive(Debug, Clone, Default)]
pub struct BlockingCoordinator {
    policy: EscalationPolicy,
    pending: Option<PresentationPending>,
}

impl BlockingCoordinator {
    pub fn new(policy: EscalationPolicy) -> Self {
        Self {
            policy,
            pending: None,
        }
    }

    pub fn pending(&self) -> Option<&PresentationPending> {
        self.pending.as_ref()
    }

    /// Ask for the blocking surface of `package_id`.
    ///
    /// No-op when the surface is already showing or an attempt for the same
    /// package is in flight. A pending attempt for another package is replaced.
    pub fn request(
        &mut self,
        package_id: &str,
        now_ms: i64,
        gateway: &dyn PresentationGateway,
    ) -> Vec<Event> {
        if gateway.is_surface_showing(package_id) {
            debug!(package_id, "blocking surface already showing");
            return Vec::new();
        }
        if self
            .pending
            .as_ref()
            .is_some_and(|p| p.package_id == package_id)
        {
            debug!(package_id, "presentation already pending");
            return Vec::new();
        }

        let primary = self.primary_surface(gateway);
        self.pending = Some(PresentationPending {
            package_id: package_id.to_string(),
            attempt: 1,
            primary,
            started_at_ms: now_ms,
            deadline_ms: now_ms.saturating_add(ms(self.policy.retry_after_ms)),
        });
        self.present(package_id, primary, 1, now_ms, gateway)
    }

    /// Advance the pending attempt if its deadline has passed.
    ///
    /// `still_blocked` is consulted so an attempt never outlives its block.
    pub fn poll(
        &mut self,
        now_ms: i64,
        still_blocked: impl Fn(&str) -> bool,
        gateway: &dyn PresentationGateway,
    ) -> Vec<Event> {
        let Some(pending) = self.pending.clone() else {
            return Vec::new();
        };
        if !still_blocked(&pending.package_id) {
            self.cancel(&pending.package_id);
            return Vec::new();
        }
        if gateway.is_surface_showing(&pending.package_id) {
            info!(
                package_id = %pending.package_id,
                attempt = pending.attempt,
                "blocking surface confirmed"
            );
            self.pending = None;
            return Vec::new();
        }
        if now_ms < pending.deadline_ms {
            return Vec::new();
        }

        match pending.attempt {
            1 => {
                self.pending = Some(PresentationPending {
                    attempt: 2,
                    deadline_ms: pending
                        .started_at_ms
                        .saturating_add(ms(self.policy.fallback_after_ms)),
                    ..pending.clone()
                });
                self.present(&pending.package_id, pending.primary, 2, now_ms, gateway)
            }
            _ => {
                self.pending = None;
                self.present(
                    &pending.package_id,
                    SurfaceKind::FullScreenNotification,
                    3,
                    now_ms,
                    gateway,
                )
            }
        }
    }

    /// Drop the pending attempt if it belongs to `package_id`.
    pub fn cancel(&mut self, package_id: &str) {
        if self
            .pending
            .as_ref()
            .is_some_and(|p| p.package_id == package_id)
        {
            debug!(package_id, "presentation cancelled");
            self.pending = None;
        }
    }

    /// Drop the pending attempt unless `keep` still wants it.
    pub fn retain(&mut self, keep: impl Fn(&str) -> bool) {
        if let Some(p) = &self.pending {
            if !keep(&p.package_id) {
                let package_id = p.package_id.clone();
                self.cancel(&package_id);
            }
        }
    }

    pub fn clear(&mut self) {
        self.pending = None;
    }

    fn primary_surface(&self, gateway: &dyn PresentationGateway) -> SurfaceKind {
        if self.policy.prefer_overlay && gateway.supports(SurfaceKind::Overlay) {
            SurfaceKind::Overlay
        } else {
            SurfaceKind::Screen
        }
    }

    fn present(
        &mut self,
        package_id: &str,
        surface: SurfaceKind,
        attempt: u8,
        now_ms: i64,
        gateway: &dyn PresentationGateway,
    ) -> Vec<Event> {
        let at = to_datetime(now_ms);
        let mut events = vec![Event::PresentationRequested {
            package_id: package_id.to_string(),
            surface,
            attempt,
            at,
        }];

        match gateway.present_blocking_surface(package_id, surface) {
            Ok(()) => {
                info!(package_id, %surface, attempt, "blocking surface requested");
            }
            Err(PresentationError::MissingCapability(kind)) => {
                warn!(package_id, surface = %kind, "cannot present blocking surface, degrading");
                self.cancel(package_id);
                events.push(Event::PresentationDegraded {
                    package_id: package_id.to_string(),
                    reason: format!("missing capability for {kind}"),
                    at,
                });
            }
            Err(e) => {
                warn!(package_id, %surface, attempt, error = %e, "presentation failed");
            }
        }
        events
    }
}

fn ms(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::RecordingGateway;

    fn surfaces(events: &[Event]) -> Vec<(SurfaceKind, u8)> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::PresentationRequested {
                    surface, attempt, ..
                } => Some((*surface, *attempt)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn escalates_through_all_attempts() {
        let gw = RecordingGateway::new();
        let mut c = BlockingCoordinator::default();

        let e = c.request("a", 0, &gw);
        assert_eq!(surfaces(&e), vec![(SurfaceKind::Overlay, 1)]);
        assert_eq!(c.pending().unwrap().deadline_ms, 500);

        assert!(c.poll(499, |_| true, &gw).is_empty());
        let e = c.poll(500, |_| true, &gw);
        assert_eq!(surfaces(&e), vec![(SurfaceKind::Overlay, 2)]);
        assert_eq!(c.pending().unwrap().deadline_ms, 1500);

        let e = c.poll(1500, |_| true, &gw);
        assert_eq!(surfaces(&e), vec![(SurfaceKind::FullScreenNotification, 3)]);
        assert!(c.pending().is_none());
        assert!(c.poll(5000, |_| true, &gw).is_empty());
    }

    #[test]
    fn confirmed_surface_stops_escalation() {
        let gw = RecordingGateway::new();
        let mut c = BlockingCoordinator::default();
        c.request("a", 0, &gw);
        gw.set_showing("a", true);
        assert!(c.poll(600, |_| true, &gw).is_empty());
        assert!(c.pending().is_none());
        assert_eq!(gw.presentations().len(), 1);
    }

    #[test]
    fn request_is_idempotent_while_pending_or_showing() {
        let gw = RecordingGateway::new();
        let mut c = BlockingCoordinator::default();
        c.request("a", 0, &gw);
        assert!(c.request("a", 100, &gw).is_empty());

        let gw2 = RecordingGateway::new();
        gw2.set_showing("b", true);
        assert!(c.request("b", 100, &gw2).is_empty());
        assert_eq!(c.pending().unwrap().package_id, "a");
    }

    #[test]
    fn unblocked_package_cancels_pending() {
        let gw = RecordingGateway::new();
        let mut c = BlockingCoordinator::default();
        c.request("a", 0, &gw);
        assert!(c.poll(600, |_| false, &gw).is_empty());
        assert!(c.pending().is_none());
    }

    #[test]
    fn falls_back_to_screen_without_overlay() {
        let gw = RecordingGateway::new();
        gw.set_unsupported(SurfaceKind::Overlay);
        let mut c = BlockingCoordinator::default();
        let e = c.request("a", 0, &gw);
        assert_eq!(surfaces(&e), vec![(SurfaceKind::Screen, 1)]);
    }

    #[test]
    fn missing_capability_degrades_and_ends_attempt() {
        let gw = RecordingGateway::new();
        gw.set_unsupported(SurfaceKind::Overlay);
        gw.set_unsupported(SurfaceKind::Screen);
        let mut c = BlockingCoordinator::default();
        let e = c.request("a", 0, &gw);
        assert!(matches!(e.last(), Some(Event::PresentationDegraded { .. })));
        assert!(c.pending().is_none());
    }

    #[test]
    fn render_failure_keeps_escalating() {
        let gw = RecordingGateway::new();
        gw.set_failing(SurfaceKind::Overlay);
        let mut c = BlockingCoordinator::default();
        c.request("a", 0, &gw);
        assert_eq!(c.pending().unwrap().attempt, 1);
        let e = c.poll(500, |_| true, &gw);
        assert_eq!(surfaces(&e), vec![(SurfaceKind::Overlay, 2)]);
    }

    #[test]
    fn retain_drops_removed_package() {
        let gw = RecordingGateway::new();
        let mut c = BlockingCoordinator::default();
        c.request("a", 0, &gw);
        c.retain(|p| p == "b");
        assert!(c.pending().is_none());
    }
}
