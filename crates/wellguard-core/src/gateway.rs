//! Presentation gateway.
//!
//! The core never draws anything itself. Notifications and blocking surfaces
//! are rendered by whatever implements [`PresentationGateway`]: a platform
//! overlay service on a device, a log line in the CLI, or a recorder in tests.

use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ways of putting a blocking surface in front of the user, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceKind {
    /// Drawn over other apps; needs an overlay capability.
    Overlay,
    /// Full-screen screen launched on top of the task stack.
    Screen,
    /// High-priority notification with a full-screen intent.
    FullScreenNotification,
}

impl fmt::Display for SurfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SurfaceKind::Overlay => "overlay",
            SurfaceKind::Screen => "screen",
            SurfaceKind::FullScreenNotification => "full_screen_notification",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Welcome,
    Milestone,
    Blocked,
    Status,
}

/// Rendered text of a semantic event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub package_id: Option<String>,
    pub title: String,
    pub body: String,
    pub tip: Option<String>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PresentationError {
    /// The platform lacks the permission or API needed for this surface.
    #[error("missing capability for {0}")]
    MissingCapability(SurfaceKind),

    #[error("presentation failed: {0}")]
    Failed(String),
}

pub trait PresentationGateway: Send + Sync {
    fn notify(&self, notice: &Notice) -> Result<(), PresentationError>;

    fn present_blocking_surface(
        &self,
        package_id: &str,
        surface: SurfaceKind,
    ) -> Result<(), PresentationError>;

    /// Whether a blocking surface for `package_id` is currently visible.
    fn is_surface_showing(&self, package_id: &str) -> bool;

    fn supports(&self, surface: SurfaceKind) -> bool;
}

/// Gateway that renders into the log. Nothing is ever "showing", so the
/// escalation always runs to its fallback.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogGateway;

impl PresentationGateway for LogGateway {
    fn notify(&self, notice: &Notice) -> Result<(), PresentationError> {
        tracing::info!(
            kind = ?notice.kind,
            package_id = notice.package_id.as_deref().unwrap_or("-"),
            title = %notice.title,
            "{}",
            notice.body
        );
        Ok(())
    }

    fn present_blocking_surface(
        &self,
        package_id: &str,
        surface: SurfaceKind,
    ) -> Result<(), PresentationError> {
        tracing::info!(package_id, %surface, "blocking surface requested");
        Ok(())
    }

    fn is_surface_showing(&self, _package_id: &str) -> bool {
        false
    }

    fn supports(&self, _surface: SurfaceKind) -> bool {
        true
    }
}

/// One call observed by a [`RecordingGateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    Notify(Notice),
    Present {
        package_id: String,
        surface: SurfaceKind,
    },
}

#[derive(Debug, Default)]
struct Recorder {
    calls: Vec<GatewayCall>,
    showing: Vec<String>,
    unsupported: Vec<SurfaceKind>,
    failing: Vec<SurfaceKind>,
}

/// Gateway that records every call, with switches for the failure modes a
/// real platform can exhibit.
#[derive(Debug, Default)]
pub struct RecordingGateway {
    inner: Mutex<Recorder>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut Recorder) -> T) -> T {
        let mut guard = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    pub fn presentations(&self) -> Vec<(String, SurfaceKind)> {
        self.with(|r| {
            r.calls
                .iter()
                .filter_map(|c| match c {
                    GatewayCall::Present {
                        package_id,
                        surface,
                    } => Some((package_id.clone(), *surface)),
                    GatewayCall::Notify(_) => None,
                })
                .collect()
        })
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.with(|r| {
            r.calls
                .iter()
                .filter_map(|c| match c {
                    GatewayCall::Notify(n) => Some(n.clone()),
                    GatewayCall::Present { .. } => None,
                })
                .collect()
        })
    }

    /// Report the surface for `package_id` as visible from now on.
    pub fn set_showing(&self, package_id: &str, showing: bool) {
        self.with(|r| {
            r.showing.retain(|p| p != package_id);
            if showing {
                r.showing.push(package_id.to_string());
            }
        });
    }

    pub fn set_unsupported(&self, surface: SurfaceKind) {
        self.with(|r| r.unsupported.push(surface));
    }

    pub fn set_failing(&self, surface: SurfaceKind) {
        self.with(|r| r.failing.push(surface));
    }
}

impl PresentationGateway for RecordingGateway {
    fn notify(&self, notice: &Notice) -> Result<(), PresentationError> {
        self.with(|r| r.calls.push(GatewayCall::Notify(notice.clone())));
        Ok(())
    }

    fn present_blocking_surface(
        &self,
        package_id: &str,
        surface: SurfaceKind,
    ) -> Result<(), PresentationError> {
        self.with(|r| {
            r.calls.push(GatewayCall::Present {
                package_id: package_id.to_string(),
                surface,
            });
            if r.unsupported.contains(&surface) {
                Err(PresentationError::MissingCapability(surface))
            } else if r.failing.contains(&surface) {
                Err(PresentationError::Failed(format!("{surface} rejected")))
            } else {
                Ok(())
            }
        })
    }

    fn is_surface_showing(&self, package_id: &str) -> bool {
        self.with(|r| r.showing.iter().any(|p| p == package_id))
    }

    fn supports(&self, surface: SurfaceKind) -> bool {
        self.with(|r| !r.unsupported.contains(&surface))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_gateway_reports_configured_failures() {
        let gw = RecordingGateway::new();
        gw.set_unsupported(SurfaceKind::Overlay);
        gw.set_failing(SurfaceKind::Screen);

        assert!(!gw.supports(SurfaceKind::Overlay));
        assert_eq!(
            gw.present_blocking_surface("a", SurfaceKind::Overlay),
            Err(PresentationError::MissingCapability(SurfaceKind::Overlay))
        );
        assert!(matches!(
            gw.present_blocking_surface("a", SurfaceKind::Screen),
            Err(PresentationError::Failed(_))
        ));
        assert_eq!(gw.presentations().len(), 2);
    }

    #[test]
    fn showing_flag_is_per_package() {
        let gw = RecordingGateway::new();
        gw.set_showing("a", true);
        assert!(gw.is_surface_showing("a"));
        assert!(!gw.is_surface_showing("b"));
        gw.set_showing("a", false);
        assert!(!gw.is_surface_showing("a"));
    }

    #[test]
    fn surface_kind_serializes_snake_case() {
        let json = serde_json::to_string(&SurfaceKind::FullScreenNotification).unwrap();
        assert_eq!(json, "\"full_screen_notification\"");
    }
}
