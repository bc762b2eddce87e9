//! Foreground event sources.
//!
//! Two detection styles feed the monitor:
//!
//! - **Push**: an accessibility-style adapter reports window changes as they
//!   happen. Wrap it in a [`ChangeFilter`] so repeated reports of the same
//!   package do not close and reopen the session.
//! - **Poll**: a usage-stats style adapter is asked "what is in front now?"
//!   on an interval. Implement [`ForegroundSampler`] and hand it to the runtime
//!   through a [`PollingSource`].

use serde::{Deserialize, Serialize};

/// The foreground package changed at `timestamp_ms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForegroundEvent {
    pub package_id: String,
    pub timestamp_ms: i64,
}

impl ForegroundEvent {
    pub fn new(package_id: impl Into<String>, timestamp_ms: i64) -> Self {
        Self {
            package_id: package_id.into(),
            timestamp_ms,
        }
    }
}

/// Polled foreground detection.
pub trait ForegroundSampler: Send {
    /// Most recently resumed package, or `None` when detection is unavailable
    /// (permission missing, no recent events).
    fn current_foreground(&mut self) -> Option<String>;
}

impl<P: ForegroundSampler + ?Sized> ForegroundSampler for Box<P> {
    fn current_foreground(&mut self) -> Option<String> {
        (**self).current_foreground()
    }
}

/// Drops reports that repeat the last reported package.
#[derive(Debug, Default, Clone)]
pub struct ChangeFilter {
    last: Option<String>,
}

impl ChangeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the event if it names a different package than the last one.
    pub fn accept(&mut self, event: ForegroundEvent) -> Option<ForegroundEvent> {
        if self.last.as_deref() == Some(event.package_id.as_str()) {
            return None;
        }
        self.last = Some(event.package_id.clone());
        Some(event)
    }

    pub fn last(&self) -> Option<&str> {
        self.last.as_deref()
    }
}

/// Turns a [`ForegroundSampler`] into change events.
pub struct PollingSource<P> {
    sampler: P,
    filter: ChangeFilter,
}

impl<P: ForegroundSampler> PollingSource<P> {
    pub fn new(sampler: P) -> Self {
        Self {
            sampler,
            filter: ChangeFilter::new(),
        }
    }

    /// Take one sample. Yields an event only when the foreground moved.
    pub fn poll(&mut self, now_ms: i64) -> Option<ForegroundEvent> {
        let package_id = self.sampler.current_foreground()?;
        self.filter.accept(ForegroundEvent::new(package_id, now_ms))
    }

    pub fn sampler_mut(&mut self) -> &mut P {
        &mut self.sampler
    }
}

/// Sampler that replays a fixed answer; used by tests and the CLI.
#[derive(Debug, Default, Clone)]
pub struct StaticSampler {
    pub current: Option<String>,
}

impl StaticSampler {
    pub fn new(current: Option<&str>) -> Self {
        Self {
            current: current.map(str::to_string),
        }
    }
}

impl ForegroundSampler for StaticSampler {
    fn current_foreground(&mut self) -> Option<String> {
        self.current.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_filter_drops_repeats() {
        let mut filter = ChangeFilter::new();
        assert!(filter.accept(ForegroundEvent::new("a", 0)).is_some());
        assert!(filter.accept(ForegroundEvent::new("a", 1000)).is_none());
        assert!(filter.accept(ForegroundEvent::new("b", 2000)).is_some());
        assert!(filter.accept(ForegroundEvent::new("a", 3000)).is_some());
        assert_eq!(filter.last(), Some("a"));
    }

    #[test]
    fn polling_source_emits_on_change_only() {
        let mut source = PollingSource::new(StaticSampler::new(Some("a")));
        assert_eq!(source.poll(0), Some(ForegroundEvent::new("a", 0)));
        assert_eq!(source.poll(2000), None);

        source.sampler_mut().current = None;
        assert_eq!(source.poll(4000), None);

        source.sampler_mut().current = Some("b".into());
        assert_eq!(source.poll(6000), Some(ForegroundEvent::new("b", 6000)));
    }
}
