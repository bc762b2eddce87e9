//! Integration tests for a state store that rejects every write.
//!
//! Persistence failures are logged and skipped; monitoring carries on and
//! shutdown still completes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant};
use wellguard_core::persistence::Snapshot;
use wellguard_core::{
    runtime, Clock, Config, CoreError, Event, ForegroundEvent, LimitEntry, ManualClock, Monitor,
    RecordingGateway, StateStore, StorageError,
};

const T0: i64 = 1_735_689_600_000;

/// Reads nothing and fails every save.
#[derive(Default)]
struct ReadOnlyStore {
    save_attempts: AtomicUsize,
}

impl ReadOnlyStore {
    fn attempts(&self) -> usize {
        self.save_attempts.load(Ordering::SeqCst)
    }
}

impl StateStore for ReadOnlyStore {
    fn load(&self, _key: &str) -> Result<Option<String>, CoreError> {
        Ok(None)
    }

    fn save(&self, _snapshot: &Snapshot) -> Result<(), CoreError> {
        self.save_attempts.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::Locked.into())
    }
}

struct TokioClock {
    start: Instant,
}

impl Clock for TokioClock {
    fn now_ms(&self) -> i64 {
        T0 + i64::try_from(self.start.elapsed().as_millis()).unwrap_or(i64::MAX)
    }
}

#[test]
fn failed_saves_do_not_interrupt_commands() {
    let clock = Arc::new(ManualClock::new(T0));
    let store = Arc::new(ReadOnlyStore::default());
    let monitor = Monitor::new(
        clock.clone(),
        Arc::new(RecordingGateway::new()),
        Box::new(store.clone()),
        &Config::default(),
    );

    monitor
        .configure(vec![LimitEntry::new("com.video", 5)])
        .unwrap();
    monitor.on_foreground_changed(ForegroundEvent::new("com.video", clock.now_ms()));
    let mut events = Vec::new();
    for _ in 0..5 {
        clock.advance_secs(1);
        events.extend(monitor.tick());
    }
    assert!(events.iter().any(|e| matches!(e, Event::Blocked { .. })));
    assert!(monitor.is_blocked("com.video"));
    assert!(monitor.persist().is_err());

    let stopped = monitor.shutdown();
    assert!(matches!(stopped.last(), Some(Event::MonitoringStopped { .. })));
    assert!(!monitor.is_running());
    assert!(store.attempts() >= 4, "saves attempted: {}", store.attempts());
}

#[tokio::test(start_paused = true)]
async fn loop_survives_failing_snapshots() {
    let clock = Arc::new(TokioClock {
        start: Instant::now(),
    });
    let store = Arc::new(ReadOnlyStore::default());
    let monitor = Arc::new(Monitor::new(
        clock.clone(),
        Arc::new(RecordingGateway::new()),
        Box::new(store.clone()),
        &Config::default(),
    ));
    monitor
        .configure(vec![LimitEntry::new("com.video", 15)])
        .unwrap();
    let mut rx = monitor.subscribe();

    let handle = runtime::spawn(monitor.clone(), &Config::default().monitor, None);
    handle
        .send(ForegroundEvent::new("com.video", clock.now_ms()))
        .await
        .unwrap();

    // Past one periodic snapshot and the block at 15 seconds.
    time::sleep(Duration::from_millis(16_500)).await;
    assert!(monitor.is_running());
    assert!(monitor.is_blocked("com.video"));

    handle.stop().await;
    assert!(!monitor.is_running());

    let mut saw_blocked = false;
    let mut saw_stop = false;
    while let Ok(event) = rx.try_recv() {
        saw_blocked |= matches!(event, Event::Blocked { .. });
        saw_stop |= matches!(event, Event::MonitoringStopped { .. });
    }
    assert!(saw_blocked);
    assert!(saw_stop);
    assert!(store.attempts() >= 3);
}
