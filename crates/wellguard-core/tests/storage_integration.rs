//! Integration tests for persistence through the SQLite store.

use std::sync::Arc;

use tempfile::TempDir;
use wellguard_core::persistence::{keys, StateStore};
use wellguard_core::{
    Clock, Config, Database, ForegroundEvent, LimitEntry, ManualClock, Monitor, RecordingGateway,
};

const T0: i64 = 1_735_689_600_000;

fn open_monitor(dir: &TempDir, clock: &Arc<ManualClock>) -> Monitor {
    let db = Database::open_at(&dir.path().join("wellguard.db")).unwrap();
    Monitor::new(
        clock.clone(),
        Arc::new(RecordingGateway::new()),
        Box::new(db),
        &Config::default(),
    )
}

#[test]
fn process_restart_through_sqlite_keeps_state() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(T0));

    let monitor = open_monitor(&dir, &clock);
    monitor
        .configure(vec![
            LimitEntry::new("com.video", 20),
            LimitEntry::new("com.chat", 100),
        ])
        .unwrap();
    monitor.on_foreground_changed(ForegroundEvent::new("com.video", clock.now_ms()));
    for _ in 0..25 {
        clock.advance_secs(1);
        monitor.tick();
    }
    monitor.on_foreground_changed(ForegroundEvent::new("com.chat", clock.now_ms()));
    clock.advance_secs(40);
    monitor.tick();
    monitor.shutdown();
    let before = monitor.usage_snapshot();
    drop(monitor);

    let restarted = open_monitor(&dir, &clock);
    assert_eq!(restarted.usage_snapshot(), before);
    assert_eq!(restarted.blocked_apps(), vec!["com.video".to_string()]);

    // Restored milestones stay fired.
    let events = restarted.on_foreground_changed(ForegroundEvent::new("com.chat", clock.now_ms()));
    assert!(events.is_empty(), "unexpected events {events:?}");
    clock.advance_secs(1);
    assert!(restarted.tick().is_empty());
}

#[test]
fn corrupt_row_only_loses_its_own_key() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(T0));

    let monitor = open_monitor(&dir, &clock);
    monitor
        .configure(vec![
            LimitEntry::new("com.video", 60).with_blocked(true),
            LimitEntry::new("com.chat", 100).with_usage(42),
        ])
        .unwrap();
    drop(monitor);

    let db = Database::open_at(&dir.path().join("wellguard.db")).unwrap();
    db.kv_set(keys::USAGE, "{\"com.chat\": \"forty-two\"}").unwrap();
    db.kv_set(keys::SHOWN_WELCOME, "garbage").unwrap();
    drop(db);

    let restarted = open_monitor(&dir, &clock);
    let usage = restarted.usage_snapshot();
    assert_eq!(usage.len(), 2);
    let chat = usage.iter().find(|r| r.package_id == "com.chat").unwrap();
    assert_eq!(chat.usage_seconds, 0);
    // The blocked set still holds, so the block survives losing usage.
    assert!(restarted.is_blocked("com.video"));
}

#[test]
fn snapshot_rows_are_plain_json() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(T0));
    let monitor = open_monitor(&dir, &clock);
    monitor
        .configure(vec![LimitEntry::new("com.video", 60).with_usage(30)])
        .unwrap();
    drop(monitor);

    let db = Database::open_at(&dir.path().join("wellguard.db")).unwrap();
    let limits: serde_json::Value =
        serde_json::from_str(&db.load(keys::LIMITS).unwrap().unwrap()).unwrap();
    assert_eq!(limits["com.video"], 60);
    let usage: serde_json::Value =
        serde_json::from_str(&db.load(keys::USAGE).unwrap().unwrap()).unwrap();
    assert_eq!(usage["com.video"], 30);
}
