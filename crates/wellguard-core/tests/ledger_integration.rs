//! Integration tests for the monitor's externally observable behaviour.
//!
//! These drive a `Monitor` on a virtual clock the way a platform service
//! would: configure, report foreground changes, tick once per second.

use std::sync::Arc;

use wellguard_core::persistence::{self, MemoryStore, StateStore};
use wellguard_core::{
    Clock, Config, Event, ForegroundEvent, LimitEntry, ManualClock, Milestone, Monitor, RecordingGateway,
};

const T0: i64 = 1_735_689_600_000;

fn monitor() -> (Arc<ManualClock>, Arc<RecordingGateway>, Arc<MemoryStore>, Monitor) {
    let clock = Arc::new(ManualClock::new(T0));
    let gateway = Arc::new(RecordingGateway::new());
    let store = Arc::new(MemoryStore::new());
    let monitor = Monitor::new(
        clock.clone(),
        gateway.clone(),
        Box::new(store.clone()),
        &Config::default(),
    );
    (clock, gateway, store, monitor)
}

fn open(clock: &ManualClock, monitor: &Monitor, pkg: &str) -> Vec<Event> {
    monitor.on_foreground_changed(ForegroundEvent::new(pkg, clock.now_ms()))
}

fn tick_for(clock: &ManualClock, monitor: &Monitor, secs: u32) -> Vec<Event> {
    let mut events = Vec::new();
    for _ in 0..secs {
        clock.advance_secs(1);
        events.extend(monitor.tick());
    }
    events
}

fn blocked_count(events: &[Event]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, Event::Blocked { .. }))
        .count()
}

fn milestone_percents(events: &[Event]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Milestone { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect()
}

#[test]
fn sixty_ticked_seconds_block_exactly_once() {
    let (clock, _gw, _store, monitor) = monitor();
    monitor
        .configure(vec![LimitEntry::new("com.video", 60)])
        .unwrap();
    open(&clock, &monitor, "com.video");

    let first = tick_for(&clock, &monitor, 59);
    assert_eq!(blocked_count(&first), 0);
    assert!(!monitor.is_blocked("com.video"));

    let limit = tick_for(&clock, &monitor, 1);
    assert_eq!(blocked_count(&limit), 1);
    assert!(monitor.is_blocked("com.video"));

    let after = tick_for(&clock, &monitor, 30);
    assert_eq!(blocked_count(&after), 0);
    assert_eq!(monitor.usage_snapshot()[0].usage_seconds, 60);
}

#[test]
fn jump_from_twenty_to_eighty_five_percent_fires_both_milestones() {
    let (clock, _gw, _store, monitor) = monitor();
    monitor
        .configure(vec![LimitEntry::new("com.video", 100).with_usage(20)])
        .unwrap();
    open(&clock, &monitor, "com.video");

    clock.advance_secs(65);
    let events = monitor.tick();
    assert_eq!(milestone_percents(&events), vec![30, 70]);
    assert_eq!(blocked_count(&events), 0);
    assert_eq!(monitor.usage_snapshot()[0].usage_seconds, 85);

    let later = tick_for(&clock, &monitor, 5);
    assert!(milestone_percents(&later).is_empty());
}

#[test]
fn restart_restores_identical_usage_snapshot() {
    let (clock, _gw, store, monitor) = monitor();
    monitor
        .configure(vec![
            LimitEntry::new("com.video", 60),
            LimitEntry::new("com.chat", 30),
            LimitEntry::new("com.news", 600).with_usage(100),
        ])
        .unwrap();
    open(&clock, &monitor, "com.video");
    tick_for(&clock, &monitor, 25);
    open(&clock, &monitor, "com.chat");
    tick_for(&clock, &monitor, 31);
    monitor.persist().unwrap();
    let before = monitor.usage_snapshot();
    drop(monitor);

    let restarted = Monitor::new(
        clock.clone(),
        Arc::new(RecordingGateway::new()),
        Box::new(store.clone()),
        &Config::default(),
    );
    assert_eq!(restarted.usage_snapshot(), before);
    assert!(restarted.is_blocked("com.chat"));

    let ledger = persistence::restore(&store.load_snapshot());
    let video = ledger.get("com.video").unwrap();
    assert!(video.milestones_fired.contains(Milestone::ThirtyPercent));
    assert!(!video.milestones_fired.contains(Milestone::SeventyPercent));
}

#[test]
fn restart_never_refires_a_milestone() {
    let (clock, _gw, store, monitor) = monitor();
    monitor
        .configure(vec![LimitEntry::new("com.video", 100)])
        .unwrap();
    open(&clock, &monitor, "com.video");
    let events = tick_for(&clock, &monitor, 35);
    assert_eq!(milestone_percents(&events), vec![30]);
    drop(monitor);

    let restarted = Monitor::new(
        clock.clone(),
        Arc::new(RecordingGateway::new()),
        Box::new(store.clone()),
        &Config::default(),
    );
    let first = open(&clock, &restarted, "com.video");
    assert!(first.is_empty(), "welcome already shown: {first:?}");
    let events = tick_for(&clock, &restarted, 40);
    assert_eq!(milestone_percents(&events), vec![70]);
}

#[test]
fn unblock_twice_equals_unblock_once() {
    let (clock, _gw, _store, once) = monitor();
    let (_c2, _g2, _s2, twice) = monitor();
    for m in [&once, &twice] {
        m.configure(vec![
            LimitEntry::new("com.video", 60).with_blocked(true),
            LimitEntry::new("com.chat", 60),
        ])
        .unwrap();
        open(&clock, m, "com.chat");
    }

    once.unblock_app("com.video").unwrap();
    twice.unblock_app("com.video").unwrap();
    twice.unblock_app("com.video").unwrap();

    assert_eq!(once.usage_snapshot(), twice.usage_snapshot());
    assert_eq!(once.blocked_apps(), twice.blocked_apps());
    assert!(once.blocked_apps().is_empty());
}

#[test]
fn untracked_and_blocked_apps_do_not_accrue() {
    let (clock, _gw, _store, monitor) = monitor();
    monitor
        .configure(vec![
            LimitEntry::new("com.video", 60).with_blocked(true),
            LimitEntry::new("com.chat", 60),
        ])
        .unwrap();

    open(&clock, &monitor, "com.mail");
    tick_for(&clock, &monitor, 10);
    open(&clock, &monitor, "com.video");
    tick_for(&clock, &monitor, 10);

    let usage: Vec<_> = monitor
        .usage_snapshot()
        .into_iter()
        .map(|r| (r.package_id, r.usage_seconds))
        .collect();
    assert_eq!(
        usage,
        vec![("com.chat".to_string(), 0), ("com.video".to_string(), 60)]
    );
}

#[test]
fn reconfigure_keeps_usage_and_drops_missing_packages() {
    let (clock, _gw, _store, monitor) = monitor();
    monitor
        .configure(vec![
            LimitEntry::new("com.video", 100),
            LimitEntry::new("com.chat", 100),
        ])
        .unwrap();
    open(&clock, &monitor, "com.video");
    tick_for(&clock, &monitor, 40);

    let events = monitor
        .configure(vec![LimitEntry::new("com.video", 50)])
        .unwrap();
    assert!(matches!(events.last(), Some(Event::Configured { tracked: 1, .. })));
    let snapshot = monitor.usage_snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].usage_seconds, 40);

    // 41 of 50: both milestones fire again on the next credit.
    let events = tick_for(&clock, &monitor, 1);
    assert_eq!(milestone_percents(&events), vec![30, 70]);
}

#[test]
fn configure_rejects_bad_input_without_changing_state() {
    let (_clock, _gw, _store, monitor) = monitor();
    monitor
        .configure(vec![LimitEntry::new("com.video", 60)])
        .unwrap();
    let err = monitor
        .configure(vec![LimitEntry::new("", 60)])
        .unwrap_err();
    assert!(err.to_string().contains("must not be empty"));
    assert_eq!(monitor.usage_snapshot().len(), 1);
}

#[test]
fn backwards_clock_does_not_decrement() {
    let (clock, _gw, _store, monitor) = monitor();
    monitor
        .configure(vec![LimitEntry::new("com.video", 600)])
        .unwrap();
    open(&clock, &monitor, "com.video");
    tick_for(&clock, &monitor, 10);
    clock.advance_secs(-3600);
    monitor.tick();
    assert_eq!(monitor.usage_snapshot()[0].usage_seconds, 10);
    tick_for(&clock, &monitor, 5);
    assert_eq!(monitor.usage_snapshot()[0].usage_seconds, 15);
}
