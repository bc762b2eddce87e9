//! Deterministic replay of a foreground script.
//!
//! Each non-blank line is `SECS COMMAND`, where `SECS` is the offset from the
//! start of the script and offsets never decrease:
//!
//! ```text
//! # a video app capped at one minute
//! 0   configure com.video=60 com.chat=10m
//! 0   open com.video
//! 75  open com.chat
//! 90  unblock com.video
//! ```
//!
//! `SECS PKG` is shorthand for `SECS open PKG`. The monitor runs on a
//! virtual clock over an in-memory store and ticks at the configured tick
//! interval; every event is printed as a JSON line.

use std::path::Path;
use std::sync::Arc;

use wellguard_core::{
    Config, ForegroundEvent, LimitEntry, LogGateway, ManualClock, MemoryStore, Monitor,
};

use super::{parse_app, print_event};

#[derive(Debug, Clone, PartialEq)]
enum Action {
    Configure(Vec<LimitEntry>),
    Open(String),
    Unblock(String),
}

#[derive(Debug, Clone, PartialEq)]
struct Step {
    at_secs: u64,
    line: usize,
    action: Action,
}

fn parse_script(text: &str) -> Result<Vec<Step>, String> {
    let mut steps: Vec<Step> = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        let content = raw.split('#').next().unwrap_or_default().trim();
        if content.is_empty() {
            continue;
        }
        let err = |msg: String| format!("line {line}: {msg}");
        let mut words = content.split_whitespace();
        let at_secs: u64 = words
            .next()
            .unwrap_or_default()
            .parse()
            .map_err(|_| err("expected a seconds offset".into()))?;
        if steps.last().is_some_and(|s| s.at_secs > at_secs) {
            return Err(err("offsets must not decrease".into()));
        }
        let args: Vec<&str> = words.collect();
        let action = match args.as_slice() {
            ["configure", specs @ ..] => Action::Configure(
                specs
                    .iter()
                    .map(|s| parse_app(s))
                    .collect::<Result<_, _>>()
                    .map_err(err)?,
            ),
            ["open", pkg] | [pkg] => Action::Open((*pkg).to_string()),
            ["unblock", pkg] => Action::Unblock((*pkg).to_string()),
            _ => return Err(err(format!("cannot read {content:?}"))),
        };
        steps.push(Step {
            at_secs,
            line,
            action,
        });
    }
    Ok(steps)
}

fn apply(monitor: &Monitor, step: &Step) -> Result<(), String> {
    let result = match &step.action {
        Action::Configure(entries) => monitor.configure(entries.clone()).map(drop),
        Action::Open(pkg) => {
            monitor.on_foreground_changed(ForegroundEvent::new(pkg.as_str(), monitor.now_ms()));
            Ok(())
        }
        Action::Unblock(pkg) => monitor.unblock_app(pkg).map(drop),
    };
    result.map_err(|e| format!("line {}: {e}", step.line))
}

pub fn run(path: &Path, until: Option<u64>) -> Result<(), Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)?;
    let steps = parse_script(&text)?;
    let config = Config::load_or_default();
    let end_ms = until
        .or_else(|| steps.last().map(|s| s.at_secs))
        .unwrap_or(0)
        .saturating_mul(1000);
    let tick_ms = config.monitor.tick_interval_ms.max(1);

    let clock = Arc::new(ManualClock::new(0));
    let monitor = Monitor::new(
        clock.clone(),
        Arc::new(LogGateway),
        Box::new(MemoryStore::new()),
        &config,
    );
    let mut events = monitor.subscribe();
    let mut pending = steps.iter().peekable();

    let mut now = 0u64;
    loop {
        clock.set(i64::try_from(now)?);
        while let Some(step) = pending.next_if(|s| s.at_secs.saturating_mul(1000) <= now) {
            apply(&monitor, step)?;
        }
        monitor.tick();
        while let Ok(event) = events.try_recv() {
            print_event(&event)?;
        }
        if now >= end_ms {
            break;
        }
        now = now.saturating_add(tick_ms).min(end_ms);
    }

    monitor.shutdown();
    while let Ok(event) = events.try_recv() {
        print_event(&event)?;
    }
    Ok(())
}
