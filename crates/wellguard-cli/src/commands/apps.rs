use std::path::PathBuf;

use wellguard_core::messages::format_duration;
use wellguard_core::{Config, Event, LimitEntry};

use super::{ensure_not_running, open_monitor};

fn read_entries(path: &PathBuf) -> Result<Vec<LimitEntry>, Box<dyn std::error::Error>> {
    let json = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}

pub fn configure(
    apps: Vec<LimitEntry>,
    file: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let entries = match file {
        Some(path) => read_entries(&path)?,
        None => apps,
    };
    ensure_not_running()?;
    let config = Config::load()?;
    let monitor = open_monitor(&config)?;
    let events = monitor.configure(entries)?;
    let tracked = events
        .iter()
        .find_map(|e| match e {
            Event::Configured { tracked, .. } => Some(*tracked),
            _ => None,
        })
        .unwrap_or(0);
    println!("tracking {tracked} apps");
    for pkg in monitor.blocked_apps() {
        println!("  {pkg} (blocked)");
    }
    Ok(())
}

pub fn unblock(package: &str) -> Result<(), Box<dyn std::error::Error>> {
    ensure_not_running()?;
    let config = Config::load()?;
    let monitor = open_monitor(&config)?;
    let events = monitor.unblock_app(package)?;
    if events.iter().any(|e| matches!(e, Event::Unblocked { .. })) {
        println!("unblocked {package}");
    } else {
        println!("{package} was not monitored");
    }
    Ok(())
}

pub fn blocked(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let monitor = open_monitor(&config)?;
    let blocked = monitor.blocked_apps();
    if json {
        println!("{}", serde_json::to_string_pretty(&blocked)?);
    } else if blocked.is_empty() {
        println!("no blocked apps");
    } else {
        for pkg in blocked {
            println!("{pkg}");
        }
    }
    Ok(())
}

pub fn usage(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let monitor = open_monitor(&config)?;
    let records = monitor.usage_snapshot();
    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("no apps configured");
        return Ok(());
    }
    for r in records {
        let pct = r.usage_seconds * 100 / r.limit_seconds.max(1);
        let state = if r.blocked { "blocked" } else { "tracking" };
        println!(
            "{}\t{} / {}\t{pct}%\t{state}",
            r.package_id,
            format_duration(r.usage_seconds),
            format_duration(r.limit_seconds),
        );
    }
    Ok(())
}

pub fn status() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let monitor = open_monitor(&config)?;
    println!("{}", serde_json::to_string_pretty(&monitor.status())?);
    Ok(())
}
