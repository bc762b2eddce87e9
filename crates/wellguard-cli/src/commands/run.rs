//! Long-running monitor driven by the tokio runtime.
//!
//! Without `--stdin` the monitor only ticks and snapshots until Ctrl-C. With
//! it, stdin carries one input per line and end of input stops the loop:
//!
//! ```text
//! com.video                 foreground change, stamped now
//! com.video 1700000000000   foreground change at an epoch-ms timestamp
//! configure com.video=30m   replace the monitored apps
//! unblock com.video         lift a block
//! ```
//!
//! Events go to stdout as JSON lines. While running, the data directory is
//! locked so one-shot `configure`/`unblock` cannot be overwritten by the
//! loop's snapshots.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use wellguard_core::{runtime, Config, ForegroundEvent, LimitEntry, Monitor, RuntimeHandle};

use super::{open_monitor, parse_app, print_event, RunLock};

#[derive(Debug, Clone, PartialEq)]
enum Input {
    Foreground(ForegroundEvent),
    Configure(Vec<LimitEntry>),
    Unblock(String),
}

/// Parse one stdin line; blank lines and `#` comments yield `None`.
fn parse_line(line: &str, now_ms: i64) -> Result<Option<Input>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let words: Vec<&str> = line.split_whitespace().collect();
    let input = match words.as_slice() {
        ["configure", specs @ ..] => Input::Configure(
            specs
                .iter()
                .map(|s| parse_app(s))
                .collect::<Result<_, _>>()?,
        ),
        ["unblock", pkg] => Input::Unblock((*pkg).to_string()),
        [pkg] => Input::Foreground(ForegroundEvent::new(*pkg, now_ms)),
        [pkg, ts] => {
            let timestamp = ts
                .parse::<i64>()
                .map_err(|_| format!("invalid timestamp {ts:?}"))?;
            Input::Foreground(ForegroundEvent::new(*pkg, timestamp))
        }
        _ => return Err(format!("cannot read {line:?}")),
    };
    Ok(Some(input))
}

pub fn run(read_stdin: bool) -> Result<(), Box<dyn std::error::Error>> {
    let _lock = RunLock::acquire()?;
    let config = Config::load()?;
    let monitor = Arc::new(open_monitor(&config)?);
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(serve(monitor, &config, read_stdin))
}

async fn handle_input(
    monitor: &Monitor,
    handle: &RuntimeHandle,
    input: Input,
) -> Result<(), Box<dyn std::error::Error>> {
    match input {
        Input::Foreground(event) => handle.send(event).await?,
        Input::Configure(entries) => {
            if let Err(e) = monitor.configure(entries) {
                warn!(error = %e, "configure rejected");
            }
        }
        Input::Unblock(package) => {
            monitor.unblock_app(&package)?;
        }
    }
    Ok(())
}

async fn serve(
    monitor: Arc<Monitor>,
    config: &Config,
    read_stdin: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut events = monitor.subscribe();
    let handle = runtime::spawn(Arc::clone(&monitor), &config.monitor, None);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                if let Err(e) = res {
                    warn!(error = %e, "could not listen for ctrl-c");
                }
                info!("interrupted");
                break;
            }
            line = lines.next_line(), if read_stdin => {
                match line? {
                    Some(line) => match parse_line(&line, monitor.now_ms()) {
                        Ok(Some(input)) => handle_input(&monitor, &handle, input).await?,
                        Ok(None) => {}
                        Err(e) => warn!(error = %e, "ignoring input line"),
                    },
                    None => {
                        info!("end of input");
                        break;
                    }
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) => print_event(&event)?,
                    Err(RecvError::Lagged(n)) => warn!(skipped = n, "event output fell behind"),
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    handle.stop().await;
    while let Ok(event) = events.try_recv() {
        print_event(&event)?;
    }
    Ok(())
}
