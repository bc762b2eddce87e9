//! Async driver for a [`Monitor`].
//!
//! One tokio task owns the loop and multiplexes:
//! - the tick interval (accrual and presentation deadlines)
//! - the detection interval, when a [`ForegroundSampler`] is attached
//! - the snapshot interval
//! - pushed [`ForegroundEvent`]s, minus repeats of the last package
//! - the shutdown signal
//!
//! Missed ticks are delayed rather than bursted; accrual is based on clock
//! readings, so a late tick just credits more whole seconds.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::{CoreError, Result};
use crate::monitor::Monitor;
use crate::source::{ChangeFilter, ForegroundEvent, ForegroundSampler, PollingSource};
use crate::storage::MonitorConfig;

const EVENT_QUEUE: usize = 64;

/// Handle to a running monitoring loop.
pub struct RuntimeHandle {
    monitor: Arc<Monitor>,
    events: mpsc::Sender<ForegroundEvent>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl RuntimeHandle {
    pub fn monitor(&self) -> &Arc<Monitor> {
        &self.monitor
    }

    /// Sender for push-style foreground adapters.
    pub fn sender(&self) -> mpsc::Sender<ForegroundEvent> {
        self.events.clone()
    }

    /// Queue a foreground change for the loop.
    ///
    /// # Errors
    /// Returns [`CoreError::Stopped`] once the loop has exited.
    pub async fn send(&self, event: ForegroundEvent) -> Result<()> {
        self.events.send(event).await.map_err(|_| CoreError::Stopped)
    }

    /// Ask the loop to stop and wait until the final snapshot is written.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            // The loop may already be gone.
            let _ = tx.send(());
        }
        if let Err(e) = self.task.await {
            warn!(error = %e, "monitoring task ended abnormally");
        }
    }
}

fn every(ms: u64) -> Interval {
    let period = Duration::from_millis(ms.max(1));
    let mut iv = interval_at(Instant::now() + period, period);
    iv.set_missed_tick_behavior(MissedTickBehavior::Delay);
    iv
}

/// Start the monitoring loop on the current tokio runtime.
pub fn spawn(
    monitor: Arc<Monitor>,
    config: &MonitorConfig,
    sampler: Option<Box<dyn ForegroundSampler>>,
) -> RuntimeHandle {
    let (events_tx, mut events_rx) = mpsc::channel::<ForegroundEvent>(EVENT_QUEUE);
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

    let mut tick = every(config.tick_interval_ms);
    let mut detect = every(config.detect_interval_ms);
    let mut snapshot = every(config.snapshot_interval_ms);
    let mut source = sampler.map(PollingSource::new);
    let mut pushed = ChangeFilter::new();

    let m = Arc::clone(&monitor);
    let task = tokio::spawn(async move {
        info!("monitoring loop started");
        let mut events_open = true;
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    debug!("shutdown requested");
                    break;
                }
                maybe = events_rx.recv(), if events_open => {
                    match maybe {
                        Some(event) => {
                            if let Some(event) = pushed.accept(event) {
                                m.on_foreground_changed(event);
                            }
                        }
                        None => {
                            debug!("foreground event channel closed");
                            events_open = false;
                        }
                    }
                }
                _ = tick.tick() => {
                    m.tick();
                    if !m.is_running() {
                        debug!("monitor stopped outside the loop");
                        break;
                    }
                }
                _ = detect.tick(), if source.is_some() => {
                    let now = m.now_ms();
                    if let Some(event) = source.as_mut().and_then(|s| s.poll(now)) {
                        m.on_foreground_changed(event);
                    }
                }
                _ = snapshot.tick() => {
                    if let Err(e) = m.persist() {
                        warn!(error = %e, "periodic snapshot failed");
                    }
                }
            }
        }
        // Changes queued before shutdown still count.
        while let Ok(event) = events_rx.try_recv() {
            if let Some(event) = pushed.accept(event) {
                m.on_foreground_changed(event);
            }
        }
        m.shutdown();
        info!("monitoring loop exited");
    });

    RuntimeHandle {
        monitor,
        events: events_tx,
        shutdown: Some(shutdown_tx),
        task,
    }
}
