//! # Wellguard Core Library
//!
//! This library provides the core logic of the wellguard app-usage limiter.
//! It watches which application is in front, accumulates per-application
//! usage against a daily limit, announces the 30% and 70% milestones, and
//! blocks the application once its limit is reached. Like the CLI that ships
//! next to it, platform front ends are thin layers over this crate.
//!
//! ## Architecture
//!
//! - **Ledger**: authoritative usage/limit/block record; the caller drives it
//!   with foreground changes and periodic `tick()` calls
//! - **Blocking**: escalating presentation of the blocking surface
//! - **Persistence**: per-key snapshots in SQLite, restored on startup
//! - **Runtime**: tokio loop tying ticks, detection and snapshots together
//!
//! ## Key Components
//!
//! - [`Monitor`]: single owner of all monitoring state
//! - [`Ledger`]: usage accounting and milestone tracking
//! - [`BlockingCoordinator`]: presentation retries and fallback
//! - [`PresentationGateway`]: trait implemented by whatever renders notices
//! - [`Database`]: SQLite state store
//! - [`Config`]: TOML configuration

pub mod blocking;
pub mod clock;
pub mod error;
pub mod events;
pub mod gateway;
pub mod ledger;
pub mod messages;
pub mod monitor;
pub mod persistence;
pub mod runtime;
pub mod source;
pub mod storage;

pub use blocking::{BlockingCoordinator, EscalationPolicy, PresentationPending};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ConfigError, CoreError, StorageError, ValidationError};
pub use events::Event;
pub use gateway::{
    GatewayCall, LogGateway, Notice, NoticeKind, PresentationError, PresentationGateway,
    RecordingGateway, SurfaceKind,
};
pub use ledger::{AppState, Ledger, LimitEntry, Milestone, MilestoneSet, MonitoredApp, UsageRecord};
pub use monitor::{Monitor, MonitorStatus};
pub use persistence::{MemoryStore, Snapshot, StateStore};
pub use runtime::RuntimeHandle;
pub use source::{ChangeFilter, ForegroundEvent, ForegroundSampler, PollingSource, StaticSampler};
pub use storage::{Config, Database};
