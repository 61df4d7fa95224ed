//! # chubwatch
//!
//! Status tracking and outage alerting for the Chub.ai model fleet.
//!
//! The engine polls the public status document, keeps a short rolling history
//! of every model's health for display, and turns raw health samples into
//! "down" and "recovered" alerts with hysteresis so a single bad sample does
//! not page anyone.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            Poller                                │
//! │  ┌─────────┐    ┌──────────────┐    ┌────────────┐    ┌───────┐  │
//! │  │ source  │───▶│ data         │───▶│ sink       │───▶│ Views │  │
//! │  │ (fetch) │    │ (history,    │    │ (render,   │    │Alerts │  │
//! │  └─────────┘    │  alerts)     │    │  dispatch) │    └───────┘  │
//! │                 └──────┬───────┘    └────────────┘               │
//! │                        ▼                                         │
//! │                 ┌──────────────┐                                 │
//! │                 │ store        │◀── SqliteStore | MemoryStore    │
//! │                 └──────────────┘                                 │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`source`]**: the [`StatusSource`] trait with HTTP and file implementations
//! - **[`data`]**: [`HistoryTracker`] ring buffers, the hysteresis [`AlertEngine`],
//!   uptime grading and duration parsing
//! - **[`store`]**: the [`Store`] persistence gateway
//! - **[`sink`]**: [`DisplaySink`] and [`AlertSink`] hand-off points
//! - **[`poller`]**: the [`Poller`] that drives one cycle per tick
//! - **[`config`]**: [`Settings`] loaded from TOML and the environment
//!
//! ## Usage
//!
//! ### As a CLI tool
//!
//! ```bash
//! # Poll forever with settings from chubwatch.toml
//! chubwatch run
//!
//! # Replay a captured payload once
//! chubwatch run --once --file status.json
//!
//! # Send outage alerts for a scope to a webhook
//! chubwatch scope alerts guild-1 https://discord.com/api/webhooks/... "<@&123>"
//! ```
//!
//! ### As a library
//!
//! ```no_run
//! use std::sync::Arc;
//! use chubwatch::{FileSource, LogSink, MemoryStore, Poller, PollerOptions};
//!
//! # tokio_test::block_on(async {
//! let options = PollerOptions::default();
//! let source = FileSource::new("status.json", options.entities.clone());
//! let sink = Arc::new(LogSink::default());
//!
//! let mut poller = Poller::restore(
//!     options,
//!     Box::new(source),
//!     Arc::new(MemoryStore::new()),
//!     sink.clone(),
//!     sink,
//! )?;
//! poller.run_cycle().await;
//! # Ok::<_, chubwatch::StoreError>(())
//! # });
//! ```

pub mod config;
pub mod data;
pub mod poller;
pub mod sink;
pub mod source;
pub mod store;

// Re-export main types for convenience
pub use chubwatch_types::{
    AlertState, AlertTarget, DisplayTarget, EntitySample, HealthLevel, ScopeConfig, ScopeId,
    Snapshot,
};
pub use config::Settings;
pub use data::{AlertEngine, AlertEvents, AlertPolicy, AlertTransition, HistoryTracker};
pub use poller::{CycleOutcome, CycleReport, Poller, PollerOptions};
pub use sink::{AlertBatch, AlertSink, DisplaySink, LogSink, RenderRequest, SinkError, WebhookSink};
pub use source::{FileSource, HttpSource, StatusSource};
pub use store::{MemoryStore, SampleRecord, SqliteStore, Store, StoreError, UptimeStats};
