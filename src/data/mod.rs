//! Derived state built from status snapshots.
//!
//! ## Submodules
//!
//! - [`alert`]: hysteresis state machine turning samples into outage events
//! - [`duration`]: parsing and formatting of duration strings (e.g. "10s", "5m", "30d")
//! - [`history`]: bounded per-entity history for visual trend strips
//! - [`uptime`]: grading and formatting of uptime statistics
//!
//! ## Data Flow
//!
//! ```text
//! Snapshot (parsed payload)
//!        │
//!        ▼
//! HistoryTracker::ingest()  ── stale? ──▶ dropped
//!        │
//!        ├──▶ HistoryTracker::visual() (display strips)
//!        │
//!        └──▶ AlertEngine::evaluate() per alerting scope
//!                   │
//!                   ▼
//!              AlertEvents (batched per scope)
//! ```

pub mod alert;
pub mod duration;
pub mod history;
pub mod uptime;

pub use alert::{AlertEngine, AlertEvents, AlertPolicy, AlertTransition};
pub use history::{HistoryTracker, RingBuffer};
pub use uptime::UptimeGrade;
