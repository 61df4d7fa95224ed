//! # chubwatch-types
//!
//! Core types shared by every part of chubwatch. A status source produces
//! [`Snapshot`]s, the engine classifies them with [`HealthLevel`], tracks
//! hysteresis in [`AlertState`] and fans results out per [`ScopeConfig`].
//!
//! ## Features
//!
//! - `serde`: serialization of all public types via serde
//!
//! ## Example
//!
//! ```rust
//! use chubwatch_types::{HealthLevel, Snapshot};
//!
//! let snapshot = Snapshot::builder()
//!     .timestamp_ms(1703160000000)
//!     .api(HealthLevel::Healthy)
//!     .entity("asha", |e| e.health(HealthLevel::Healthy).latency(850))
//!     .entity("soji", |e| e.health(HealthLevel::Down).fail_pct(42.0))
//!     .build();
//!
//! assert_eq!(snapshot.len(), 2);
//! assert_eq!(snapshot.worst(), HealthLevel::Down);
//! ```

mod alert;
mod health;
mod scope;
mod snapshot;

pub use alert::*;
pub use health::*;
pub use scope::*;
pub use snapshot::*;
