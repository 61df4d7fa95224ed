//! # chubwatch-adapters
//!
//! Status source adapters for chubwatch.
//!
//! This crate turns a remote health document into typed
//! [`Snapshot`](chubwatch_types::Snapshot)s:
//!
//! - [`StatusParser`] - lenient payload parser, always available
//! - [`ChangeGate`] - skips reparsing when the raw body has not changed
//! - [`chub::ChubAdapter`] (`http` feature) - fetches the public status endpoint
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chubwatch_adapters::{chub::ChubAdapter, ChangeGate};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adapter = ChubAdapter::builder().build()?;
//!     let mut gate = ChangeGate::new();
//!
//!     let body = adapter.fetch_body().await?;
//!     let (snapshot, changed) = gate.observe(&body, |raw| adapter.parser().parse(raw));
//!
//!     if let (Some(snapshot), true) = (snapshot, changed) {
//!         println!("New snapshot with {} entities", snapshot.len());
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod gate;
pub mod payload;

#[cfg(feature = "http")]
pub mod chub;

pub use error::AdapterError;
pub use gate::ChangeGate;
pub use payload::{StatusParser, DEFAULT_ENTITIES};

// Re-export types for convenience
pub use chubwatch_types::{EntitySample, HealthLevel, Snapshot};
