//! Output sinks for status views and outage alerts.
//!
//! The engine decides *what* to show and *when* to alert; sinks own delivery.
//!
//! - [`DisplaySink`]: renders a scope's live status view, editing in place
//!   once a message identity exists
//! - [`AlertSink`]: delivers one combined alert per scope per cycle
//!
//! Implementations:
//!
//! - [`LogSink`]: writes views and alerts to the tracing output
//! - [`WebhookSink`]: posts Discord-compatible webhook messages

mod log;
mod render;
mod webhook;

pub use self::log::LogSink;
pub use render::{alert_text, StatusView, ViewStyle, DEFAULT_STATUS_PAGE, DEFAULT_TITLE};
pub use webhook::WebhookSink;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use chubwatch_types::{AlertTarget, DisplayTarget, ScopeId, Snapshot};

use crate::data::AlertEvents;

/// Errors returned by sinks.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The request could not be delivered.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The receiving end answered with an error status.
    #[error("sink rejected the request with HTTP {status}: {detail}")]
    Rejected { status: u16, detail: String },

    /// The payload could not be built or the response could not be read.
    #[error("encoding error: {0}")]
    Encode(String),
}

impl From<reqwest::Error> for SinkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SinkError::Encode(err.to_string())
        } else {
            SinkError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(err: serde_json::Error) -> Self {
        SinkError::Encode(err.to_string())
    }
}

/// Everything a display sink needs to render one scope's view.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub scope: ScopeId,
    pub target: DisplayTarget,
    pub snapshot: Snapshot,
    /// `(entity, visual history)` in canonical entity order.
    pub lines: Vec<(String, String)>,
    /// Marker to advertise when the scope has alerts configured.
    pub subscription: Option<String>,
    /// Expected upstream refresh cadence.
    pub upstream_interval: Duration,
}

/// One scope's outage transitions for one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertBatch {
    pub scope: ScopeId,
    pub target: AlertTarget,
    pub newly_down: Vec<String>,
    pub newly_recovered: Vec<String>,
}

impl AlertBatch {
    pub fn new(scope: ScopeId, target: AlertTarget, events: AlertEvents) -> Self {
        Self {
            scope,
            target,
            newly_down: events.newly_down,
            newly_recovered: events.newly_recovered,
        }
    }
}

/// Renders status views.
#[async_trait]
pub trait DisplaySink: Send + Sync {
    /// Render or refresh the view.
    ///
    /// Returns the identity of a newly created message, or `None` when an
    /// existing message was edited in place.
    async fn render(&self, request: &RenderRequest) -> Result<Option<String>, SinkError>;
}

/// Delivers outage alerts.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn dispatch(&self, batch: &AlertBatch) -> Result<(), SinkError>;
}
