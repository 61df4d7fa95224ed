//! Sink that writes to the tracing output.

use async_trait::async_trait;
use tracing::{info, warn};

use super::{alert_text, AlertBatch, AlertSink, DisplaySink, RenderRequest, SinkError, StatusView, ViewStyle};

/// Logs status views and alerts instead of delivering them anywhere.
///
/// Never creates message identities, so every render is a fresh log entry.
#[derive(Debug, Clone, Default)]
pub struct LogSink {
    style: ViewStyle,
}

impl LogSink {
    pub fn new(style: ViewStyle) -> Self {
        Self { style }
    }
}

#[async_trait]
impl DisplaySink for LogSink {
    async fn render(&self, request: &RenderRequest) -> Result<Option<String>, SinkError> {
        let view = StatusView::build(request, &self.style);
        info!(
            scope = %request.scope,
            sink = %request.target.sink,
            timestamp_ms = request.snapshot.timestamp_ms,
            "{} | API {} | {}",
            view.title,
            view.api_line,
            view.entity_lines.join(" | ")
        );
        Ok(None)
    }
}

#[async_trait]
impl AlertSink for LogSink {
    async fn dispatch(&self, batch: &AlertBatch) -> Result<(), SinkError> {
        warn!(
            scope = %batch.scope,
            sink = %batch.target.sink,
            "{}",
            alert_text(batch).replace('\n', " | ")
        );
        Ok(())
    }
}
