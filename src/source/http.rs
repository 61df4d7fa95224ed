//! HTTP status source.

use async_trait::async_trait;
use tracing::{debug, warn};

use chubwatch_adapters::chub::ChubAdapter;
use chubwatch_adapters::{AdapterError, ChangeGate};
use chubwatch_types::Snapshot;

use super::StatusSource;

/// A source that polls the remote status endpoint.
///
/// Identical response bodies are recognised before parsing, so the frequent
/// polls between upstream refreshes cost one request and one byte compare.
#[derive(Debug)]
pub struct HttpSource {
    adapter: ChubAdapter,
    gate: ChangeGate,
    description: String,
    last_error: Option<String>,
}

impl HttpSource {
    pub fn new(adapter: ChubAdapter) -> Self {
        let description = format!("http: {}", adapter.endpoint());
        Self {
            adapter,
            gate: ChangeGate::new(),
            description,
            last_error: None,
        }
    }

    pub fn adapter(&self) -> &ChubAdapter {
        &self.adapter
    }
}

#[async_trait]
impl StatusSource for HttpSource {
    async fn fetch_if_changed(&mut self) -> (Option<Snapshot>, bool) {
        let body = match self.adapter.fetch_body().await {
            Ok(body) => body,
            Err(e) => {
                warn!(source = %self.description, "Status fetch failed: {}", e);
                self.last_error = Some(format!("Fetch error: {}", e));
                return (None, false);
            }
        };

        let parser = self.adapter.parser();
        let mut parse_error: Option<AdapterError> = None;
        let result = self.gate.observe(&body, |raw| match parser.try_parse(raw) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                parse_error = Some(e);
                None
            }
        });

        match parse_error {
            Some(e) => {
                warn!(source = %self.description, "Status payload unusable: {}", e);
                self.last_error = Some(format!("Parse error: {}", e));
            }
            None => {
                self.last_error = None;
                if !result.1 {
                    debug!(source = %self.description, "Status body unchanged");
                }
            }
        }
        result
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}
