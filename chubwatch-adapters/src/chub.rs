//! Chub status adapter using the public health endpoint.
//!
//! The endpoint serves a JSON document with a newest-first history of health
//! records. Upstream refreshes it roughly every five minutes, so most polls
//! see an identical body; pair the adapter with a [`ChangeGate`] to skip
//! reparsing those.
//!
//! ## Example
//!
//! ```rust,no_run
//! use chubwatch_adapters::chub::ChubAdapter;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let adapter = ChubAdapter::builder()
//!         .timeout(Duration::from_secs(30))
//!         .build()?;
//!
//!     let snapshot = adapter.collect().await?;
//!
//!     for entity in snapshot.iter() {
//!         println!("{}: {} ({} ms)", entity.name, entity.health, entity.avg_latency);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! [`ChangeGate`]: crate::ChangeGate

use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use chubwatch_types::Snapshot;

use crate::{AdapterError, StatusParser, DEFAULT_ENTITIES};

/// Public status endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://gateway.chub.ai/monitoring/health/public/status";

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Adapter for fetching the remote status document.
#[derive(Debug, Clone)]
pub struct ChubAdapter {
    client: Client,
    endpoint: String,
    parser: StatusParser,
}

impl ChubAdapter {
    /// Create a new builder for configuring the adapter.
    pub fn builder() -> ChubAdapterBuilder {
        ChubAdapterBuilder::default()
    }

    /// The endpoint this adapter polls.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The parser used by [`collect`](Self::collect).
    pub fn parser(&self) -> &StatusParser {
        &self.parser
    }

    /// Fetch the raw status body.
    ///
    /// Any non-success response is an error; the body is not inspected.
    pub async fn fetch_body(&self) -> Result<Vec<u8>, AdapterError> {
        let response = self.client.get(&self.endpoint).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        debug!(bytes = body.len(), "Fetched status body");
        Ok(body.to_vec())
    }

    /// Fetch and parse the current snapshot.
    pub async fn collect(&self) -> Result<Snapshot, AdapterError> {
        let body = self.fetch_body().await?;
        self.parser.try_parse(&body)
    }
}

/// Builder for ChubAdapter.
#[derive(Debug, Default)]
pub struct ChubAdapterBuilder {
    endpoint: Option<String>,
    entities: Option<Vec<String>>,
    timeout: Option<Duration>,
    no_proxy: bool,
}

impl ChubAdapterBuilder {
    /// Set the status endpoint URL.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the entities to extract, in display order.
    pub fn entities<I, S>(mut self, entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entities = Some(entities.into_iter().map(Into::into).collect());
        self
    }

    /// Set the request timeout (default: 30 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Ignore proxy settings from the environment.
    pub fn no_proxy(mut self) -> Self {
        self.no_proxy = true;
        self
    }

    /// Build the adapter.
    pub fn build(self) -> Result<ChubAdapter, AdapterError> {
        let mut client = Client::builder()
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .user_agent(concat!("chubwatch/", env!("CARGO_PKG_VERSION")));
        if self.no_proxy {
            client = client.no_proxy();
        }

        let parser = match self.entities {
            Some(entities) => StatusParser::new(entities),
            None => StatusParser::new(DEFAULT_ENTITIES.iter().copied()),
        };

        Ok(ChubAdapter {
            client: client.build()?,
            endpoint: self
                .endpoint
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            parser,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const BODY: &str = r#"{"history":[{"api":"green","updated":"2024-01-15T10:30:00Z",
        "inference":{"asha":{"health":"green","avg":850,"timeout":0.01,"fail":0}}}]}"#;

    /// Serve one canned HTTP response per accepted connection.
    async fn serve(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{addr}/status")
    }

    #[test]
    fn test_builder_defaults() {
        let adapter = ChubAdapter::builder().build().unwrap();
        assert_eq!(adapter.endpoint(), DEFAULT_ENDPOINT);
        assert_eq!(adapter.parser().entities().len(), DEFAULT_ENTITIES.len());
    }

    #[test]
    fn test_builder_custom() {
        let adapter = ChubAdapter::builder()
            .endpoint("http://status.local/health")
            .entities(["asha", "soji"])
            .timeout(Duration::from_secs(5))
            .no_proxy()
            .build()
            .unwrap();

        assert_eq!(adapter.endpoint(), "http://status.local/health");
        assert_eq!(adapter.parser().entities(), ["asha", "soji"]);
    }

    #[tokio::test]
    async fn test_collect_parses_body() {
        let url = serve("200 OK", BODY).await;
        let adapter = ChubAdapter::builder().endpoint(url).no_proxy().build().unwrap();

        let snapshot = adapter.collect().await.unwrap();
        assert_eq!(snapshot.timestamp_ms, 1_705_314_600_000);
        assert_eq!(snapshot.len(), 1);
        assert!((snapshot.get("asha").unwrap().timeout_pct - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let url = serve("503 Service Unavailable", "{}").await;
        let adapter = ChubAdapter::builder().endpoint(url).no_proxy().build().unwrap();

        let err = adapter.fetch_body().await.unwrap_err();
        assert!(matches!(err, AdapterError::Status(503)));
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let adapter = ChubAdapter::builder()
            .endpoint(format!("http://{addr}/status"))
            .timeout(Duration::from_secs(2))
            .no_proxy()
            .build()
            .unwrap();

        let err = adapter.fetch_body().await.unwrap_err();
        assert!(err.is_transport(), "unexpected error: {err}");
    }
}
