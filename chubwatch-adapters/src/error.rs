//! Error types for adapters.

use thiserror::Error;

/// Errors that can occur when fetching or parsing a status payload.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The source answered with a non-success status code.
    #[error("Status source returned HTTP {0}")]
    Status(u16),

    /// Connection failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Timeout waiting for response.
    #[error("Request timed out")]
    Timeout,

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// The payload carried no history records.
    #[error("Status payload has no history records")]
    Empty,
}

impl AdapterError {
    /// True when the fetch itself could not complete.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            AdapterError::Http(_)
                | AdapterError::Status(_)
                | AdapterError::Connection(_)
                | AdapterError::Timeout
        )
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for AdapterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AdapterError::Timeout
        } else if err.is_connect() {
            AdapterError::Connection(err.to_string())
        } else if err.is_decode() {
            AdapterError::Parse(err.to_string())
        } else {
            AdapterError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AdapterError {
    fn from(err: serde_json::Error) -> Self {
        AdapterError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        assert!(AdapterError::Timeout.is_transport());
        assert!(AdapterError::Status(503).is_transport());
        assert!(AdapterError::Connection("refused".into()).is_transport());
        assert!(!AdapterError::Empty.is_transport());
        assert!(!AdapterError::Parse("eof".into()).is_transport());
    }

    #[test]
    fn test_json_error_becomes_parse_error() {
        let err: AdapterError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert!(matches!(err, AdapterError::Parse(_)));
    }
}
