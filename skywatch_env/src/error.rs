//! Error types for the Skywatch environment abstraction.

use thiserror::Error;

/// Errors raised by external collaborators (feeds, lookups, context).
#[derive(Debug, Clone, Error)]
pub enum EnvError {
    /// Transport failed (DNS, connection reset, TLS, ...)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Remote answered with a non-success status
    #[error("HTTP status {status} from {source_name}")]
    HttpStatus { status: u16, source_name: String },

    /// Payload could not be decoded into the expected shape
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// Context operation failed
    #[error("Context error: {0}")]
    ContextError(String),

    /// Operation timed out
    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl EnvError {
    /// Creates a network error.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::NetworkError(msg.into())
    }

    /// Creates a decode error.
    pub fn decode(msg: impl std::fmt::Display) -> Self {
        Self::DecodeError(msg.to_string())
    }

    /// Creates an HTTP status error for the named source.
    pub fn http_status(status: u16, source_name: impl Into<String>) -> Self {
        Self::HttpStatus { status, source_name: source_name.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EnvError::http_status(503, "opensky");
        assert_eq!(err.to_string(), "HTTP status 503 from opensky");

        let err = EnvError::network("connection reset");
        assert_eq!(err.to_string(), "Network error: connection reset");
    }
}
