//! Common error types for dripsync.

use thiserror::Error;

/// Top-level error type for dripsync operations.
///
/// Every variant is local and non-fatal: callers log it and let the
/// scheduler's retry timing deal with the consequences.
#[derive(Debug, Error)]
pub enum Error {
    /// No link to the companion process; the attempt was aborted.
    #[error("Transport disconnected")]
    TransportDisconnected,

    /// The companion did not answer within the request timeout.
    #[error("Request timed out after {0} ms")]
    RequestTimeout(u64),

    /// The transport reported a failure while delivering a request.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The companion answered with a payload that could not be parsed.
    #[error("Payload parse error: {0}")]
    PayloadParse(String),

    /// The persisted config blob is corrupt.
    #[error("Config parse error: {0}")]
    ConfigParse(String),

    /// The cursor store rejected a read or write.
    #[error("Store error: {0}")]
    Store(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Whether this error means the attempt never reached the companion.
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Error::TransportDisconnected)
    }

    /// Whether this error is the request timeout outcome.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::RequestTimeout(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
