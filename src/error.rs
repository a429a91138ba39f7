//! Error types for spread-client.

use thiserror::Error;

use crate::session::SessionState;

/// Main error type for all spread-client operations.
#[derive(Debug, Error)]
pub enum SpreadError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while loading configuration.
    #[error("config JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration (empty name, oversized channel, port 0, ...).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Protocol error (malformed frame, oversized length field, padding
    /// contract violation, ...).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Operation attempted in a session state that does not permit it.
    #[error("operation not permitted in state {0:?}")]
    InvalidState(SessionState),

    /// Connection closed unexpectedly.
    #[error("connection closed")]
    ConnectionClosed,
}

/// Result type alias using SpreadError.
pub type Result<T> = std::result::Result<T, SpreadError>;
