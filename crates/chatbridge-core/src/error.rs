//! Error types for `chatbridge` core library.

use thiserror::Error;

/// Result type alias using `chatbridge` Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `chatbridge` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Envelope could not be decoded
    #[error("Failed to decode envelope: {0}")]
    Envelope(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
