//! Error types for the collaborator client.

use thiserror::Error;

use qarun_core::CoreError;

/// Errors that can occur when talking to the collaborator.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Failed to establish connection.
    #[error("connection failed: {0}")]
    Connection(String),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The collaborator answered with a non-success status.
    #[error("HTTP {status}: {path}")]
    Status { status: u16, path: String },

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration (origin, port, base URL).
    #[error(transparent)]
    Config(#[from] CoreError),

    /// The run monitor task is gone.
    #[error("run monitor stopped")]
    MonitorStopped,
}
