//! Core domain errors.

use thiserror::Error;

/// Core domain errors for qarun.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A channel payload could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A page origin or collaborator address is malformed.
    #[error("Invalid origin: {0}")]
    InvalidOrigin(String),
}
