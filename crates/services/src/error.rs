//! Capability call error types.

use thiserror::Error;

/// Errors that can occur while calling an external capability.
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// The capability endpoint could not be reached.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The capability answered with a non-success status.
    #[error("Service returned {code}: {body}")]
    Status { code: u16, body: String },

    /// The capability's response could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A referenced resource does not exist on the service side.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Local process execution failed.
    #[error("Process error: {0}")]
    Process(String),

    /// The call exceeded its deadline.
    #[error("Call timed out after {0} seconds")]
    Timeout(u64),

    /// I/O error while staging a local execution.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<reqwest::Error> for CapabilityError {
    fn from(e: reqwest::Error) -> Self {
        CapabilityError::Http(e.to_string())
    }
}

impl From<serde_json::Error> for CapabilityError {
    fn from(e: serde_json::Error) -> Self {
        CapabilityError::Decode(e.to_string())
    }
}

impl From<std::io::Error> for CapabilityError {
    fn from(e: std::io::Error) -> Self {
        CapabilityError::Io(e.to_string())
    }
}
