//! Unified error type for starrysky.

use thiserror::Error;

/// Errors that can occur while talking to the webui API.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Missing or malformed client configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// A request violated a client-side contract and was never sent.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// The service answered with a non-200 status.
    #[error("Service error ({status}): {body}")]
    Service {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// An image could not be serialized or decoded.
    #[error("Image encoding error: {0}")]
    Encoding(String),

    /// A 200 response that could not be interpreted.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// A network error occurred.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A cassette could not serve the requested interaction.
    #[error("Replay error: {0}")]
    Replay(String),

    /// The background task behind a pending result did not complete.
    #[error("Background task failed: {0}")]
    Task(String),
}

impl ClientError {
    /// Status code of a [`ClientError::Service`] error.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Service { status, .. } => Some(*status),
            _ => None,
        }
    }
}
