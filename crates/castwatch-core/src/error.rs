//! Error types for the castwatch system
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for castwatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the castwatch system
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed session snapshot from the fetch (resource-scoped, skip-and-log)
    #[error("invalid session: {0}")]
    InvalidSession(String),

    /// Dedup store I/O failure (resource-scoped; status is not advanced)
    #[error("dedup store error: {0}")]
    Store(String),

    /// Message template or action table misconfiguration (recurs until fixed)
    #[error("render error: {0}")]
    Render(String),

    /// Outbound delivery failure (transient; retried by the next poll cycle)
    #[error("delivery error: {0}")]
    Delivery(String),

    /// Whole-batch fetch failure (no dispatch this cycle)
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Configuration errors (fatal at startup)
    #[error("configuration error: {0}")]
    Config(String),

    /// Aggregate dispatcher failure: at least one session in the batch failed
    #[error("{failed} session(s) failed in batch")]
    Dispatch {
        /// Number of sessions whose processing failed
        failed: usize,
    },

    /// I/O errors from the underlying storage medium
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an invalid session error
    pub fn invalid_session(msg: impl Into<String>) -> Self {
        Self::InvalidSession(msg.into())
    }

    /// Create a dedup store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a render error
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    /// Create a delivery error
    pub fn delivery(msg: impl Into<String>) -> Self {
        Self::Delivery(msg.into())
    }

    /// Create a fetch error
    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
