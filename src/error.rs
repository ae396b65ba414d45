//! Error types for NoteCore.
//!
//! This module defines all error types used throughout the library.

use thiserror::Error;

/// Result type alias for NoteCore operations
pub type NoteResult<T> = Result<T, NoteError>;

/// Main error type for NoteCore operations
#[derive(Error, Debug)]
pub enum NoteError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Sync error: {0}")]
    Sync(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl NoteError {
    /// Create a new storage error
    pub fn storage(message: impl Into<String>) -> Self {
        NoteError::Storage(message.into())
    }

    /// Create a new network error
    pub fn network(message: impl Into<String>) -> Self {
        NoteError::Network(message.into())
    }

    /// Create a new remote (server-side) error
    pub fn remote(message: impl Into<String>) -> Self {
        NoteError::Remote(message.into())
    }

    /// Create a new sync error
    pub fn sync(message: impl Into<String>) -> Self {
        NoteError::Sync(message.into())
    }

    /// True when the error means "the other side could not be reached or
    /// refused the request". These are recovered through the local snapshot
    /// fallback rather than reported as failures.
    pub fn is_remote_unavailable(&self) -> bool {
        matches!(self, NoteError::Network(_) | NoteError::Remote(_))
    }
}

impl From<reqwest::Error> for NoteError {
    fn from(err: reqwest::Error) -> Self {
        NoteError::Network(err.to_string())
    }
}
