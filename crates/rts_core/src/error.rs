//! Error types for the match simulation.
//!
//! Command rejections are not errors: they are ordinary outcomes carried by
//! [`crate::commands::Rejection`]. `GameError` covers content loading and
//! internal invariant failures.

use thiserror::Error;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for the simulation core.
#[derive(Debug, Error)]
pub enum GameError {
    /// A content id string did not name a known entry.
    #[error("Unknown {kind} id: {id}")]
    UnknownContent {
        /// Which table was searched ("unit", "building", ...).
        kind: &'static str,
        /// The id that failed to resolve.
        id: String,
    },

    /// Content file parsing error.
    #[error("Failed to parse content '{path}': {message}")]
    DataParseError {
        /// Path (or label) of the content that failed to parse.
        path: String,
        /// Error message.
        message: String,
    },

    /// Content parsed but is inconsistent.
    #[error("Invalid content: {0}")]
    InvalidContent(String),

    /// Match creation parameters were out of range.
    #[error("Invalid match setup: {0}")]
    InvalidSetup(String),

    /// Entity not found.
    #[error("Entity not found: {0}")]
    EntityNotFound(u64),

    /// A cost could not be paid.
    #[error("Insufficient resources")]
    InsufficientResources,

    /// Invalid match state.
    #[error("Invalid match state: {0}")]
    InvalidState(String),

    /// State hashing failed.
    #[error("Failed to encode match state: {0}")]
    Encode(#[from] bincode::Error),
}
