//! Server errors.
//!
//! Failures here are transport or startup problems. Refused commands and
//! lobby requests are answered on the wire instead.

use thiserror::Error;

/// Errors the server can hit.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not be bound.
    #[error("failed to bind {address}: {source}")]
    Bind {
        /// Address that was tried.
        address: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Socket IO failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket protocol failure.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// A frame could not be encoded or decoded.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The content tables failed to load.
    #[error("content error: {0}")]
    Content(#[from] rts_core::error::GameError),

    /// An environment override could not be used.
    #[error("invalid configuration: {0}")]
    Config(String),
}
