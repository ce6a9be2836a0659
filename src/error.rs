//! Error types for the relay
//!
//! Defines connection-level errors and member send errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Every variant is scoped to a single connection; none of them
/// affect other connections or the registry.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal for the connection)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Outbound channel of a member is closed
    #[error("Send error: {0}")]
    Send(#[from] SendError),

    /// One of `folderId`, `userId`, `userName` was absent or empty
    #[error("Missing required parameters")]
    MissingParameters,

    /// Inbound payload was valid JSON but not an envelope object
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(String),
}

/// Message send errors
///
/// Occurs when queueing a frame for a member whose connection has gone away.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,
}
