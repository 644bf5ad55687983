//! Error types for the wire protocol.

/// Errors produced while decoding payloads or parsing commands.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid command: {0}")]
    InvalidCommand(String),
}
