//! Errors raised while talking to a language server.

use std::time::Duration;
use thiserror::Error;

pub type LspResult<T> = Result<T, LspError>;

#[derive(Debug, Error)]
pub enum LspError {
    /// The server went away mid-conversation.
    #[error("Connection to language server lost: {0}")]
    ConnectionFailed(String),

    #[error("Language server process error: {0}")]
    ProcessError(String),

    /// Malformed frame or message.
    #[error("LSP protocol error: {0}")]
    ProtocolError(String),

    /// The server answered with a JSON-RPC error.
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// The server does not advertise the capability a request needs.
    #[error("Server does not support {0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No response within the request timeout.
    #[error("{method} timed out after {}s", .after.as_secs_f32())]
    Timeout { method: String, after: Duration },

    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// A URI that is not a local file path, or a path that cannot be a URI.
    #[error("Invalid URI: {0}")]
    InvalidUri(String),
}

impl LspError {
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed(message.into())
    }

    pub fn protocol_error(message: impl Into<String>) -> Self {
        Self::ProtocolError(message.into())
    }

    pub fn request_failed(message: impl Into<String>) -> Self {
        Self::RequestFailed(message.into())
    }

    pub fn unsupported(method: impl Into<String>) -> Self {
        Self::Unsupported(method.into())
    }

    pub fn timeout(method: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            method: method.into(),
            after,
        }
    }

    /// Whether the connection can no longer carry requests.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed(_) | Self::ProcessError(_) | Self::Io(_)
        )
    }
}
