//! MCP error types.

use thiserror::Error;

/// Result type for MCP operations.
pub type McpResult<T> = Result<T, McpError>;

/// Errors that end or disturb the MCP server loop.
///
/// Per-request failures are answered on the wire and never surface here.
#[derive(Debug, Error)]
pub enum McpError {
    /// Protocol error.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// The client closed the stream or the writer went away.
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl McpError {
    /// Create a protocol error.
    pub fn protocol_error(message: impl Into<String>) -> Self {
        Self::ProtocolError(message.into())
    }

    /// Create a connection closed error.
    pub fn connection_closed(message: impl Into<String>) -> Self {
        Self::ConnectionClosed(message.into())
    }
}

impl From<tokio_util::codec::LinesCodecError> for McpError {
    fn from(err: tokio_util::codec::LinesCodecError) -> Self {
        match err {
            tokio_util::codec::LinesCodecError::Io(e) => Self::Io(e),
            tokio_util::codec::LinesCodecError::MaxLineLengthExceeded => {
                Self::protocol_error("message exceeds the maximum line length")
            }
        }
    }
}
