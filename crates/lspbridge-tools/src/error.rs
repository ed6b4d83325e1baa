//! Tool error types.

use lspbridge_lsp::LspError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Errors that can occur during tool execution.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Invalid or missing arguments.
    #[error("Validation error: {0}")]
    Validation(String),

    /// No workspace symbol matched the query.
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// Several workspace symbols matched the query equally well.
    #[error("Ambiguous symbol {query:?}, candidates: {}", candidates.join(", "))]
    AmbiguousSymbol {
        query: String,
        candidates: Vec<String>,
    },

    /// The language server failed, timed out or lacks the capability.
    #[error("Language server error: {0}")]
    Backend(#[from] LspError),

    /// An edit is out of bounds or overlaps another edit.
    #[error("Invalid edit range: {0}")]
    InvalidEditRange(String),

    /// A code lens index is not valid for the current lens list.
    #[error("Code lens index {index} out of range: file has {count} code lens(es)")]
    IndexOutOfRange { index: i64, count: usize },

    /// Reading or writing a file failed.
    #[error("File error on {}: {source}", path.display())]
    FileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The server never reported diagnostics for the document.
    #[error("Diagnostics unavailable for {}: the language server has not reported diagnostics for this document", .0.display())]
    DiagnosticsUnavailable(PathBuf),

    /// Operation was cancelled.
    #[error("Cancelled")]
    Cancelled,
}

impl ToolError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an invalid edit range error.
    pub fn invalid_edit_range(message: impl Into<String>) -> Self {
        Self::InvalidEditRange(message.into())
    }

    /// Create a file error for `path`.
    pub fn file_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileIo {
            path: path.into(),
            source,
        }
    }
}

/// A failed tool call: the operation that failed and why.
#[derive(Debug, Error)]
#[error("{operation} failed: {source}")]
pub struct CallError {
    pub operation: String,
    #[source]
    pub source: ToolError,
}

impl CallError {
    pub fn new(operation: impl Into<String>, source: ToolError) -> Self {
        Self {
            operation: operation.into(),
            source,
        }
    }

    /// Whether the caller sent bad arguments, as opposed to the operation failing.
    pub fn is_validation(&self) -> bool {
        matches!(self.source, ToolError::Validation(_))
    }
}
