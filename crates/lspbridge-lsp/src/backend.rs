//! The backend seam between the tool layer and a language server.

use crate::error::{LspError, LspResult};
use async_trait::async_trait;
use lsp_types::{CodeLens, Command, Diagnostic, Position, Range, SymbolKind, Uri};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// A symbol returned by workspace symbol search.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceSymbolInfo {
    pub name: String,
    pub kind: SymbolKind,
    pub container_name: Option<String>,
    pub path: PathBuf,
    pub range: Range,
}

impl WorkspaceSymbolInfo {
    /// Name qualified by its container, `Container.name`, when a container is known.
    pub fn qualified_name(&self) -> String {
        match self.container_name.as_deref() {
            Some(container) if !container.is_empty() => format!("{container}.{}", self.name),
            _ => self.name.clone(),
        }
    }
}

/// A document symbol, possibly with children.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSymbolInfo {
    pub name: String,
    pub kind: SymbolKind,
    pub detail: Option<String>,
    /// Full extent of the symbol, including its body.
    pub range: Range,
    /// The identifier's range.
    pub selection_range: Range,
    pub children: Vec<DocumentSymbolInfo>,
}

/// A location resolved to a file path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub path: PathBuf,
    pub range: Range,
}

/// Outcome of a diagnostics request.
#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticsReport {
    /// The server reported diagnostics (possibly none) for the document.
    Ready(Vec<Diagnostic>),
    /// The server never reported diagnostics for the document.
    Unavailable,
}

/// Operations the tool layer needs from a language server.
///
/// Positions are zero-based LSP positions. Implementations must be safe to
/// share between tasks.
#[async_trait]
pub trait LspBackend: Send + Sync {
    /// Search symbols across the workspace.
    async fn workspace_symbols(&self, query: &str) -> LspResult<Vec<WorkspaceSymbolInfo>>;

    /// Go to the declaration of the symbol at a position.
    async fn definition(&self, path: &Path, position: Position) -> LspResult<Vec<SourceLocation>>;

    /// Find references to the symbol at a position.
    async fn references(
        &self,
        path: &Path,
        position: Position,
        include_declaration: bool,
    ) -> LspResult<Vec<SourceLocation>>;

    /// List the symbols of a document.
    async fn document_symbols(&self, path: &Path) -> LspResult<Vec<DocumentSymbolInfo>>;

    /// Make the server's view of a document match its content on disk.
    async fn sync_document(&self, path: &Path) -> LspResult<()>;

    /// Tell the server a document now has the given content.
    async fn document_changed(&self, path: &Path, text: &str) -> LspResult<()>;

    /// Diagnostics for a document, pulled or awaited from publication.
    async fn diagnostics(&self, path: &Path) -> LspResult<DiagnosticsReport>;

    /// Code lenses for a document, resolved where the server supports it.
    async fn code_lenses(&self, path: &Path) -> LspResult<Vec<CodeLens>>;

    /// Run a server command.
    async fn execute_command(&self, command: &Command) -> LspResult<Option<Value>>;
}

/// Convert a file path to a `file://` URI.
pub fn path_to_uri(path: &Path) -> LspResult<Uri> {
    let abs_path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| LspError::InvalidUri(e.to_string()))?
            .join(path)
    };

    let url = url::Url::from_file_path(&abs_path)
        .map_err(|_| LspError::InvalidUri(abs_path.display().to_string()))?;
    url.as_str()
        .parse()
        .map_err(|e| LspError::InvalidUri(format!("{}: {}", abs_path.display(), e)))
}

/// Convert a `file://` URI to a path.
pub fn uri_to_path(uri: &Uri) -> LspResult<PathBuf> {
    let url = url::Url::parse(uri.as_str())
        .map_err(|e| LspError::InvalidUri(format!("{}: {}", uri.as_str(), e)))?;
    url.to_file_path()
        .map_err(|_| LspError::InvalidUri(uri.as_str().to_string()))
}
