//! Language Server Protocol (LSP) client for lspbridge.
//!
//! This crate drives one language server over stdio on behalf of the tool
//! layer:
//! - Content-Length framed JSON-RPC with a single reader task
//! - Server-initiated requests answered in place
//! - Open-document tracking with full-text synchronization
//! - Diagnostics pulled, or awaited from publication with a bounded wait
//! - Code lens listing, resolving and command execution
//!
//! The tool layer only sees the [`LspBackend`] trait, so it can be exercised
//! against a scripted backend in tests.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌────────────┐     ┌──────────────┐
//! │    tools    │────▶│ LspClient  │────▶│ Lang Server  │
//! │ (LspBackend)│◀────│            │◀────│   (gopls)    │
//! └─────────────┘     └────────────┘     └──────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use lspbridge_lsp::{LspBackend, LspClient, LspConfig};
//! use std::path::PathBuf;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let root = PathBuf::from("/path/to/project");
//! let client = LspClient::start(LspConfig::go(), root.clone()).await?;
//!
//! let symbols = client.workspace_symbols("Handler").await?;
//! for s in symbols {
//!     println!("{} {}:{}", s.name, s.path.display(), s.range.start.line + 1);
//! }
//!
//! client.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod backend;
pub mod client;
mod config;
mod error;
pub mod transport;

pub use backend::{
    path_to_uri, uri_to_path, DiagnosticsReport, DocumentSymbolInfo, LspBackend, SourceLocation,
    WorkspaceSymbolInfo,
};
pub use client::LspClient;
pub use config::{ext_to_language_id, LspConfig};
pub use error::{LspError, LspResult};

// Re-export useful lsp-types
pub use lsp_types::{
    CodeLens, Command, Diagnostic, DiagnosticSeverity, NumberOrString, Position, Range,
    SymbolKind, Uri,
};
