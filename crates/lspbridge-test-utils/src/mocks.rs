//! Mock implementations for testing.
//!
//! Provides a scripted language server backend so the tool layer can be
//! tested without spawning a real server.

use async_trait::async_trait;
use lsp_types::{CodeLens, Command, Position};
use lspbridge_lsp::{
    DiagnosticsReport, DocumentSymbolInfo, LspBackend, LspError, LspResult, SourceLocation,
    WorkspaceSymbolInfo,
};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    WorkspaceSymbols(String),
    Definition {
        path: PathBuf,
        position: Position,
    },
    References {
        path: PathBuf,
        position: Position,
        include_declaration: bool,
    },
    DocumentSymbols(PathBuf),
    SyncDocument(PathBuf),
    DocumentChanged {
        path: PathBuf,
        text: String,
    },
    Diagnostics(PathBuf),
    CodeLenses(PathBuf),
    ExecuteCommand(Command),
}

impl MockCall {
    /// The LSP method this call stands for.
    pub fn method(&self) -> &'static str {
        match self {
            Self::WorkspaceSymbols(_) => "workspace/symbol",
            Self::Definition { .. } => "textDocument/definition",
            Self::References { .. } => "textDocument/references",
            Self::DocumentSymbols(_) => "textDocument/documentSymbol",
            Self::SyncDocument(_) => "sync",
            Self::DocumentChanged { .. } => "textDocument/didChange",
            Self::Diagnostics(_) => "textDocument/diagnostic",
            Self::CodeLenses(_) => "textDocument/codeLens",
            Self::ExecuteCommand(_) => "workspace/executeCommand",
        }
    }
}

#[derive(Default)]
struct MockState {
    calls: Vec<MockCall>,
    symbols: HashMap<String, Vec<WorkspaceSymbolInfo>>,
    definitions: HashMap<(PathBuf, Position), Vec<SourceLocation>>,
    references: HashMap<(PathBuf, Position), Vec<SourceLocation>>,
    document_symbols: HashMap<PathBuf, Vec<DocumentSymbolInfo>>,
    diagnostics: HashMap<PathBuf, DiagnosticsReport>,
    lenses: HashMap<PathBuf, Vec<CodeLens>>,
    command_results: HashMap<String, Value>,
    failures: HashMap<&'static str, String>,
    delay: Option<Duration>,
}

/// A language server backend with scripted responses.
///
/// Records every call. Unscripted lookups return empty results, except
/// `definition`, which answers with the queried position itself, and
/// `diagnostics`, which reports [`DiagnosticsReport::Unavailable`].
///
/// # Example
///
/// ```rust,no_run
/// use lspbridge_test_utils::mocks::{MockCall, MockLspBackend};
/// use lspbridge_lsp::LspBackend;
///
/// # async fn example() {
/// let backend = MockLspBackend::new();
/// let symbols = backend.workspace_symbols("F").await.unwrap();
/// assert!(symbols.is_empty());
/// assert_eq!(backend.calls(), vec![MockCall::WorkspaceSymbols("F".to_string())]);
/// # }
/// ```
#[derive(Clone, Default)]
pub struct MockLspBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockLspBackend {
    /// Create a new mock backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the result of a workspace symbol query.
    pub fn with_symbols(self, query: &str, symbols: Vec<WorkspaceSymbolInfo>) -> Self {
        self.state
            .lock()
            .unwrap()
            .symbols
            .insert(query.to_string(), symbols);
        self
    }

    /// Script the declaration found from a position.
    pub fn with_definition(
        self,
        path: impl Into<PathBuf>,
        position: Position,
        targets: Vec<SourceLocation>,
    ) -> Self {
        self.state
            .lock()
            .unwrap()
            .definitions
            .insert((path.into(), position), targets);
        self
    }

    /// Script the references found from a position.
    pub fn with_references(
        self,
        path: impl Into<PathBuf>,
        position: Position,
        references: Vec<SourceLocation>,
    ) -> Self {
        self.state
            .lock()
            .unwrap()
            .references
            .insert((path.into(), position), references);
        self
    }

    /// Script the document symbols of a file.
    pub fn with_document_symbols(
        self,
        path: impl Into<PathBuf>,
        symbols: Vec<DocumentSymbolInfo>,
    ) -> Self {
        self.state
            .lock()
            .unwrap()
            .document_symbols
            .insert(path.into(), symbols);
        self
    }

    /// Script the diagnostics report of a file.
    pub fn with_diagnostics(self, path: impl Into<PathBuf>, report: DiagnosticsReport) -> Self {
        self.state
            .lock()
            .unwrap()
            .diagnostics
            .insert(path.into(), report);
        self
    }

    /// Script the code lenses of a file.
    pub fn with_code_lenses(self, path: impl Into<PathBuf>, lenses: Vec<CodeLens>) -> Self {
        self.set_code_lenses(path, lenses);
        self
    }

    /// Replace the code lenses of a file mid-test.
    pub fn set_code_lenses(&self, path: impl Into<PathBuf>, lenses: Vec<CodeLens>) {
        self.state.lock().unwrap().lenses.insert(path.into(), lenses);
    }

    /// Script the result of a command.
    pub fn with_command_result(self, command: &str, result: Value) -> Self {
        self.state
            .lock()
            .unwrap()
            .command_results
            .insert(command.to_string(), result);
        self
    }

    /// Make every call for an LSP method fail with a request error.
    ///
    /// `method` is the name reported by [`MockCall::method`].
    pub fn failing(self, method: &'static str, message: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(method, message.to_string());
        self
    }

    /// Delay every call, to exercise cancellation and concurrency.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().delay = Some(delay);
        self
    }

    /// All calls made so far.
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Number of calls made for an LSP method.
    pub fn call_count(&self, method: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.method() == method)
            .count()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Record a call and apply the scripted delay and failure.
    async fn enter(&self, call: MockCall) -> LspResult<()> {
        let method = call.method();
        let (delay, failure) = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(call);
            (state.delay, state.failures.get(method).cloned())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match failure {
            Some(message) => Err(LspError::request_failed(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl LspBackend for MockLspBackend {
    async fn workspace_symbols(&self, query: &str) -> LspResult<Vec<WorkspaceSymbolInfo>> {
        self.enter(MockCall::WorkspaceSymbols(query.to_string()))
            .await?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .symbols
            .get(query)
            .cloned()
            .unwrap_or_default())
    }

    async fn definition(&self, path: &Path, position: Position) -> LspResult<Vec<SourceLocation>> {
        self.enter(MockCall::Definition {
            path: path.to_path_buf(),
            position,
        })
        .await?;
        let state = self.state.lock().unwrap();
        Ok(state
            .definitions
            .get(&(path.to_path_buf(), position))
            .cloned()
            .unwrap_or_else(|| {
                vec![SourceLocation {
                    path: path.to_path_buf(),
                    range: lsp_types::Range::new(position, position),
                }]
            }))
    }

    async fn references(
        &self,
        path: &Path,
        position: Position,
        include_declaration: bool,
    ) -> LspResult<Vec<SourceLocation>> {
        self.enter(MockCall::References {
            path: path.to_path_buf(),
            position,
            include_declaration,
        })
        .await?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .references
            .get(&(path.to_path_buf(), position))
            .cloned()
            .unwrap_or_default())
    }

    async fn document_symbols(&self, path: &Path) -> LspResult<Vec<DocumentSymbolInfo>> {
        self.enter(MockCall::DocumentSymbols(path.to_path_buf()))
            .await?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .document_symbols
            .get(path)
            .cloned()
            .unwrap_or_default())
    }

    async fn sync_document(&self, path: &Path) -> LspResult<()> {
        self.enter(MockCall::SyncDocument(path.to_path_buf())).await
    }

    async fn document_changed(&self, path: &Path, text: &str) -> LspResult<()> {
        self.enter(MockCall::DocumentChanged {
            path: path.to_path_buf(),
            text: text.to_string(),
        })
        .await
    }

    async fn diagnostics(&self, path: &Path) -> LspResult<DiagnosticsReport> {
        self.enter(MockCall::Diagnostics(path.to_path_buf())).await?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .diagnostics
            .get(path)
            .cloned()
            .unwrap_or(DiagnosticsReport::Unavailable))
    }

    async fn code_lenses(&self, path: &Path) -> LspResult<Vec<CodeLens>> {
        self.enter(MockCall::CodeLenses(path.to_path_buf())).await?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .lenses
            .get(path)
            .cloned()
            .unwrap_or_default())
    }

    async fn execute_command(&self, command: &Command) -> LspResult<Option<Value>> {
        self.enter(MockCall::ExecuteCommand(command.clone())).await?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .command_results
            .get(&command.command)
            .cloned())
    }
}
