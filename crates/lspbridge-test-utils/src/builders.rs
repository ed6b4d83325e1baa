//! Builder patterns for constructing test objects.
//!
//! Short constructors for the LSP values that flow through the backend.

use lsp_types::{
    CodeLens, Command, Diagnostic, DiagnosticSeverity, NumberOrString, Position, Range, SymbolKind,
};
use lspbridge_lsp::{DocumentSymbolInfo, SourceLocation, WorkspaceSymbolInfo};
use serde_json::Value;
use std::path::PathBuf;

/// A range from `(start_line, start_char)` to `(end_line, end_char)`, zero-based.
pub fn range(start_line: u32, start_char: u32, end_line: u32, end_char: u32) -> Range {
    Range::new(
        Position::new(start_line, start_char),
        Position::new(end_line, end_char),
    )
}

/// A location resolved to a path.
pub fn location(path: impl Into<PathBuf>, line: u32, character: u32) -> SourceLocation {
    SourceLocation {
        path: path.into(),
        range: range(line, character, line, character),
    }
}

/// A workspace symbol whose name starts at `(line, character)`.
pub fn symbol(
    name: &str,
    kind: SymbolKind,
    path: impl Into<PathBuf>,
    line: u32,
    character: u32,
) -> WorkspaceSymbolInfo {
    WorkspaceSymbolInfo {
        name: name.to_string(),
        kind,
        container_name: None,
        path: path.into(),
        range: range(line, character, line, character + name.len() as u32),
    }
}

/// A workspace symbol inside a container such as a type or package.
pub fn member(
    container: &str,
    name: &str,
    kind: SymbolKind,
    path: impl Into<PathBuf>,
    line: u32,
    character: u32,
) -> WorkspaceSymbolInfo {
    WorkspaceSymbolInfo {
        container_name: Some(container.to_string()),
        ..symbol(name, kind, path, line, character)
    }
}

/// A document symbol spanning `full`, named at `selection`.
pub fn document_symbol(
    name: &str,
    kind: SymbolKind,
    full: Range,
    selection: Range,
) -> DocumentSymbolInfo {
    DocumentSymbolInfo {
        name: name.to_string(),
        kind,
        detail: None,
        range: full,
        selection_range: selection,
        children: Vec::new(),
    }
}

/// A code lens with a command.
pub fn lens(line: u32, title: &str, command: &str) -> CodeLens {
    CodeLens {
        range: range(line, 0, line, 0),
        command: Some(Command {
            title: title.to_string(),
            command: command.to_string(),
            arguments: Some(vec![Value::from(line)]),
        }),
        data: None,
    }
}

/// A code lens the server left unresolved.
pub fn unresolved_lens(line: u32) -> CodeLens {
    CodeLens {
        range: range(line, 0, line, 0),
        command: None,
        data: Some(Value::from(line)),
    }
}

/// Builder for diagnostics.
///
/// # Example
///
/// ```rust
/// use lspbridge_test_utils::builders::DiagnosticBuilder;
///
/// let diag = DiagnosticBuilder::error("undefined: x")
///     .at(3, 4)
///     .source("compiler")
///     .code("UndeclaredName")
///     .build();
/// assert_eq!(diag.range.start.line, 3);
/// ```
pub struct DiagnosticBuilder {
    severity: Option<DiagnosticSeverity>,
    message: String,
    range: Range,
    source: Option<String>,
    code: Option<NumberOrString>,
}

impl DiagnosticBuilder {
    fn new(severity: Option<DiagnosticSeverity>, message: &str) -> Self {
        Self {
            severity,
            message: message.to_string(),
            range: Range::default(),
            source: None,
            code: None,
        }
    }

    /// An error diagnostic.
    pub fn error(message: &str) -> Self {
        Self::new(Some(DiagnosticSeverity::ERROR), message)
    }

    /// A warning diagnostic.
    pub fn warning(message: &str) -> Self {
        Self::new(Some(DiagnosticSeverity::WARNING), message)
    }

    /// An information diagnostic.
    pub fn information(message: &str) -> Self {
        Self::new(Some(DiagnosticSeverity::INFORMATION), message)
    }

    /// A hint diagnostic.
    pub fn hint(message: &str) -> Self {
        Self::new(Some(DiagnosticSeverity::HINT), message)
    }

    /// A diagnostic with no severity.
    pub fn unspecified(message: &str) -> Self {
        Self::new(None, message)
    }

    /// Place the diagnostic at a single position.
    pub fn at(mut self, line: u32, character: u32) -> Self {
        self.range = range(line, character, line, character);
        self
    }

    /// Span the diagnostic over a range.
    pub fn spanning(mut self, range: Range) -> Self {
        self.range = range;
        self
    }

    /// Set the reporting tool.
    pub fn source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }

    /// Set a string code.
    pub fn code(mut self, code: &str) -> Self {
        self.code = Some(NumberOrString::String(code.to_string()));
        self
    }

    /// Set a numeric code.
    pub fn numeric_code(mut self, code: i32) -> Self {
        self.code = Some(NumberOrString::Number(code));
        self
    }

    /// Build the diagnostic.
    pub fn build(self) -> Diagnostic {
        Diagnostic {
            range: self.range,
            severity: self.severity,
            code: self.code,
            source: self.source,
            message: self.message,
            ..Default::default()
        }
    }
}
