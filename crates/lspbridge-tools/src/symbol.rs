//! Resolve a symbol name to one workspace symbol.
//!
//! Names may be plain (`Run`) or qualified with `.` or `::`
//! (`Server.Run`, `cache::Cache::get`). Candidates from workspace symbol
//! search are narrowed in two stages: exact matches on the name or on
//! `container.name`, then matches on trailing qualified segments. The
//! first stage with any match decides; more than one match there is an
//! ambiguity, never a guess.

use crate::error::{ToolError, ToolResult};
use crate::path::display_path;
use crate::render::symbol_kind_name;
use crate::session::Session;
use crate::ToolContext;
use lspbridge_lsp::WorkspaceSymbolInfo;
use tracing::debug;

/// A parsed symbol name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolQuery {
    raw: String,
    segments: Vec<String>,
}

impl SymbolQuery {
    pub fn parse(raw: &str) -> ToolResult<Self> {
        let segments: Vec<String> = normalize(raw)
            .split('.')
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        if segments.is_empty() {
            return Err(ToolError::validation("Symbol name must not be empty"));
        }
        Ok(Self {
            raw: raw.trim().to_string(),
            segments,
        })
    }

    /// The name as the caller wrote it.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Segments joined with `.`.
    pub fn normalized(&self) -> String {
        self.segments.join(".")
    }

    pub fn is_qualified(&self) -> bool {
        self.segments.len() > 1
    }

    /// The unqualified name.
    pub fn last(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }
}

/// `::` becomes `.`; receiver decorations such as `(*T)` are dropped.
fn normalize(name: &str) -> String {
    name.trim().replace("::", ".").replace(['(', ')', '*'], "")
}

fn candidate_segments(symbol: &WorkspaceSymbolInfo) -> Vec<String> {
    let mut segments: Vec<String> = symbol
        .container_name
        .as_deref()
        .map(|c| {
            normalize(c)
                .split(['.', '/'])
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();
    segments.extend(
        normalize(&symbol.name)
            .split('.')
            .filter(|s| !s.is_empty())
            .map(String::from),
    );
    segments
}

fn is_exact(query: &SymbolQuery, symbol: &WorkspaceSymbolInfo) -> bool {
    let wanted = query.normalized();
    let name = normalize(&symbol.name);
    if name == wanted {
        return true;
    }
    match symbol.container_name.as_deref() {
        Some(container) if !container.is_empty() => {
            format!("{}.{}", normalize(container), name) == wanted
        }
        _ => false,
    }
}

fn is_suffix(query: &SymbolQuery, symbol: &WorkspaceSymbolInfo) -> bool {
    candidate_segments(symbol).ends_with(&query.segments)
}

/// `Container.name (Kind) at path:line:column`, 1-based.
pub fn describe_candidate(symbol: &WorkspaceSymbolInfo, root: &std::path::Path) -> String {
    format!(
        "{} ({}) at {}:{}:{}",
        symbol.qualified_name(),
        symbol_kind_name(symbol.kind),
        display_path(&symbol.path, root),
        symbol.range.start.line + 1,
        symbol.range.start.character + 1
    )
}

/// Pick the one candidate `query` names.
pub fn select(
    query: &SymbolQuery,
    candidates: &[WorkspaceSymbolInfo],
    root: &std::path::Path,
) -> ToolResult<WorkspaceSymbolInfo> {
    let exact: Vec<&WorkspaceSymbolInfo> =
        candidates.iter().filter(|c| is_exact(query, c)).collect();
    let decided = if exact.is_empty() {
        candidates.iter().filter(|c| is_suffix(query, c)).collect()
    } else {
        exact
    };

    match decided.as_slice() {
        [] => Err(ToolError::SymbolNotFound(query.raw().to_string())),
        [one] => Ok((*one).clone()),
        many => Err(ToolError::AmbiguousSymbol {
            query: query.raw().to_string(),
            candidates: many.iter().map(|c| describe_candidate(c, root)).collect(),
        }),
    }
}

/// Search the workspace and select the symbol `query` names.
///
/// A qualified name with no hits is searched once more by its last segment,
/// since many servers index only unqualified names.
pub async fn resolve(
    session: &Session,
    ctx: &ToolContext,
    query: &SymbolQuery,
) -> ToolResult<WorkspaceSymbolInfo> {
    let normalized = query.normalized();
    let mut candidates = session
        .request(
            &ctx.abort,
            session.backend().workspace_symbols(&normalized),
        )
        .await?;

    if candidates.is_empty() && query.is_qualified() {
        debug!(query = %normalized, fallback = query.last(), "Retrying symbol search by name");
        candidates = session
            .request(&ctx.abort, session.backend().workspace_symbols(query.last()))
            .await?;
    }

    select(query, &candidates, &ctx.root_dir)
}
