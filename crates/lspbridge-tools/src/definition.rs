//! Read the full source of a symbol's definition.

use crate::error::{ToolError, ToolResult};
use crate::path::display_path;
use crate::render::{excerpt, format_range, range_lines, split_lines, symbol_kind_name};
use crate::schema::{FieldSpec, ToolSchema};
use crate::session::Session;
use crate::symbol::{self, SymbolQuery};
use crate::{parse_args, Tool, ToolContext, ToolOutput};
use async_trait::async_trait;
use lspbridge_lsp::{DocumentSymbolInfo, Position, Range, SourceLocation, WorkspaceSymbolInfo};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Resolve a symbol to its declaration.
///
/// Asks the server for the definition at the symbol's location and takes
/// the first answer; the symbol's own location stands in when there is none.
pub(crate) async fn declaration_of(
    session: &Session,
    ctx: &ToolContext,
    symbol: &WorkspaceSymbolInfo,
) -> ToolResult<SourceLocation> {
    let locations = session
        .request(
            &ctx.abort,
            session
                .backend()
                .definition(&symbol.path, symbol.range.start),
        )
        .await?;
    Ok(locations.into_iter().next().unwrap_or_else(|| SourceLocation {
        path: symbol.path.clone(),
        range: symbol.range,
    }))
}

fn contains(range: &Range, pos: Position) -> bool {
    let start = (range.start.line, range.start.character);
    let end = (range.end.line, range.end.character);
    let pos = (pos.line, pos.character);
    start <= pos && pos <= end
}

/// The innermost symbol whose range contains `pos`.
fn innermost(symbols: &[DocumentSymbolInfo], pos: Position) -> Option<&DocumentSymbolInfo> {
    symbols
        .iter()
        .find(|s| contains(&s.range, pos))
        .map(|s| innermost(&s.children, pos).unwrap_or(s))
}

/// Tool that shows the source of a symbol's definition.
pub struct ReadDefinitionTool {
    schema: ToolSchema,
    session: Arc<Session>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DefinitionArgs {
    symbol_name: String,
    show_line_numbers: bool,
}

impl ReadDefinitionTool {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            schema: ToolSchema::new(
                "read_definition",
                "Read the source code definition of a symbol (function, type, constant, etc.) from the codebase. Qualify names with their container (e.g. Server.Run) to disambiguate.",
            )
            .field(
                FieldSpec::string("symbolName", "The name of the symbol whose definition you want to find")
                    .required(),
            )
            .field(
                FieldSpec::boolean("showLineNumbers", "Include line numbers in the returned source code")
                    .default_value(true),
            ),
            session,
        }
    }
}

#[async_trait]
impl Tool for ReadDefinitionTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let args: DefinitionArgs = parse_args(args)?;
        let query = SymbolQuery::parse(&args.symbol_name)?;

        let symbol = symbol::resolve(&self.session, ctx, &query).await?;
        let declaration = declaration_of(&self.session, ctx, &symbol).await?;

        let document_symbols = self
            .session
            .request(
                &ctx.abort,
                self.session.backend().document_symbols(&declaration.path),
            )
            .await?;
        let full_range = innermost(&document_symbols, declaration.range.start)
            .map(|s| s.range)
            .unwrap_or(declaration.range);

        let text = tokio::fs::read_to_string(&declaration.path)
            .await
            .map_err(|e| ToolError::file_io(&declaration.path, e))?;
        let lines = split_lines(&text);

        let shown = display_path(&declaration.path, &ctx.root_dir);
        let mut output = format!(
            "Symbol: {}\nKind: {}\n",
            symbol.name,
            symbol_kind_name(symbol.kind)
        );
        if let Some(container) = symbol.container_name.as_deref().filter(|c| !c.is_empty()) {
            output.push_str(&format!("Container: {container}\n"));
        }
        output.push_str(&format!(
            "File: {}\nRange: {}\n\n",
            shown,
            format_range(full_range)
        ));
        output.push_str(&excerpt(
            &lines,
            range_lines(full_range),
            args.show_line_numbers,
        ));

        Ok(ToolOutput::new(symbol.qualified_name(), output).with_metadata(json!({
            "path": declaration.path.display().to_string(),
            "startLine": full_range.start.line + 1,
            "endLine": full_range.end.line + 1,
        })))
    }
}
