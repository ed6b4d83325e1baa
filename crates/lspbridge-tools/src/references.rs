//! Find the references to a symbol across the workspace.

use crate::definition::declaration_of;
use crate::error::ToolResult;
use crate::path::display_path;
use crate::render::{excerpts, format_position, merge_spans, split_lines, widen};
use crate::schema::{FieldSpec, ToolSchema};
use crate::session::Session;
use crate::symbol::{self, SymbolQuery};
use crate::{parse_args, Tool, ToolContext, ToolOutput};
use async_trait::async_trait;
use lspbridge_lsp::Range;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Tool that lists every reference to a symbol, grouped by file.
pub struct FindReferencesTool {
    schema: ToolSchema,
    session: Arc<Session>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReferencesArgs {
    symbol_name: String,
    show_line_numbers: bool,
}

impl FindReferencesTool {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            schema: ToolSchema::new(
                "find_references",
                "Find all usages and references of a symbol throughout the codebase. Returns each reference with surrounding lines, grouped by file.",
            )
            .field(
                FieldSpec::string("symbolName", "The name of the symbol to search for")
                    .required(),
            )
            .field(
                FieldSpec::boolean("showLineNumbers", "Include line numbers when showing where the symbol is used")
                    .default_value(true),
            ),
            session,
        }
    }
}

/// Locations grouped by file, each group sorted by line then column.
fn group_by_file(locations: Vec<lspbridge_lsp::SourceLocation>) -> BTreeMap<PathBuf, Vec<Range>> {
    let mut groups: BTreeMap<PathBuf, Vec<Range>> = BTreeMap::new();
    for location in locations {
        groups.entry(location.path).or_default().push(location.range);
    }
    for ranges in groups.values_mut() {
        ranges.sort_by_key(|r| (r.start.line, r.start.character, r.end.line, r.end.character));
        ranges.dedup();
    }
    groups
}

#[async_trait]
impl Tool for FindReferencesTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let args: ReferencesArgs = parse_args(args)?;
        let query = SymbolQuery::parse(&args.symbol_name)?;

        let symbol = symbol::resolve(&self.session, ctx, &query).await?;
        let declaration = declaration_of(&self.session, ctx, &symbol).await?;

        let locations = self
            .session
            .request(
                &ctx.abort,
                self.session.backend().references(
                    &declaration.path,
                    declaration.range.start,
                    false,
                ),
            )
            .await?;

        let title = symbol.qualified_name();
        if locations.is_empty() {
            return Ok(ToolOutput::new(
                title.clone(),
                format!("No references found for {}", title),
            )
            .with_metadata(json!({"count": 0, "files": 0})));
        }

        let groups = group_by_file(locations);
        let total: usize = groups.values().map(Vec::len).sum();
        let context = self.session.settings().context_lines;

        let mut output = format!(
            "Found {} reference(s) to {} in {} file(s)\n",
            total,
            title,
            groups.len()
        );

        for (path, ranges) in &groups {
            ctx.check_cancelled()?;
            output.push('\n');
            output.push_str(&display_path(path, &ctx.root_dir));
            output.push('\n');

            let positions: Vec<String> = ranges.iter().map(|r| format_position(r.start)).collect();
            output.push_str(&format!("References: {}\n", positions.join(", ")));

            match tokio::fs::read_to_string(path).await {
                Ok(text) => {
                    let lines = split_lines(&text);
                    let spans = merge_spans(
                        ranges
                            .iter()
                            .map(|r| widen((r.start.line, r.end.line), context, lines.len()))
                            .collect(),
                    );
                    output.push_str(&excerpts(&lines, &spans, args.show_line_numbers));
                }
                Err(e) => {
                    output.push_str(&format!("(source unavailable: {e})\n"));
                }
            }
        }

        Ok(ToolOutput::new(title, output).with_metadata(json!({
            "count": total,
            "files": groups.len(),
        })))
    }
}
