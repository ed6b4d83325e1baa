//! Apply text edits to a file.
//!
//! Edits are addressed either by an LSP range (0-based lines, UTF-16
//! columns) or by a 1-based inclusive line span. All edits of one call are
//! validated against the original text before any of them is applied, and
//! the file is replaced atomically, so a failing call leaves it untouched.

use crate::error::{ToolError, ToolResult};
use crate::path::{display_path, resolve_path};
use crate::render::{format_position, format_range};
use crate::schema::{FieldSpec, ToolSchema};
use crate::session::Session;
use crate::{parse_args, Tool, ToolContext, ToolOutput};
use async_trait::async_trait;
use lspbridge_lsp::{Position, Range};
use serde::Deserialize;
use serde_json::{json, Value};
use similar::{ChangeTag, TextDiff};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// A replacement of the text in `range`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub range: Range,
    pub new_text: String,
}

/// An edit as a caller writes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditInput {
    /// LSP range form.
    Range { range: Range, new_text: String },
    /// Whole lines `start_line..=end_line`, 1-based.
    Lines {
        start_line: u32,
        end_line: u32,
        new_text: String,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RangeForm {
    range: Range,
    new_text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LinesForm {
    start_line: u32,
    end_line: u32,
    new_text: String,
}

impl EditInput {
    /// Parse one element of the `edits` argument.
    pub fn from_value(value: Value) -> ToolResult<Self> {
        let invalid = |e: serde_json::Error| ToolError::validation(e.to_string());
        if value.get("range").is_some() {
            let form: RangeForm = serde_json::from_value(value).map_err(invalid)?;
            Ok(Self::Range {
                range: form.range,
                new_text: form.new_text,
            })
        } else if value.get("startLine").is_some() {
            let form: LinesForm = serde_json::from_value(value).map_err(invalid)?;
            Ok(Self::Lines {
                start_line: form.start_line,
                end_line: form.end_line,
                new_text: form.new_text,
            })
        } else {
            Err(ToolError::validation(
                "expected either range or startLine/endLine",
            ))
        }
    }

    fn new_text(&self) -> &str {
        match self {
            Self::Range { new_text, .. } | Self::Lines { new_text, .. } => new_text,
        }
    }

    /// One-line description such as `Replaced lines 2-4`.
    pub fn describe(&self) -> String {
        let deleting = self.new_text().is_empty();
        match self {
            Self::Lines {
                start_line,
                end_line,
                ..
            } => {
                let action = if deleting { "Deleted" } else { "Replaced" };
                format!("{action} lines {start_line}-{end_line}")
            }
            Self::Range { range, .. } if range.start == range.end => {
                format!("Inserted text at {}", format_position(range.start))
            }
            Self::Range { range, .. } => {
                let action = if deleting { "Deleted" } else { "Replaced" };
                format!("{action} {}", format_range(*range))
            }
        }
    }

    /// Convert to a range edit against `index`.
    fn to_text_edit(&self, index: &LineIndex<'_>) -> Result<TextEdit, String> {
        match self {
            Self::Range { range, new_text } => Ok(TextEdit {
                range: *range,
                new_text: new_text.clone(),
            }),
            Self::Lines {
                start_line,
                end_line,
                new_text,
            } => index.lines_edit(*start_line, *end_line, new_text),
        }
    }
}

/// Line start offsets of a text.
struct LineIndex<'a> {
    text: &'a str,
    starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    fn new(text: &'a str) -> Self {
        let mut starts = vec![0];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                starts.push(i + 1);
            }
        }
        Self { text, starts }
    }

    /// Lines as an editor shows them: a final newline does not open a new line.
    fn visible_lines(&self) -> u32 {
        let count = if self.text.ends_with('\n') {
            self.starts.len() - 1
        } else {
            self.starts.len()
        };
        count.max(1) as u32
    }

    /// Byte span of a line without its terminator.
    fn line_bounds(&self, line: usize) -> (usize, usize) {
        let start = self.starts[line];
        let mut end = self
            .starts
            .get(line + 1)
            .copied()
            .unwrap_or(self.text.len());
        let bytes = self.text.as_bytes();
        if end > start && bytes[end - 1] == b'\n' {
            end -= 1;
        }
        if end > start && bytes[end - 1] == b'\r' {
            end -= 1;
        }
        (start, end)
    }

    fn line_len_utf16(&self, line: usize) -> u32 {
        let (start, end) = self.line_bounds(line);
        self.text[start..end].encode_utf16().count() as u32
    }

    /// Byte offset of an LSP position.
    ///
    /// The position one line past the last, at column 0, is the end of the text.
    fn offset(&self, pos: Position) -> Result<usize, String> {
        let line = pos.line as usize;
        if line == self.starts.len() && pos.character == 0 {
            return Ok(self.text.len());
        }
        if line >= self.starts.len() {
            return Err(format!(
                "line {} is out of range (file has {} lines)",
                pos.line,
                self.starts.len()
            ));
        }

        let (start, end) = self.line_bounds(line);
        let line_text = &self.text[start..end];
        let len = line_text.encode_utf16().count() as u32;
        if pos.character > len {
            return Err(format!(
                "character {} is past the end of line {} ({} UTF-16 units)",
                pos.character, pos.line, len
            ));
        }
        Ok(start + utf16_col_to_byte_idx(line_text, pos.character))
    }

    /// Range edit replacing whole lines `start..=end`, 1-based.
    fn lines_edit(&self, start: u32, end: u32, new_text: &str) -> Result<TextEdit, String> {
        let count = self.visible_lines();
        if start == 0 || start > end || end > count {
            return Err(format!(
                "lines {start}-{end} are outside the file's {count} line(s)"
            ));
        }

        let mut text = new_text.to_string();
        let mut range_start = Position::new(start - 1, 0);
        let range_end;
        if (end as usize) < self.starts.len() {
            // Up to the start of the next line, consuming the terminator.
            range_end = Position::new(end, 0);
            if !text.is_empty() && !text.ends_with('\n') {
                let (_, line_end) = self.line_bounds(end as usize - 1);
                text.push_str(&self.text[line_end..self.starts[end as usize]]);
            }
        } else {
            // The last line has no terminator.
            range_end = Position::new(end - 1, self.line_len_utf16(end as usize - 1));
            if text.is_empty() && start > 1 {
                range_start = Position::new(start - 2, self.line_len_utf16(start as usize - 2));
            }
        }

        Ok(TextEdit {
            range: Range::new(range_start, range_end),
            new_text: text,
        })
    }
}

fn utf16_col_to_byte_idx(line: &str, utf16_col: u32) -> usize {
    let mut units = 0u32;
    for (byte_idx, ch) in line.char_indices() {
        if units >= utf16_col {
            return byte_idx;
        }
        units += ch.len_utf16() as u32;
        if units > utf16_col {
            // Inside a surrogate pair: round up to the end of the character.
            return byte_idx + ch.len_utf8();
        }
    }
    line.len()
}

/// Apply `edits` to `text`.
///
/// Every edit is checked against the original text first. Overlapping
/// edits, including two insertions at the same position, are rejected.
/// The result does not depend on the order of `edits`.
pub fn apply_edits(text: &str, edits: &[TextEdit]) -> ToolResult<String> {
    let index = LineIndex::new(text);
    let mut spans = Vec::with_capacity(edits.len());

    for (idx, edit) in edits.iter().enumerate() {
        let n = idx + 1;
        let start = index
            .offset(edit.range.start)
            .map_err(|e| ToolError::invalid_edit_range(format!("edit {n}: start {e}")))?;
        let end = index
            .offset(edit.range.end)
            .map_err(|e| ToolError::invalid_edit_range(format!("edit {n}: end {e}")))?;
        if start > end {
            return Err(ToolError::invalid_edit_range(format!(
                "edit {n}: start {} is after end {}",
                format_position(edit.range.start),
                format_position(edit.range.end)
            )));
        }
        spans.push((start, end, n, edit.new_text.as_str()));
    }

    spans.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
    for pair in spans.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        let same_insertion = prev.0 == prev.1 && next.0 == next.1 && prev.0 == next.0;
        if next.0 < prev.1 || same_insertion {
            let (a, b) = (prev.2.min(next.2), prev.2.max(next.2));
            return Err(ToolError::invalid_edit_range(format!(
                "edits {a} and {b} overlap"
            )));
        }
    }

    let mut out = text.to_string();
    for (start, end, _, new_text) in spans.into_iter().rev() {
        out.replace_range(start..end, new_text);
    }
    Ok(out)
}

/// Tool that applies edits to one file.
pub struct ApplyTextEditTool {
    schema: ToolSchema,
    session: Arc<Session>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplyArgs {
    file_path: String,
    edits: Vec<Value>,
}

impl ApplyTextEditTool {
    pub fn new(session: Arc<Session>) -> Self {
        let edit_item = json!({
            "type": "object",
            "description": "Either {range, newText} with a 0-based LSP range, or {startLine, endLine, newText} with 1-based inclusive lines",
            "properties": {
                "range": {
                    "type": "object",
                    "properties": {
                        "start": {"type": "object", "properties": {"line": {"type": "integer"}, "character": {"type": "integer"}}},
                        "end": {"type": "object", "properties": {"line": {"type": "integer"}, "character": {"type": "integer"}}}
                    }
                },
                "startLine": {"type": "integer", "description": "First line to replace, 1-based"},
                "endLine": {"type": "integer", "description": "Last line to replace, 1-based, inclusive"},
                "newText": {"type": "string", "description": "Replacement text; empty to delete"}
            },
            "required": ["newText"]
        });

        Self {
            schema: ToolSchema::new(
                "apply_text_edit",
                "Apply multiple text edits to a file. All edits are validated against the current content before any is applied; overlapping edits are rejected.",
            )
            .field(FieldSpec::string("filePath", "Path to the file to edit").required())
            .field(FieldSpec::array("edits", "List of edits to apply", edit_item).required()),
            session,
        }
    }
}

#[async_trait]
impl Tool for ApplyTextEditTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let args: ApplyArgs = parse_args(args)?;
        let requested = resolve_path(&args.file_path, ctx)?;

        if args.edits.is_empty() {
            return Err(ToolError::validation("No edits provided"));
        }
        let inputs = args
            .edits
            .into_iter()
            .enumerate()
            .map(|(i, v)| {
                EditInput::from_value(v).map_err(|e| match e {
                    ToolError::Validation(msg) => {
                        ToolError::validation(format!("Invalid edit {}: {msg}", i + 1))
                    }
                    other => other,
                })
            })
            .collect::<ToolResult<Vec<_>>>()?;

        // Edit the file a symlink points at, under one lock for all its aliases.
        let path = tokio::fs::canonicalize(&requested)
            .await
            .map_err(|e| ToolError::file_io(&requested, e))?;

        let _file = tokio::select! {
            _ = ctx.abort.cancelled() => return Err(ToolError::Cancelled),
            guard = self.session.lock_file(&path) => guard,
        };

        let original = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ToolError::file_io(&path, e))?;

        let index = LineIndex::new(&original);
        let edits = inputs
            .iter()
            .enumerate()
            .map(|(i, input)| {
                input.to_text_edit(&index).map_err(|e| {
                    ToolError::invalid_edit_range(format!("edit {}: {e}", i + 1))
                })
            })
            .collect::<ToolResult<Vec<_>>>()?;
        let updated = apply_edits(&original, &edits)?;

        ctx.check_cancelled()?;
        let changed = updated != original;
        if changed {
            write_atomic(&path, &updated, ctx).await?;
        }

        let shown = display_path(&requested, &ctx.root_dir);
        debug!(path = %path.display(), edits = inputs.len(), changed, "Applied edits");

        let mut output = format!(
            "Successfully applied {} edit(s) to {}\n",
            inputs.len(),
            shown
        );
        for (i, input) in inputs.iter().enumerate() {
            output.push_str(&format!("  {}. {}\n", i + 1, input.describe()));
        }

        if changed {
            let notified = self
                .session
                .request(
                    &ctx.abort,
                    self.session.backend().document_changed(&path, &updated),
                )
                .await;
            if let Err(e) = notified {
                warn!(path = %path.display(), error = %e, "Language server not notified of edit");
                output.push_str(&format!(
                    "\nWarning: the language server was not notified of the change: {e}\n"
                ));
            }
            output.push('\n');
            output.push_str(&generate_diff(&original, &updated, &shown));
        } else {
            output.push_str("\n(no changes)\n");
        }

        Ok(ToolOutput::new(shown, output).with_metadata(json!({
            "path": path.display().to_string(),
            "edits": inputs.len(),
            "changed": changed,
        })))
    }
}

/// Replace `path` with `content` through a temporary file in the same directory.
async fn write_atomic(path: &Path, content: &str, ctx: &ToolContext) -> ToolResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = dir.join(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4()));

    let written = async {
        tokio::fs::write(&temp, content).await?;
        let permissions = tokio::fs::metadata(path).await?.permissions();
        tokio::fs::set_permissions(&temp, permissions).await
    }
    .await;
    if let Err(e) = written {
        tokio::fs::remove_file(&temp).await.ok();
        return Err(ToolError::file_io(path, e));
    }

    if ctx.abort.is_cancelled() {
        tokio::fs::remove_file(&temp).await.ok();
        return Err(ToolError::Cancelled);
    }

    if let Err(e) = tokio::fs::rename(&temp, path).await {
        tokio::fs::remove_file(&temp).await.ok();
        return Err(ToolError::file_io(path, e));
    }
    Ok(())
}

fn generate_diff(old: &str, new: &str, shown: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    let mut output = String::new();

    output.push_str(&format!("--- a/{shown}\n"));
    output.push_str(&format!("+++ b/{shown}\n"));

    for (idx, group) in diff.grouped_ops(3).iter().enumerate() {
        if idx > 0 {
            output.push_str("...\n");
        }

        for op in group {
            for change in diff.iter_changes(op) {
                let sign = match change.tag() {
                    ChangeTag::Delete => "-",
                    ChangeTag::Insert => "+",
                    ChangeTag::Equal => " ",
                };

                output.push_str(sign);
                output.push_str(change.value());
                if !change.value().ends_with('\n') {
                    output.push('\n');
                }
            }
        }
    }

    output
}
