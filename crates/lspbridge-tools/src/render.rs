//! Text rendering shared by the tools.
//!
//! Line numbers in rendered output are 1-based and right-aligned to the
//! widest number shown, `  9|text` / ` 10|text`. Positions render as
//! `L<line>:C<column>`, also 1-based.

use lspbridge_lsp::{DiagnosticSeverity, Position, Range, SymbolKind};

/// An inclusive span of 0-based line indices.
pub type LineSpan = (u32, u32);

/// Split text into lines without their terminators.
pub fn split_lines(text: &str) -> Vec<&str> {
    text.lines().collect()
}

/// `L<line>:C<column>`, 1-based.
pub fn format_position(position: Position) -> String {
    format!("L{}:C{}", position.line + 1, position.character + 1)
}

/// `L<line>:C<column>-L<line>:C<column>`, 1-based.
pub fn format_range(range: Range) -> String {
    format!(
        "{}-{}",
        format_position(range.start),
        format_position(range.end)
    )
}

/// The lines a range covers, ignoring an end that sits at column 0 of a later line.
pub fn range_lines(range: Range) -> LineSpan {
    let end = if range.end.line > range.start.line && range.end.character == 0 {
        range.end.line - 1
    } else {
        range.end.line.max(range.start.line)
    };
    (range.start.line, end)
}

/// `context` lines either side of `span`, clamped to the file.
pub fn widen(span: LineSpan, context: u32, line_count: usize) -> LineSpan {
    let last = line_count.saturating_sub(1) as u32;
    (
        span.0.saturating_sub(context).min(last),
        span.1.saturating_add(context).min(last),
    )
}

/// Sort spans and merge those that overlap or touch.
pub fn merge_spans(mut spans: Vec<LineSpan>) -> Vec<LineSpan> {
    spans.sort_unstable();
    let mut merged: Vec<LineSpan> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(last) if span.0 <= last.1.saturating_add(1) => last.1 = last.1.max(span.1),
            _ => merged.push(span),
        }
    }
    merged
}

/// Render one span of lines.
pub fn excerpt(lines: &[&str], span: LineSpan, show_line_numbers: bool) -> String {
    excerpts(lines, &[span], show_line_numbers)
}

/// Render several spans, separated by `...` lines.
///
/// Spans past the end of the file are clipped; spans left empty are skipped.
pub fn excerpts(lines: &[&str], spans: &[LineSpan], show_line_numbers: bool) -> String {
    let Some(last_index) = lines.len().checked_sub(1) else {
        return String::new();
    };
    let clipped: Vec<(usize, usize)> = spans
        .iter()
        .map(|&(start, end)| (start as usize, (end as usize).min(last_index)))
        .filter(|(start, end)| start <= end)
        .collect();

    let width = clipped
        .iter()
        .map(|&(_, end)| (end + 1).to_string().len())
        .max()
        .unwrap_or(1);

    let mut output = String::new();
    for (idx, &(start, end)) in clipped.iter().enumerate() {
        if idx > 0 {
            output.push_str("...\n");
        }
        for (offset, line) in lines[start..=end].iter().enumerate() {
            if show_line_numbers {
                output.push_str(&format!("{:>width$}|{}\n", start + offset + 1, line));
            } else {
                output.push_str(line);
                output.push('\n');
            }
        }
    }
    output
}

/// Human-readable name of a symbol kind.
pub fn symbol_kind_name(kind: SymbolKind) -> &'static str {
    match kind {
        SymbolKind::FILE => "File",
        SymbolKind::MODULE => "Module",
        SymbolKind::NAMESPACE => "Namespace",
        SymbolKind::PACKAGE => "Package",
        SymbolKind::CLASS => "Class",
        SymbolKind::METHOD => "Method",
        SymbolKind::PROPERTY => "Property",
        SymbolKind::FIELD => "Field",
        SymbolKind::CONSTRUCTOR => "Constructor",
        SymbolKind::ENUM => "Enum",
        SymbolKind::INTERFACE => "Interface",
        SymbolKind::FUNCTION => "Function",
        SymbolKind::VARIABLE => "Variable",
        SymbolKind::CONSTANT => "Constant",
        SymbolKind::STRING => "String",
        SymbolKind::NUMBER => "Number",
        SymbolKind::BOOLEAN => "Boolean",
        SymbolKind::ARRAY => "Array",
        SymbolKind::OBJECT => "Object",
        SymbolKind::KEY => "Key",
        SymbolKind::NULL => "Null",
        SymbolKind::ENUM_MEMBER => "EnumMember",
        SymbolKind::STRUCT => "Struct",
        SymbolKind::EVENT => "Event",
        SymbolKind::OPERATOR => "Operator",
        SymbolKind::TYPE_PARAMETER => "TypeParameter",
        _ => "Unknown",
    }
}

/// Human-readable name of a diagnostic severity.
pub fn severity_name(severity: Option<DiagnosticSeverity>) -> &'static str {
    match severity {
        Some(DiagnosticSeverity::ERROR) => "Error",
        Some(DiagnosticSeverity::WARNING) => "Warning",
        Some(DiagnosticSeverity::INFORMATION) => "Information",
        Some(DiagnosticSeverity::HINT) => "Hint",
        _ => "Unspecified",
    }
}
