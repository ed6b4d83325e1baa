//! Report the diagnostics of one file.

use crate::error::{ToolError, ToolResult};
use crate::path::{display_path, resolve_path};
use crate::render::{excerpt, format_position, range_lines, severity_name, split_lines, widen};
use crate::schema::{FieldSpec, ToolSchema};
use crate::session::Session;
use crate::{parse_args, Tool, ToolContext, ToolOutput};
use async_trait::async_trait;
use lspbridge_lsp::{Diagnostic, DiagnosticSeverity, DiagnosticsReport, NumberOrString};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Tool that lists a file's diagnostics, most severe first.
pub struct GetDiagnosticsTool {
    schema: ToolSchema,
    session: Arc<Session>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiagnosticsArgs {
    file_path: String,
    include_context: bool,
    show_line_numbers: bool,
}

impl GetDiagnosticsTool {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            schema: ToolSchema::new(
                "get_diagnostics",
                "Get diagnostic information (errors, warnings, hints) for a specific file from the language server.",
            )
            .field(FieldSpec::string("filePath", "The path to the file to get diagnostics for").required())
            .field(
                FieldSpec::boolean("includeContext", "Include source lines around each diagnostic")
                    .default_value(false),
            )
            .field(
                FieldSpec::boolean("showLineNumbers", "Show line numbers in the source excerpts")
                    .default_value(true),
            ),
            session,
        }
    }
}

fn severity_rank(severity: Option<DiagnosticSeverity>) -> u8 {
    match severity {
        Some(DiagnosticSeverity::ERROR) => 0,
        Some(DiagnosticSeverity::WARNING) => 1,
        Some(DiagnosticSeverity::INFORMATION) => 2,
        Some(DiagnosticSeverity::HINT) => 3,
        _ => 4,
    }
}

/// Order by severity, then line, then column.
fn sort_diagnostics(diagnostics: &mut [Diagnostic]) {
    diagnostics.sort_by_key(|d| {
        (
            severity_rank(d.severity),
            d.range.start.line,
            d.range.start.character,
        )
    });
}

fn summary(diagnostics: &[Diagnostic]) -> String {
    let mut counts = [0usize; 5];
    for d in diagnostics {
        counts[severity_rank(d.severity) as usize] += 1;
    }
    let names = ["error", "warning", "information", "hint", "unspecified"];
    counts
        .iter()
        .zip(names)
        .filter(|(count, _)| **count > 0)
        .map(|(count, name)| {
            if *count == 1 || name == "information" {
                format!("{count} {name}")
            } else {
                format!("{count} {name}s")
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn header(diagnostic: &Diagnostic) -> String {
    let mut line = format!(
        "{} at {}: {}",
        severity_name(diagnostic.severity),
        format_position(diagnostic.range.start),
        diagnostic.message
    );
    let code = diagnostic.code.as_ref().map(|c| match c {
        NumberOrString::Number(n) => n.to_string(),
        NumberOrString::String(s) => s.clone(),
    });
    match (diagnostic.source.as_deref(), code) {
        (Some(source), Some(code)) => line.push_str(&format!(" [{source} {code}]")),
        (Some(source), None) => line.push_str(&format!(" [{source}]")),
        (None, Some(code)) => line.push_str(&format!(" [{code}]")),
        (None, None) => {}
    }
    line
}

#[async_trait]
impl Tool for GetDiagnosticsTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let args: DiagnosticsArgs = parse_args(args)?;
        let path = resolve_path(&args.file_path, ctx)?;
        let shown = display_path(&path, &ctx.root_dir);

        let backend = self.session.backend();
        self.session
            .request(&ctx.abort, backend.sync_document(&path))
            .await?;
        let report = self
            .session
            .request(&ctx.abort, backend.diagnostics(&path))
            .await?;

        let mut diagnostics = match report {
            DiagnosticsReport::Ready(diagnostics) => diagnostics,
            DiagnosticsReport::Unavailable => return Err(ToolError::DiagnosticsUnavailable(path)),
        };
        if diagnostics.is_empty() {
            return Ok(ToolOutput::new(
                shown.clone(),
                format!("No diagnostics found for {shown}"),
            )
            .with_metadata(json!({"count": 0})));
        }
        sort_diagnostics(&mut diagnostics);

        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ToolError::file_io(&path, e))?;
        let lines = split_lines(&text);
        let context = if args.include_context {
            self.session.settings().context_lines
        } else {
            0
        };

        let mut output = format!("Diagnostics for {}: {}\n", shown, summary(&diagnostics));
        for diagnostic in &diagnostics {
            output.push('\n');
            output.push_str(&header(diagnostic));
            output.push('\n');
            let span = widen(range_lines(diagnostic.range), context, lines.len());
            output.push_str(&excerpt(&lines, span, args.show_line_numbers));
        }

        Ok(ToolOutput::new(shown, output).with_metadata(json!({
            "count": diagnostics.len(),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lspbridge_test_utils::assertions::assert_in_order;
    use lspbridge_test_utils::builders::{range, DiagnosticBuilder};
    use lspbridge_test_utils::fixtures::{content, TestProject};
    use lspbridge_test_utils::{MockCall, MockLspBackend};

    fn tool(backend: MockLspBackend) -> GetDiagnosticsTool {
        GetDiagnosticsTool::new(Arc::new(Session::new(Arc::new(backend))))
    }

    fn args(path: &str, include_context: bool) -> Value {
        json!({"filePath": path, "includeContext": include_context, "showLineNumbers": true})
    }

    #[test]
    fn test_sort_order() {
        let mut diagnostics = vec![
            DiagnosticBuilder::hint("h").at(0, 0).build(),
            DiagnosticBuilder::unspecified("u").at(0, 0).build(),
            DiagnosticBuilder::error("e2").at(5, 1).build(),
            DiagnosticBuilder::warning("w").at(0, 0).build(),
            DiagnosticBuilder::error("e1").at(2, 9).build(),
            DiagnosticBuilder::error("e0").at(2, 3).build(),
            DiagnosticBuilder::information("i").at(0, 0).build(),
        ];
        sort_diagnostics(&mut diagnostics);
        let order: Vec<&str> = diagnostics.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(order, vec!["e0", "e1", "e2", "w", "i", "h", "u"]);
    }

    #[test]
    fn test_summary() {
        let diagnostics = vec![
            DiagnosticBuilder::error("a").build(),
            DiagnosticBuilder::error("b").build(),
            DiagnosticBuilder::warning("c").build(),
        ];
        assert_eq!(summary(&diagnostics), "2 errors, 1 warning");
    }

    #[test]
    fn test_header() {
        let d = DiagnosticBuilder::error("undefined: x")
            .at(3, 4)
            .source("compiler")
            .code("UndeclaredName")
            .build();
        assert_eq!(header(&d), "Error at L4:C5: undefined: x [compiler UndeclaredName]");
        let d = DiagnosticBuilder::warning("w").numeric_code(7).build();
        assert_eq!(header(&d), "Warning at L1:C1: w [7]");
    }

    #[tokio::test]
    async fn test_diagnostics_sorted_with_own_line() {
        let project = TestProject::new().with_file("server.go", content::GO_SERVER).build();
        let path = project.file("server.go");
        let backend = MockLspBackend::new().with_diagnostics(
            &path,
            DiagnosticsReport::Ready(vec![
                DiagnosticBuilder::warning("unused variable").at(11, 1).build(),
                DiagnosticBuilder::error("missing return").spanning(range(8, 0, 8, 1)).build(),
            ]),
        );
        let ctx = ToolContext::new("t", project.path());

        let output = tool(backend.clone()).execute(args("server.go", false), &ctx).await.unwrap();

        let text = &output.output;
        assert!(text.starts_with("Diagnostics for server.go: 1 error, 1 warning\n"));
        assert_in_order(
            text,
            &["Error at L9:C1: missing return\n9|}\n", "Warning at L12:C2: unused variable\n12|\ts := &Server{}\n"],
        );
        assert_eq!(
            backend.calls(),
            vec![MockCall::SyncDocument(path.clone()), MockCall::Diagnostics(path)]
        );
    }

    #[tokio::test]
    async fn test_diagnostics_with_context() {
        let project = TestProject::new().with_file("server.go", content::GO_SERVER).build();
        let path = project.file("server.go");
        let backend = MockLspBackend::new().with_diagnostics(
            &path,
            DiagnosticsReport::Ready(vec![DiagnosticBuilder::error("boom").at(7, 1).build()]),
        );
        let ctx = ToolContext::new("t", project.path());

        let output = tool(backend).execute(args("server.go", true), &ctx).await.unwrap();
        assert!(output.output.contains(
            "Error at L8:C2: boom\n 5|}\n 6|\n 7|func (s *Server) Run() error {\n 8|\treturn nil\n 9|}\n10|\n11|func Start() {\n"
        ));
    }

    #[tokio::test]
    async fn test_no_diagnostics() {
        let project = TestProject::new().with_file("a.go", content::GO_SIMPLE).build();
        let backend = MockLspBackend::new()
            .with_diagnostics(project.file("a.go"), DiagnosticsReport::Ready(Vec::new()));
        let ctx = ToolContext::new("t", project.path());

        let output = tool(backend).execute(args("a.go", false), &ctx).await.unwrap();
        assert_eq!(output.output, "No diagnostics found for a.go");
    }

    #[tokio::test]
    async fn test_diagnostics_unavailable() {
        let project = TestProject::new().with_file("a.go", content::GO_SIMPLE).build();
        let ctx = ToolContext::new("t", project.path());

        let err = tool(MockLspBackend::new())
            .execute(args("a.go", false), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::DiagnosticsUnavailable(_)));
    }

    #[tokio::test]
    async fn test_sync_failure_is_backend_error() {
        let project = TestProject::new().with_file("a.go", content::GO_SIMPLE).build();
        let backend = MockLspBackend::new().failing("sync", "file vanished");
        let ctx = ToolContext::new("t", project.path());

        let err = tool(backend).execute(args("a.go", false), &ctx).await.unwrap_err();
        assert!(matches!(err, ToolError::Backend(_)));
    }
}
