//! List and run a file's code lenses.
//!
//! Lens indices are 1-based positions in the list the server returns.
//! They are only meaningful relative to the latest listing, so executing a
//! lens always fetches the list again before checking the index.

use crate::error::{ToolError, ToolResult};
use crate::path::{display_path, resolve_path};
use crate::schema::{FieldSpec, ToolSchema};
use crate::session::Session;
use crate::{parse_args, Tool, ToolContext, ToolOutput};
use async_trait::async_trait;
use lspbridge_lsp::{CodeLens, LspError};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileArgs {
    file_path: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteArgs {
    file_path: String,
    index: i64,
}

/// Sync the document and fetch its lenses.
async fn fetch_lenses(
    session: &Session,
    ctx: &ToolContext,
    path: &Path,
) -> ToolResult<Vec<CodeLens>> {
    let backend = session.backend();
    session
        .request(&ctx.abort, backend.sync_document(path))
        .await?;
    session
        .request(&ctx.abort, backend.code_lenses(path))
        .await
}

fn render_lens(index: usize, lens: &CodeLens) -> String {
    let (title, command) = match &lens.command {
        Some(command) => (command.title.as_str(), command.command.as_str()),
        None => ("(unresolved)", "(none)"),
    };
    format!(
        "[{}] {} (L{}-L{}) command: {}",
        index,
        title,
        lens.range.start.line + 1,
        lens.range.end.line + 1,
        command
    )
}

/// Tool that lists the code lenses of a file.
pub struct GetCodeLensTool {
    schema: ToolSchema,
    session: Arc<Session>,
}

impl GetCodeLensTool {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            schema: ToolSchema::new(
                "get_codelens",
                "Get code lens hints for a given file from the language server. Use the returned index with execute_codelens.",
            )
            .field(FieldSpec::string("filePath", "The path to the file to get code lens information for").required()),
            session,
        }
    }
}

#[async_trait]
impl Tool for GetCodeLensTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let args: FileArgs = parse_args(args)?;
        let path = resolve_path(&args.file_path, ctx)?;
        let shown = display_path(&path, &ctx.root_dir);

        let lenses = fetch_lenses(&self.session, ctx, &path).await?;
        if lenses.is_empty() {
            return Ok(ToolOutput::new(
                shown.clone(),
                format!("No code lens found for {shown}"),
            )
            .with_metadata(json!({"count": 0})));
        }

        let mut output = format!("Code lenses for {} ({}):\n", shown, lenses.len());
        for (i, lens) in lenses.iter().enumerate() {
            output.push_str(&render_lens(i + 1, lens));
            output.push('\n');
        }

        Ok(ToolOutput::new(shown, output).with_metadata(json!({"count": lenses.len()})))
    }
}

/// Tool that runs the command of one code lens.
pub struct ExecuteCodeLensTool {
    schema: ToolSchema,
    session: Arc<Session>,
}

impl ExecuteCodeLensTool {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            schema: ToolSchema::new(
                "execute_codelens",
                "Execute a code lens command for a given file and lens index. Indices come from get_codelens.",
            )
            .field(FieldSpec::string("filePath", "The path to the file containing the code lens").required())
            .field(FieldSpec::integer("index", "The 1-based index of the code lens to execute").required()),
            session,
        }
    }
}

#[async_trait]
impl Tool for ExecuteCodeLensTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolResult<ToolOutput> {
        let args: ExecuteArgs = parse_args(args)?;
        let path = resolve_path(&args.file_path, ctx)?;
        let shown = display_path(&path, &ctx.root_dir);

        let lenses = fetch_lenses(&self.session, ctx, &path).await?;
        let lens = usize::try_from(args.index)
            .ok()
            .and_then(|i| i.checked_sub(1))
            .and_then(|i| lenses.get(i))
            .ok_or(ToolError::IndexOutOfRange {
                index: args.index,
                count: lenses.len(),
            })?;

        let command = lens.command.as_ref().ok_or_else(|| {
            ToolError::Backend(LspError::request_failed(format!(
                "code lens {} in {} has no command, even after resolving",
                args.index, shown
            )))
        })?;

        debug!(command = %command.command, index = args.index, "Executing code lens");
        let result = self
            .session
            .request(&ctx.abort, self.session.backend().execute_command(command))
            .await?;

        let mut output = format!(
            "Successfully executed code lens {} ({}) in {}",
            args.index, command.title, shown
        );
        if let Some(result) = result.as_ref().filter(|r| !r.is_null()) {
            output.push_str(&format!("\nResult: {result}"));
        }

        Ok(ToolOutput::new(shown, output).with_metadata(json!({
            "command": command.command,
            "result": result,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lspbridge_test_utils::builders::{lens, unresolved_lens};
    use lspbridge_test_utils::fixtures::TestProject;
    use lspbridge_test_utils::{MockCall, MockLspBackend};

    const TEST_FILE: &str = "package a\n\nimport \"testing\"\n\nfunc TestA(t *testing.T) {}\n\nfunc TestB(t *testing.T) {}\n";

    fn setup(lenses: Vec<CodeLens>) -> (lspbridge_test_utils::fixtures::BuiltTestProject, MockLspBackend, Arc<Session>) {
        let project = TestProject::new().with_file("a_test.go", TEST_FILE).build();
        let backend = MockLspBackend::new()
            .with_code_lenses(project.file("a_test.go"), lenses)
            .with_command_result("gopls.test", json!({"passed": true}));
        let session = Arc::new(Session::new(Arc::new(backend.clone())));
        (project, backend, session)
    }

    #[test]
    fn test_render_lens() {
        assert_eq!(
            render_lens(1, &lens(4, "run test", "gopls.test")),
            "[1] run test (L5-L5) command: gopls.test"
        );
        assert_eq!(
            render_lens(2, &unresolved_lens(0)),
            "[2] (unresolved) (L1-L1) command: (none)"
        );
    }

    #[tokio::test]
    async fn test_get_codelens_lists_in_order() {
        let (project, backend, session) = setup(vec![
            lens(4, "run test", "gopls.test"),
            lens(6, "run test", "gopls.test"),
        ]);
        let ctx = ToolContext::new("t", project.path());

        let output = GetCodeLensTool::new(session)
            .execute(json!({"filePath": "a_test.go"}), &ctx)
            .await
            .unwrap();

        assert_eq!(
            output.output,
            "Code lenses for a_test.go (2):\n[1] run test (L5-L5) command: gopls.test\n[2] run test (L7-L7) command: gopls.test\n"
        );
        assert_eq!(backend.calls()[0], MockCall::SyncDocument(project.file("a_test.go")));
    }

    #[tokio::test]
    async fn test_get_codelens_empty() {
        let (project, _backend, session) = setup(Vec::new());
        let ctx = ToolContext::new("t", project.path());

        let output = GetCodeLensTool::new(session)
            .execute(json!({"filePath": "a_test.go"}), &ctx)
            .await
            .unwrap();
        assert_eq!(output.output, "No code lens found for a_test.go");
    }

    #[tokio::test]
    async fn test_execute_every_listed_index() {
        let lenses = vec![lens(4, "run test", "gopls.test"), lens(6, "run test", "gopls.test")];
        let (project, backend, session) = setup(lenses.clone());
        let ctx = ToolContext::new("t", project.path());
        let tool = ExecuteCodeLensTool::new(session);

        for index in 1..=lenses.len() {
            let output = tool
                .execute(json!({"filePath": "a_test.go", "index": index}), &ctx)
                .await
                .unwrap();
            assert!(output.output.starts_with(&format!(
                "Successfully executed code lens {index} (run test) in a_test.go"
            )));
            assert!(output.output.contains("Result: {\"passed\":true}"));
        }

        let executed: Vec<_> = backend
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                MockCall::ExecuteCommand(command) => command.arguments,
                _ => None,
            })
            .collect();
        assert_eq!(executed, vec![vec![json!(4)], vec![json!(6)]]);
    }

    #[tokio::test]
    async fn test_execute_out_of_range() {
        let (project, _backend, session) = setup(vec![lens(4, "run test", "gopls.test")]);
        let ctx = ToolContext::new("t", project.path());
        let tool = ExecuteCodeLensTool::new(session);

        for index in [0, 2, -1] {
            let err = tool
                .execute(json!({"filePath": "a_test.go", "index": index}), &ctx)
                .await
                .unwrap_err();
            match err {
                ToolError::IndexOutOfRange { index: got, count } => {
                    assert_eq!(got, index);
                    assert_eq!(count, 1);
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_execute_refetches_lenses() {
        let (project, backend, session) = setup(vec![
            lens(4, "run test", "gopls.test"),
            lens(6, "run test", "gopls.test"),
        ]);
        let ctx = ToolContext::new("t", project.path());

        // The file changed between listing and executing.
        backend.set_code_lenses(project.file("a_test.go"), vec![lens(4, "run test", "gopls.test")]);
        let err = ExecuteCodeLensTool::new(session)
            .execute(json!({"filePath": "a_test.go", "index": 2}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::IndexOutOfRange { index: 2, count: 1 }));
        assert_eq!(backend.call_count("textDocument/codeLens"), 1);
    }

    #[tokio::test]
    async fn test_execute_lens_without_command() {
        let (project, _backend, session) = setup(vec![unresolved_lens(0)]);
        let ctx = ToolContext::new("t", project.path());

        let err = ExecuteCodeLensTool::new(session)
            .execute(json!({"filePath": "a_test.go", "index": 1}), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("has no command"));
        assert!(matches!(err, ToolError::Backend(_)));
    }
}
