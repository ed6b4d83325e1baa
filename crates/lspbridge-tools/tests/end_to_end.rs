//! End-to-end scenarios through the tool registry.

use lspbridge_lsp::{DiagnosticsReport, Position, SourceLocation, SymbolKind};
use lspbridge_test_utils::assertions::assert_file_equals;
use lspbridge_test_utils::builders::{document_symbol, lens, member, range, symbol, DiagnosticBuilder};
use lspbridge_test_utils::fixtures::{content, TestProject};
use lspbridge_test_utils::{assert_str_contains, MockCall, MockLspBackend};
use lspbridge_tools::{PromptRegistry, Session, ToolContext, ToolError, ToolRegistry};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn registry(backend: &MockLspBackend) -> Arc<ToolRegistry> {
    let session = Arc::new(Session::new(Arc::new(backend.clone())));
    Arc::new(ToolRegistry::with_builtins(session))
}

#[tokio::test]
async fn edit_then_read_definition() {
    let project = TestProject::new().with_go_module("example.com/a").build();
    let path = project.file("a.go");
    let backend = MockLspBackend::new()
        .with_symbols("F", vec![symbol("F", SymbolKind::FUNCTION, &path, 1, 5)])
        .with_document_symbols(
            &path,
            vec![document_symbol("F", SymbolKind::FUNCTION, range(1, 0, 1, 19), range(1, 5, 1, 6))],
        );
    let tools = registry(&backend);
    let ctx = ToolContext::new("e2e", project.path());

    let edited = tools
        .dispatch(
            "apply_text_edit",
            json!({
                "filePath": "a.go",
                "edits": [{"startLine": 2, "endLine": 2, "newText": "func F() { return }"}]
            }),
            &ctx,
        )
        .await
        .unwrap();
    assert_str_contains!(edited.output, "Successfully applied 1 edit(s) to a.go");
    assert_file_equals(&path, "package a\nfunc F() { return }");

    let definition = tools
        .dispatch("read_definition", json!({"symbolName": "F"}), &ctx)
        .await
        .unwrap();
    // showLineNumbers defaults to true.
    assert!(definition.output.ends_with("2|func F() { return }\n"));
}

#[tokio::test]
async fn qualified_lookup_and_references() {
    let project = TestProject::new()
        .with_file("server/server.go", content::GO_SERVER)
        .build();
    let path = project.file("server/server.go");
    let backend = MockLspBackend::new()
        .with_symbols(
            "Server.Run",
            vec![
                member("Server", "Run", SymbolKind::METHOD, &path, 6, 17),
                member("Server", "RunAll", SymbolKind::METHOD, &path, 6, 17),
            ],
        )
        .with_references(
            &path,
            Position::new(6, 17),
            vec![SourceLocation {
                path: path.clone(),
                range: range(12, 3, 12, 6),
            }],
        );
    let tools = registry(&backend);
    let ctx = ToolContext::new("e2e", project.path());

    let output = tools
        .dispatch(
            "find_references",
            json!({"symbolName": "Server::Run", "showLineNumbers": false}),
            &ctx,
        )
        .await
        .unwrap();
    assert_str_contains!(output.output, "Found 1 reference(s) to Server.Run in 1 file(s)");
    assert_str_contains!(output.output, "server/server.go\nReferences: L13:C4\n");
    assert_str_contains!(output.output, "\ts.Run()\n");
}

#[tokio::test]
async fn ambiguous_symbol_is_a_call_error() {
    let project = TestProject::new().build();
    let backend = MockLspBackend::new().with_symbols(
        "F",
        vec![
            symbol("F", SymbolKind::FUNCTION, project.file("a/a.go"), 1, 5),
            symbol("F", SymbolKind::FUNCTION, project.file("b/b.go"), 1, 5),
        ],
    );
    let tools = registry(&backend);
    let ctx = ToolContext::new("e2e", project.path());

    let err = tools
        .dispatch("read_definition", json!({"symbolName": "F"}), &ctx)
        .await
        .unwrap_err();
    assert_eq!(err.operation, "read_definition");
    assert!(matches!(err.source, ToolError::AmbiguousSymbol { .. }));
    assert_str_contains!(err.to_string(), "a/a.go:2:6");
    assert_str_contains!(err.to_string(), "b/b.go:2:6");
}

#[tokio::test]
async fn codelens_listing_then_execution() {
    let project = TestProject::new().with_file("a_test.go", "package a\n\nfunc TestA() {}\n").build();
    let backend = MockLspBackend::new()
        .with_code_lenses(
            project.file("a_test.go"),
            vec![lens(2, "run test", "gopls.test"), lens(2, "debug test", "gopls.debug")],
        )
        .with_command_result("gopls.debug", json!("started"));
    let tools = registry(&backend);
    let ctx = ToolContext::new("e2e", project.path());

    let listing = tools
        .dispatch("get_codelens", json!({"filePath": "a_test.go"}), &ctx)
        .await
        .unwrap();
    assert_str_contains!(listing.output, "[2] debug test (L3-L3) command: gopls.debug");

    let run = tools
        .dispatch("execute_codelens", json!({"filePath": "a_test.go", "index": 2}), &ctx)
        .await
        .unwrap();
    assert_str_contains!(run.output, "Result: \"started\"");

    let err = tools
        .dispatch("execute_codelens", json!({"filePath": "a_test.go", "index": 3}), &ctx)
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "execute_codelens failed: Code lens index 3 out of range: file has 2 code lens(es)"
    );
}

#[tokio::test]
async fn diagnostics_through_registry_and_prompt() {
    let project = TestProject::new().with_file("a.go", "package a\nfunc F() {\n").build();
    let path = project.file("a.go");
    let backend = MockLspBackend::new().with_diagnostics(
        &path,
        DiagnosticsReport::Ready(vec![
            DiagnosticBuilder::warning("unused").at(0, 8).build(),
            DiagnosticBuilder::error("expected '}'").at(1, 10).source("syntax").build(),
        ]),
    );
    let tools = registry(&backend);
    let prompts = PromptRegistry::with_builtins(&tools);
    let ctx = ToolContext::new("e2e", project.path());

    let output = tools
        .dispatch("get_diagnostics", json!({"filePath": "a.go"}), &ctx)
        .await
        .unwrap();
    let error_at = output.output.find("Error at L2:C11: expected '}' [syntax]").unwrap();
    let warning_at = output.output.find("Warning at L1:C9: unused").unwrap();
    assert!(error_at < warning_at);

    let message = prompts
        .render("get-diagnostics", json!({"filePath": "a.go"}), &ctx)
        .await
        .unwrap();
    assert_str_contains!(message.text, "1|package a\n2|func F() {\n");
    assert_eq!(backend.call_count("sync"), 2);
}

#[tokio::test]
async fn missing_required_argument() {
    let backend = MockLspBackend::new();
    let tools = registry(&backend);
    let ctx = ToolContext::new("e2e", "/tmp");

    let err = tools
        .dispatch("get_diagnostics", json!({"includeContext": true}), &ctx)
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(
        err.to_string(),
        "get_diagnostics failed: Validation error: Missing required argument: filePath"
    );
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn cancellation_interrupts_backend_wait() {
    let project = TestProject::new().with_file("a.go", content::GO_SIMPLE).build();
    let backend = MockLspBackend::new().with_delay(Duration::from_secs(30));
    let tools = registry(&backend);
    let token = CancellationToken::new();
    let ctx = ToolContext::new("e2e", project.path()).with_abort(token.clone());

    let call = tokio::spawn({
        let tools = tools.clone();
        async move {
            tools
                .dispatch("get_codelens", json!({"filePath": "a.go"}), &ctx)
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    token.cancel();

    let err = tokio::time::timeout(Duration::from_secs(5), call)
        .await
        .expect("call did not stop after cancellation")
        .unwrap()
        .unwrap_err();
    assert!(matches!(err.source, ToolError::Cancelled));
    assert_eq!(backend.calls(), vec![MockCall::SyncDocument(project.file("a.go"))]);
}
