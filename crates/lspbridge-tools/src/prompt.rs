//! Prompts: conversational wrappers around the read-only tools.
//!
//! A prompt always produces a message. When the underlying tool fails, the
//! failure is written into the message text instead of being returned.

use crate::error::{CallError, ToolError, ToolResult};
use crate::registry::ToolRegistry;
use crate::schema::{FieldSpec, PromptSchema};
use crate::{BoxedTool, ToolContext};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Author of a prompt message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    User,
    Assistant,
}

/// A single message produced by a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub text: String,
}

impl PromptMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: PromptRole::User,
            text: text.into(),
        }
    }
}

/// The main trait for prompts.
#[async_trait]
pub trait Prompt: Send + Sync {
    /// Name, description and arguments.
    fn schema(&self) -> &PromptSchema;

    fn id(&self) -> &str {
        self.schema().name
    }

    fn description(&self) -> &str {
        self.schema().description
    }

    /// Description attached to every rendered response.
    fn response_description(&self) -> &str;

    /// Render the prompt. Never fails; errors become message text.
    async fn render(&self, args: Value, ctx: &ToolContext) -> PromptMessage;
}

/// A boxed prompt for dynamic dispatch.
pub type BoxedPrompt = Arc<dyn Prompt>;

/// The single argument every built-in prompt takes.
pub const PROMPT_ARGUMENT: &str = "symbol";

/// A prompt that runs one tool with fixed display options.
pub struct ToolPrompt {
    schema: PromptSchema,
    response_description: &'static str,
    tool: BoxedTool,
    /// Tool argument that receives the prompt's subject.
    target: &'static str,
    fixed: Vec<(&'static str, Value)>,
    failure: &'static str,
}

impl ToolPrompt {
    /// Accept the tool's own argument name in place of [`PROMPT_ARGUMENT`].
    fn normalize(&self, args: Value) -> Value {
        match args {
            Value::Object(mut map) => {
                if !map.contains_key(PROMPT_ARGUMENT) {
                    if let Some(value) = map.remove(self.target) {
                        map.insert(PROMPT_ARGUMENT.to_string(), value);
                    }
                }
                Value::Object(map)
            }
            other => other,
        }
    }

    async fn run(&self, args: &Value, ctx: &ToolContext) -> ToolResult<String> {
        let mut tool_args = self.schema.validate(args)?;
        if let Some(subject) = tool_args.remove(PROMPT_ARGUMENT) {
            tool_args.insert(self.target.to_string(), subject);
        }
        for (name, value) in &self.fixed {
            tool_args.insert((*name).to_string(), value.clone());
        }
        let tool_args = self.tool.schema().validate(&Value::Object(tool_args))?;
        let output = self.tool.execute(Value::Object(tool_args), ctx).await?;
        Ok(output.output)
    }
}

#[async_trait]
impl Prompt for ToolPrompt {
    fn schema(&self) -> &PromptSchema {
        &self.schema
    }

    fn response_description(&self) -> &str {
        self.response_description
    }

    async fn render(&self, args: Value, ctx: &ToolContext) -> PromptMessage {
        let args = self.normalize(args);
        match self.run(&args, ctx).await {
            Ok(text) => PromptMessage::user(text),
            Err(e) => {
                let subject = args
                    .get(PROMPT_ARGUMENT)
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                warn!(prompt = self.schema.name, call_id = %ctx.call_id, error = %e, "Prompt failed");
                PromptMessage::user(format!("{} {}: {}", self.failure, subject, e))
            }
        }
    }
}

fn symbol_prompt(
    name: &'static str,
    description: &'static str,
    response_description: &'static str,
    tool: BoxedTool,
    failure: &'static str,
) -> ToolPrompt {
    ToolPrompt {
        schema: PromptSchema::new(name, description)
            .field(FieldSpec::string(PROMPT_ARGUMENT, "The name of the symbol").required()),
        response_description,
        tool,
        target: "symbolName",
        fixed: vec![("showLineNumbers", Value::Bool(true))],
        failure,
    }
}

fn file_prompt(
    name: &'static str,
    description: &'static str,
    response_description: &'static str,
    tool: BoxedTool,
    fixed: Vec<(&'static str, Value)>,
    failure: &'static str,
) -> ToolPrompt {
    ToolPrompt {
        schema: PromptSchema::new(name, description)
            .field(FieldSpec::string(PROMPT_ARGUMENT, "The path to the file").required()),
        response_description,
        tool,
        target: "filePath",
        fixed,
        failure,
    }
}

/// Registry of available prompts.
pub struct PromptRegistry {
    prompts: HashMap<String, BoxedPrompt>,
    order: Vec<String>,
}

impl PromptRegistry {
    pub fn new() -> Self {
        Self {
            prompts: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// The built-in prompts for the tools `tools` provides.
    pub fn with_builtins(tools: &ToolRegistry) -> Self {
        let mut registry = Self::new();

        if let Some(tool) = tools.get("read_definition") {
            registry.register(Arc::new(symbol_prompt(
                "read-definition",
                "Show the source code definition of a symbol",
                "Read definition prompt response",
                tool.clone(),
                "There is an error reading the definition for",
            )));
        }
        if let Some(tool) = tools.get("find_references") {
            registry.register(Arc::new(symbol_prompt(
                "find-references",
                "Show every reference to a symbol",
                "Find references prompt response",
                tool.clone(),
                "There is an error finding references for",
            )));
        }
        if let Some(tool) = tools.get("get_codelens") {
            registry.register(Arc::new(file_prompt(
                "get-codelens",
                "List the code lenses of a file",
                "Get codelens prompt response",
                tool.clone(),
                Vec::new(),
                "There is an error getting codelens for file",
            )));
        }
        if let Some(tool) = tools.get("get_diagnostics") {
            registry.register(Arc::new(file_prompt(
                "get-diagnostics",
                "Show the diagnostics of a file with surrounding source",
                "Get diagnostics prompt response",
                tool.clone(),
                vec![
                    ("includeContext", Value::Bool(true)),
                    ("showLineNumbers", Value::Bool(true)),
                ],
                "There is an error getting diagnostics for file",
            )));
        }

        registry
    }

    /// Register a prompt, replacing any prompt with the same ID.
    pub fn register(&mut self, prompt: BoxedPrompt) {
        let id = prompt.id().to_string();
        if self.prompts.insert(id.clone(), prompt).is_none() {
            self.order.push(id);
        }
    }

    pub fn get(&self, id: &str) -> Option<&BoxedPrompt> {
        self.prompts.get(id)
    }

    /// List all prompt IDs in registration order.
    pub fn list(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    /// Get all prompts in registration order.
    pub fn all(&self) -> impl Iterator<Item = &BoxedPrompt> {
        self.order.iter().filter_map(|id| self.prompts.get(id))
    }

    /// Render the named prompt. Only an unknown name is an error.
    pub async fn render(
        &self,
        name: &str,
        args: Value,
        ctx: &ToolContext,
    ) -> Result<PromptMessage, CallError> {
        match self.prompts.get(name) {
            Some(prompt) => Ok(prompt.render(args, ctx).await),
            None => Err(CallError::new(
                name,
                ToolError::validation(format!("Unknown prompt: {name}")),
            )),
        }
    }
}

impl Default for PromptRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use lspbridge_lsp::{DiagnosticsReport, SymbolKind};
    use lspbridge_test_utils::builders::{document_symbol, lens, range, symbol, DiagnosticBuilder};
    use lspbridge_test_utils::fixtures::{content, BuiltTestProject, TestProject};
    use lspbridge_test_utils::MockLspBackend;
    use serde_json::json;

    fn registries(backend: MockLspBackend) -> PromptRegistry {
        let session = Arc::new(Session::new(Arc::new(backend)));
        PromptRegistry::with_builtins(&ToolRegistry::with_builtins(session))
    }

    fn project() -> BuiltTestProject {
        TestProject::new().with_file("a.go", content::GO_SIMPLE).build()
    }

    #[test]
    fn test_builtins() {
        let prompts = registries(MockLspBackend::new());
        assert_eq!(
            prompts.list(),
            vec!["read-definition", "find-references", "get-codelens", "get-diagnostics"]
        );
        let read = prompts.get("read-definition").unwrap();
        assert_eq!(read.response_description(), "Read definition prompt response");
        assert_eq!(read.schema().to_prompt_arguments()[0]["name"], "symbol");
        let diags = prompts.get("get-diagnostics").unwrap();
        assert_eq!(diags.schema().to_prompt_arguments()[0]["name"], "symbol");
    }

    #[test]
    fn test_builtins_skip_missing_tools() {
        assert!(PromptRegistry::with_builtins(&ToolRegistry::new()).list().is_empty());
    }

    #[tokio::test]
    async fn test_read_definition_prompt_shows_line_numbers() {
        let project = project();
        let path = project.file("a.go");
        let backend = MockLspBackend::new()
            .with_symbols("F", vec![symbol("F", SymbolKind::FUNCTION, &path, 1, 5)])
            .with_document_symbols(
                &path,
                vec![document_symbol("F", SymbolKind::FUNCTION, range(1, 0, 1, 11), range(1, 5, 1, 6))],
            );
        let ctx = ToolContext::new("t", project.path());

        let message = registries(backend)
            .render("read-definition", json!({"symbolName": "F"}), &ctx)
            .await
            .unwrap();
        assert_eq!(message.role, PromptRole::User);
        assert!(message.text.ends_with("2|func F() {}\n"));
    }

    #[tokio::test]
    async fn test_failure_becomes_message_text() {
        let project = project();
        let ctx = ToolContext::new("t", project.path());

        let message = registries(MockLspBackend::new())
            .render("find-references", json!({"symbolName": "Nope"}), &ctx)
            .await
            .unwrap();
        assert_eq!(
            message.text,
            "There is an error finding references for Nope: Symbol not found: Nope"
        );
    }

    #[tokio::test]
    async fn test_missing_argument_becomes_message_text() {
        let project = project();
        let ctx = ToolContext::new("t", project.path());

        let message = registries(MockLspBackend::new())
            .render("get-codelens", json!({}), &ctx)
            .await
            .unwrap();
        assert_eq!(
            message.text,
            "There is an error getting codelens for file : Validation error: Missing required argument: symbol"
        );
    }

    #[tokio::test]
    async fn test_every_prompt_takes_symbol_argument() {
        let project = project();
        let path = project.file("a.go");
        let backend = MockLspBackend::new()
            .with_symbols("F", vec![symbol("F", SymbolKind::FUNCTION, &path, 1, 5)])
            .with_document_symbols(
                &path,
                vec![document_symbol("F", SymbolKind::FUNCTION, range(1, 0, 1, 11), range(1, 5, 1, 6))],
            )
            .with_code_lenses(&path, vec![lens(1, "run", "go.run")])
            .with_diagnostics(&path, DiagnosticsReport::Ready(Vec::new()));
        let prompts = registries(backend);
        let ctx = ToolContext::new("t", project.path());

        let cases = [
            ("read-definition", "F", "2|func F() {}"),
            ("find-references", "F", "No references found"),
            ("get-codelens", "a.go", "[1] run"),
            ("get-diagnostics", "a.go", "No diagnostics found"),
        ];
        for (name, subject, expected) in cases {
            let message = prompts
                .render(name, json!({ "symbol": subject }), &ctx)
                .await
                .unwrap();
            assert!(message.text.contains(expected), "{name}: {}", message.text);
        }
    }

    #[tokio::test]
    async fn test_failure_names_subject_given_as_symbol() {
        let project = project();
        let ctx = ToolContext::new("t", project.path());

        let message = registries(MockLspBackend::new())
            .render("read-definition", json!({"symbol": "Missing"}), &ctx)
            .await
            .unwrap();
        assert_eq!(
            message.text,
            "There is an error reading the definition for Missing: Symbol not found: Missing"
        );
    }

    #[tokio::test]
    async fn test_diagnostics_prompt_includes_context() {
        let project = TestProject::new().with_file("server.go", content::GO_SERVER).build();
        let path = project.file("server.go");
        let backend = MockLspBackend::new().with_diagnostics(
            &path,
            DiagnosticsReport::Ready(vec![DiagnosticBuilder::error("boom").at(7, 1).build()]),
        );
        let ctx = ToolContext::new("t", project.path());

        let message = registries(backend)
            .render("get-diagnostics", json!({"filePath": "server.go"}), &ctx)
            .await
            .unwrap();
        assert!(message.text.contains(" 6|\n 7|func (s *Server) Run() error {\n 8|\treturn nil\n"));
    }

    #[tokio::test]
    async fn test_codelens_prompt() {
        let project = project();
        let backend = MockLspBackend::new()
            .with_code_lenses(project.file("a.go"), vec![lens(1, "run", "go.run")]);
        let ctx = ToolContext::new("t", project.path());

        let message = registries(backend)
            .render("get-codelens", json!({"filePath": "a.go"}), &ctx)
            .await
            .unwrap();
        assert!(message.text.contains("[1] run (L2-L2) command: go.run"));
    }

    #[tokio::test]
    async fn test_unknown_prompt() {
        let err = registries(MockLspBackend::new())
            .render("nope", json!({}), &ToolContext::new("t", "/tmp"))
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }
}
