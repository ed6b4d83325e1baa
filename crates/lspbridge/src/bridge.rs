//! Wiring: language server, tool registry, prompts and the MCP server.

use crate::config::Settings;
use anyhow::Context;
use async_trait::async_trait;
use lspbridge_lsp::LspClient;
use lspbridge_mcp::{
    McpPromptExecutor, McpServer, McpServerPrompt, McpServerToolBuilder, McpToolContext,
    McpToolExecutor, PromptArgument,
};
use lspbridge_tools::{
    Prompt, PromptRegistry, Session, SessionSettings, Tool, ToolContext, ToolRegistry,
};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Runs one registered tool for MCP requests.
struct ToolExecutor {
    name: String,
    registry: Arc<ToolRegistry>,
    root: PathBuf,
}

#[async_trait]
impl McpToolExecutor for ToolExecutor {
    async fn execute(&self, args: Value, ctx: &McpToolContext) -> Result<String, String> {
        let tool_ctx = ToolContext::new(ctx.request_id.clone(), self.root.clone())
            .with_abort(ctx.abort.clone());
        self.registry
            .dispatch(&self.name, args, &tool_ctx)
            .await
            .map(|output| output.output)
            .map_err(|e| e.to_string())
    }
}

/// Renders one registered prompt for MCP requests.
struct PromptExecutor {
    name: String,
    registry: Arc<PromptRegistry>,
    root: PathBuf,
}

#[async_trait]
impl McpPromptExecutor for PromptExecutor {
    async fn render(&self, args: Value, ctx: &McpToolContext) -> String {
        let tool_ctx = ToolContext::new(ctx.request_id.clone(), self.root.clone())
            .with_abort(ctx.abort.clone());
        match self.registry.render(&self.name, args, &tool_ctx).await {
            Ok(message) => message.text,
            Err(e) => e.to_string(),
        }
    }
}

/// Expose every tool and prompt bound to `session` through an MCP server.
pub fn build_server(session: Arc<Session>, root: PathBuf) -> McpServer {
    let tools = Arc::new(ToolRegistry::with_builtins(session));
    let prompts = Arc::new(PromptRegistry::with_builtins(&tools));

    let mut server = McpServer::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    for tool in tools.all() {
        server = server.with_tool(
            McpServerToolBuilder::new(tool.id())
                .description(tool.description())
                .parameters(tool.parameters_schema())
                .build(ToolExecutor {
                    name: tool.id().to_string(),
                    registry: tools.clone(),
                    root: root.clone(),
                }),
        );
    }

    for prompt in prompts.all() {
        let arguments = prompt
            .schema()
            .fields
            .iter()
            .map(|field| PromptArgument {
                name: field.name.to_string(),
                description: Some(field.description.to_string()),
                required: field.required,
            })
            .collect();
        server = server.with_prompt(McpServerPrompt {
            name: prompt.id().to_string(),
            description: prompt.description().to_string(),
            response_description: prompt.response_description().to_string(),
            arguments,
            executor: Arc::new(PromptExecutor {
                name: prompt.id().to_string(),
                registry: prompts.clone(),
                root: root.clone(),
            }),
        });
    }

    server
}

/// Start the language server and serve MCP on stdio until the client leaves.
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    let client = Arc::new(
        LspClient::start(settings.lsp.clone(), settings.workspace.clone())
            .await
            .with_context(|| format!("Failed to start language server {}", settings.lsp.command))?,
    );

    let session = Arc::new(Session::new(client.clone()).with_settings(SessionSettings {
        context_lines: settings.context_lines,
    }));
    let server = Arc::new(build_server(session, settings.workspace.clone()));
    info!(tools = ?server.tool_names(), prompts = ?server.prompt_names(), "Serving MCP on stdio");

    let served = tokio::select! {
        result = lspbridge_mcp::serve_stdio(server) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            Ok(())
        }
    };

    if let Err(e) = client.shutdown().await {
        warn!(error = %e, "Language server did not shut down cleanly");
    }
    served.context("MCP transport failed")
}
