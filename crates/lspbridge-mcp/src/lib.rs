//! Model Context Protocol (MCP) server for lspbridge.
//!
//! Exposes a set of tools and prompts to an MCP client over stdio.
//!
//! ```text
//! ┌─────────────┐  JSON-RPC / stdio   ┌─────────────┐     ┌──────────────┐
//! │ MCP client  │ ◄─────────────────► │  McpServer  │────▶│  executors   │
//! │  (agent)    │                     │             │     │ (tools/prompts)
//! └─────────────┘                     └─────────────┘     └──────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use lspbridge_mcp::{McpServer, McpServerToolBuilder, McpToolContext, McpToolExecutor};
//! use serde_json::Value;
//! use std::sync::Arc;
//!
//! struct Hello;
//!
//! #[async_trait::async_trait]
//! impl McpToolExecutor for Hello {
//!     async fn execute(&self, _args: Value, _ctx: &McpToolContext) -> Result<String, String> {
//!         Ok("hello".to_string())
//!     }
//! }
//!
//! # async fn example() -> lspbridge_mcp::McpResult<()> {
//! let server = McpServer::new("demo", "0.1.0")
//!     .with_tool(McpServerToolBuilder::new("hello").description("Say hello").build(Hello));
//! lspbridge_mcp::serve_stdio(Arc::new(server)).await?;
//! # Ok(())
//! # }
//! ```

mod error;
pub mod protocol;
pub mod serve;
pub mod stdio;

pub use error::{McpError, McpResult};
pub use protocol::{McpPrompt, McpTool, PromptArgument, ToolCallResult, ToolContent};
pub use serve::{
    McpPromptExecutor, McpServer, McpServerPrompt, McpServerTool, McpServerToolBuilder,
    McpToolContext, McpToolExecutor,
};
pub use stdio::{serve, serve_stdio};
