//! lspbridge - language-server intelligence for coding agents.
//!
//! This is the main entry point for the lspbridge CLI. It starts one language
//! server for a workspace and serves tools and prompts over MCP on stdio.

mod bridge;
mod config;
mod logging;

use clap::Parser;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "lspbridge")]
#[command(author, version, about = "MCP server exposing a language server to coding agents", long_about = None)]
pub struct Cli {
    /// Workspace root the language server indexes
    #[arg(short, long)]
    pub workspace: PathBuf,

    /// Language server command (e.g. gopls, rust-analyzer)
    #[arg(long)]
    pub lsp: Option<String>,

    /// Workspace config file (default: <workspace>/lspbridge.json)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Seconds to wait for any language server request
    #[arg(long)]
    pub request_timeout: Option<u64>,

    /// Lines of source shown around diagnostics and references
    #[arg(long)]
    pub context_lines: Option<u32>,

    /// Arguments passed to the language server
    #[arg(last = true)]
    pub lsp_args: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = config::Settings::load(&cli).await?;
    let log_file = logging::init_logging(
        settings.verbose,
        settings.log_level.as_deref(),
        settings.log_file.as_deref(),
    )?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        workspace = %settings.workspace.display(),
        lsp = %settings.lsp.command,
        log_file = ?log_file,
        "Starting lspbridge"
    );
    for path in &settings.config_paths {
        info!(path = %path.display(), "Loaded configuration");
    }

    bridge::run(settings).await
}
