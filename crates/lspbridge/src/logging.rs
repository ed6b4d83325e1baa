//! Logging initialization.
//!
//! stdout carries the MCP stream, so logs never go there. They are written
//! to stderr without colors, or appended to a file when one is given.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const CRATES: [&str; 4] = ["lspbridge", "lspbridge_lsp", "lspbridge_tools", "lspbridge_mcp"];

/// The filter used when `RUST_LOG` is not set.
pub fn default_filter(verbose: bool, level: Option<&str>) -> String {
    let level = if verbose { "debug" } else { level.unwrap_or("info") };
    CRATES
        .iter()
        .map(|krate| format!("{krate}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Initialize logging. Returns the log file path if logging to a file.
pub fn init_logging(
    verbose: bool,
    level: Option<&str>,
    log_file: Option<&Path>,
) -> anyhow::Result<Option<PathBuf>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose, level)));

    let Some(path) = log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Could not initialize logging: {e}"))?;
        return Ok(None);
    };

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init()
        .map_err(|e| anyhow::anyhow!("Could not initialize logging: {e}"))?;

    Ok(Some(path.to_path_buf()))
}
