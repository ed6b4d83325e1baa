//! Configuration loading.
//!
//! Settings are merged from, lowest precedence first:
//! 1. Global config: `<config dir>/lspbridge/config.json`
//! 2. Workspace config: `<workspace>/lspbridge.json`, or the `--config` file
//! 3. Command-line flags
//!
//! String values in the file may reference environment variables as
//! `{env:VAR_NAME}`.

use crate::Cli;
use lspbridge_lsp::LspConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the per-workspace config file.
pub const CONFIG_FILE_NAME: &str = "lspbridge.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Workspace not found: {path}: {source}")]
    WorkspaceNotFound {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {message}")]
    InvalidJson { path: PathBuf, message: String },

    #[error("Environment variable not found: {name}")]
    EnvVarNotFound { name: String },

    #[error("No language server configured: pass --lsp or set lsp.command in lspbridge.json")]
    MissingLspCommand,

    #[error("Invalid substitution pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// The `lsp` section of the config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LspSection {
    pub command: Option<String>,
    pub args: Option<Vec<String>>,
    pub env: HashMap<String, String>,
    pub language_ids: HashMap<String, String>,
}

/// Contents of the config file. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FileConfig {
    pub lsp: LspSection,
    pub request_timeout_secs: Option<u64>,
    pub diagnostics_wait_ms: Option<u64>,
    pub context_lines: Option<u32>,
    pub log_level: Option<String>,
}

impl FileConfig {
    /// Path of the global config file.
    pub fn global_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("lspbridge").join("config.json"))
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(mut self, other: Self) -> Self {
        if other.lsp.command.is_some() {
            self.lsp.command = other.lsp.command;
        }
        if other.lsp.args.is_some() {
            self.lsp.args = other.lsp.args;
        }
        self.lsp.env.extend(other.lsp.env);
        self.lsp.language_ids.extend(other.lsp.language_ids);
        if other.request_timeout_secs.is_some() {
            self.request_timeout_secs = other.request_timeout_secs;
        }
        if other.diagnostics_wait_ms.is_some() {
            self.diagnostics_wait_ms = other.diagnostics_wait_ms;
        }
        if other.context_lines.is_some() {
            self.context_lines = other.context_lines;
        }
        if other.log_level.is_some() {
            self.log_level = other.log_level;
        }
        self
    }

    /// Load `path` if it exists.
    async fn load_optional(path: &Path) -> Result<Option<Self>, ConfigError> {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            Self::load_file(path).await.map(Some)
        } else {
            Ok(None)
        }
    }

    /// Load and parse a config file, substituting `{env:...}` references.
    pub async fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let content = substitute_variables(&content)?;
        serde_json::from_str(&content).map_err(|e| ConfigError::InvalidJson {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

/// Replace every `{env:VAR_NAME}` with the variable's value.
///
/// Substitution happens on the raw text, so values land inside JSON strings
/// as written.
fn substitute_variables(content: &str) -> Result<String, ConfigError> {
    let re = regex::Regex::new(r"\{env:([^}]+)\}")?;

    let mut result = String::with_capacity(content.len());
    let mut last = 0;
    for cap in re.captures_iter(content) {
        let (Some(full), Some(name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        let value = std::env::var(name.as_str()).map_err(|_| ConfigError::EnvVarNotFound {
            name: name.as_str().to_string(),
        })?;
        result.push_str(&content[last..full.start()]);
        result.push_str(&value);
        last = full.end();
    }
    result.push_str(&content[last..]);
    Ok(result)
}

/// Fully resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Canonical workspace root.
    pub workspace: PathBuf,
    pub lsp: LspConfig,
    pub context_lines: u32,
    pub verbose: bool,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
    /// Config files that were read, lowest precedence first.
    pub config_paths: Vec<PathBuf>,
}

impl Settings {
    /// Resolve the workspace, read the config file and apply CLI overrides.
    pub async fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let workspace = tokio::fs::canonicalize(&cli.workspace)
            .await
            .map_err(|source| ConfigError::WorkspaceNotFound {
                path: cli.workspace.clone(),
                source,
            })?;

        let mut file = FileConfig::default();
        let mut config_paths = Vec::new();

        if let Some(path) = FileConfig::global_path() {
            if let Some(global) = FileConfig::load_optional(&path).await? {
                file = file.merge(global);
                config_paths.push(path);
            }
        }

        // An explicit --config must exist; the workspace file is optional.
        match &cli.config {
            Some(path) => {
                file = file.merge(FileConfig::load_file(path).await?);
                config_paths.push(path.clone());
            }
            None => {
                let path = workspace.join(CONFIG_FILE_NAME);
                if let Some(local) = FileConfig::load_optional(&path).await? {
                    file = file.merge(local);
                    config_paths.push(path);
                }
            }
        }

        let mut settings = Self::resolve(cli, file, workspace)?;
        settings.config_paths = config_paths;
        Ok(settings)
    }

    /// Merge file values and CLI flags. CLI flags win.
    pub fn resolve(cli: &Cli, file: FileConfig, workspace: PathBuf) -> Result<Self, ConfigError> {
        let command = cli
            .lsp
            .clone()
            .or(file.lsp.command)
            .filter(|c| !c.trim().is_empty())
            .ok_or(ConfigError::MissingLspCommand)?;

        let program = Path::new(&command)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&command)
            .to_string();
        let mut lsp = LspConfig::preset(&program)
            .map(|mut preset| {
                preset.command = command.clone();
                preset
            })
            .unwrap_or_else(|| LspConfig::new(command.clone()));

        if !cli.lsp_args.is_empty() {
            lsp.args = cli.lsp_args.clone();
        } else if let Some(args) = file.lsp.args {
            lsp.args = args;
        }
        lsp.env.extend(file.lsp.env);
        lsp.language_ids.extend(file.lsp.language_ids);

        if let Some(secs) = cli.request_timeout.or(file.request_timeout_secs) {
            lsp.request_timeout_secs = secs;
        }
        if let Some(ms) = file.diagnostics_wait_ms {
            lsp.diagnostics_wait_ms = ms;
        }

        let context_lines = cli
            .context_lines
            .or(file.context_lines)
            .unwrap_or(lspbridge_tools::SessionSettings::default().context_lines);

        Ok(Self {
            workspace,
            lsp,
            context_lines,
            verbose: cli.verbose,
            log_level: file.log_level,
            log_file: cli.log_file.clone(),
            config_paths: Vec::new(),
        })
    }
}
