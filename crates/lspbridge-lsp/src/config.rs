//! LSP server configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Configuration for the language server backing a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LspConfig {
    /// Command to run the server.
    pub command: String,

    /// Arguments for the command.
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment variables.
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Extension to languageId overrides (e.g., {"h": "cpp"}).
    #[serde(default)]
    pub language_ids: HashMap<String, String>,

    /// Seconds to wait for any single request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Seconds to wait for the initialize handshake.
    #[serde(default = "default_initialize_timeout_secs")]
    pub initialize_timeout_secs: u64,

    /// Milliseconds to wait for published diagnostics after a document sync.
    #[serde(default = "default_diagnostics_wait_ms")]
    pub diagnostics_wait_ms: u64,
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_initialize_timeout_secs() -> u64 {
    60
}

fn default_diagnostics_wait_ms() -> u64 {
    3000
}

impl LspConfig {
    /// Create a new LSP configuration.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            language_ids: HashMap::new(),
            request_timeout_secs: default_request_timeout_secs(),
            initialize_timeout_secs: default_initialize_timeout_secs(),
            diagnostics_wait_ms: default_diagnostics_wait_ms(),
        }
    }

    /// Add command arguments.
    pub fn with_args(mut self, args: Vec<impl Into<String>>) -> Self {
        self.args = args.into_iter().map(|a| a.into()).collect();
        self
    }

    /// Add an environment variable for the server process.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Override the languageId sent for an extension.
    pub fn with_language_id(mut self, ext: impl Into<String>, id: impl Into<String>) -> Self {
        self.language_ids.insert(ext.into(), id.into());
        self
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Set how long to wait for published diagnostics.
    pub fn with_diagnostics_wait(mut self, wait: Duration) -> Self {
        self.diagnostics_wait_ms = wait.as_millis() as u64;
        self
    }

    /// Create configuration for Rust (rust-analyzer).
    pub fn rust() -> Self {
        Self::new("rust-analyzer")
    }

    /// Create configuration for TypeScript.
    pub fn typescript() -> Self {
        Self::new("typescript-language-server").with_args(vec!["--stdio"])
    }

    /// Create configuration for Python (pyright).
    pub fn python() -> Self {
        Self::new("pyright-langserver").with_args(vec!["--stdio"])
    }

    /// Create configuration for Go (gopls).
    pub fn go() -> Self {
        Self::new("gopls")
    }

    /// Create configuration for C/C++ (clangd).
    pub fn cpp() -> Self {
        Self::new("clangd").with_language_id("h", "cpp")
    }

    /// Look up a preset by server command name.
    pub fn preset(command: &str) -> Option<Self> {
        match command {
            "rust-analyzer" => Some(Self::rust()),
            "typescript-language-server" => Some(Self::typescript()),
            "pyright-langserver" => Some(Self::python()),
            "gopls" => Some(Self::go()),
            "clangd" => Some(Self::cpp()),
            _ => None,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn initialize_timeout(&self) -> Duration {
        Duration::from_secs(self.initialize_timeout_secs)
    }

    pub fn diagnostics_wait(&self) -> Duration {
        Duration::from_millis(self.diagnostics_wait_ms)
    }

    /// Resolve the languageId for a file extension.
    pub fn language_id(&self, ext: &str) -> String {
        self.language_ids
            .get(ext)
            .cloned()
            .unwrap_or_else(|| ext_to_language_id(ext).to_string())
    }
}

/// Map a file extension to its LSP languageId.
pub fn ext_to_language_id(ext: &str) -> &'static str {
    match ext {
        "rs" => "rust",
        "ts" => "typescript",
        "tsx" => "typescriptreact",
        "js" => "javascript",
        "jsx" => "javascriptreact",
        "py" => "python",
        "go" => "go",
        "java" => "java",
        "c" | "h" => "c",
        "cpp" | "hpp" | "cc" | "cxx" => "cpp",
        "cs" => "csharp",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "kt" | "kts" => "kotlin",
        "scala" => "scala",
        "lua" => "lua",
        "sh" | "bash" => "shellscript",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        "md" => "markdown",
        "html" => "html",
        "css" => "css",
        "scss" => "scss",
        "sql" => "sql",
        _ => "plaintext",
    }
}
