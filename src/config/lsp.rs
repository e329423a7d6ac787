//! Language server configuration
//!
//! Lives under the `[lsp]` table of config.toml. Each server entry names
//! the binary to launch and the file extensions it answers for.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Configuration for a single language server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LspServerConfig {
    /// Path to the server binary (can use $PATH)
    pub command: String,

    /// Arguments to pass to the server
    pub args: Vec<String>,

    /// File extensions this server handles, without the dot
    pub extensions: Vec<String>,

    /// Launcher tried when `command` is not installed: program followed by its arguments
    pub fallback: Vec<String>,

    /// Budget for the `initialize` handshake
    pub init_timeout_secs: u64,

    /// Budget for each query
    pub timeout_secs: u64,

    /// How long after a didOpen the server gets before it is queried
    pub open_settle_ms: u64,

    /// Wait between `shutdown` and `exit`, and before the process is killed
    pub shutdown_grace_ms: u64,

    /// Environment variables to set
    pub env: HashMap<String, String>,

    /// Initialization options passed to server
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init_options: Option<serde_json::Value>,
}

impl Default for LspServerConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            args: Vec::new(),
            extensions: Vec::new(),
            fallback: Vec::new(),
            init_timeout_secs: 10,
            timeout_secs: 30,
            open_settle_ms: 500,
            shutdown_grace_ms: 500,
            env: HashMap::new(),
            init_options: None,
        }
    }
}

impl LspServerConfig {
    pub fn init_timeout(&self) -> Duration {
        Duration::from_secs(self.init_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn open_settle(&self) -> Duration {
        Duration::from_millis(self.open_settle_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Split `fallback` into program and arguments
    pub fn fallback_command(&self) -> Option<(&str, &[String])> {
        self.fallback.split_first().map(|(cmd, args)| (cmd.as_str(), args))
    }
}

/// Main LSP configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LspConfig {
    /// Whether enrichment through language servers is enabled at all
    pub enabled: bool,

    /// Default timeout for requests (seconds), applied to servers that leave theirs at zero
    pub default_timeout_secs: u64,

    /// Per-language server configurations, keyed by server name
    pub servers: BTreeMap<String, LspServerConfig>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for LspConfig {
    fn default() -> Self {
        let mut servers = BTreeMap::new();

        // C and C++ share one clangd; headers alias the same process
        servers.insert(
            "clangd".to_string(),
            LspServerConfig {
                command: "clangd".to_string(),
                args: strings(&["--background-index", "--clang-tidy=false"]),
                extensions: strings(&["c", "h", "cpp", "hpp", "cc", "cxx", "hxx"]),
                init_timeout_secs: 10,
                ..Default::default()
            },
        );

        servers.insert(
            "typescript".to_string(),
            LspServerConfig {
                command: "typescript-language-server".to_string(),
                args: strings(&["--stdio"]),
                extensions: strings(&["ts", "tsx"]),
                fallback: strings(&["npx", "--yes", "typescript-language-server", "--stdio"]),
                init_timeout_secs: 15,
                init_options: Some(serde_json::json!({})),
                ..Default::default()
            },
        );

        Self {
            enabled: true,
            default_timeout_secs: 30,
            servers,
        }
    }
}

impl LspConfig {
    /// Server entries with the global default timeout filled in
    pub fn resolved_servers(&self) -> impl Iterator<Item = (&str, LspServerConfig)> + '_ {
        self.servers.iter().map(|(name, cfg)| {
            let mut cfg = cfg.clone();
            if cfg.timeout_secs == 0 {
                cfg.timeout_secs = self.default_timeout_secs;
            }
            (name.as_str(), cfg)
        })
    }
}
