//! LSP Manager - coordinates multiple language servers
//!
//! Routes files to the right server by extension, tracks opened documents
//! and owns the lifecycle of every client it started.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;

use super::client::{LspClient, LspError};
use super::document::{path_to_uri, DocumentTracker};
use crate::config::LspConfig;
use crate::enrich::SymbolQuery;
use crate::model::{CallHierarchyItem, Reference, SymbolReferences};

/// Availability of one configured server after startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerStatus {
    pub name: String,
    pub extensions: Vec<String>,
    pub available: bool,
    /// Name and version the server reported during initialize
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Which servers came up, returned by [`LspManager::initialize_all`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CapabilityReport {
    pub servers: Vec<ServerStatus>,
}

impl CapabilityReport {
    /// Names of servers that reached the ready state
    pub fn available(&self) -> Vec<&str> {
        self.servers
            .iter()
            .filter(|s| s.available)
            .map(|s| s.name.as_str())
            .collect()
    }
}

impl std::fmt::Display for CapabilityReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for status in &self.servers {
            let exts = status.extensions.join(", ");
            match (status.available, &status.reason) {
                (true, _) => match &status.server {
                    Some(server) => writeln!(f, "  {} ({}): available, {}", status.name, exts, server)?,
                    None => writeln!(f, "  {} ({}): available", status.name, exts)?,
                },
                (false, Some(reason)) => writeln!(f, "  {} ({}): unavailable, {}", status.name, exts, reason)?,
                (false, None) => writeln!(f, "  {} ({}): unavailable", status.name, exts)?,
            }
        }
        Ok(())
    }
}

/// Manages multiple LSP servers
pub struct LspManager {
    /// Workspace root, absolute
    root: PathBuf,
    /// Running clients by server name
    clients: BTreeMap<String, LspClient>,
    /// Lowercase extension -> server name
    routes: HashMap<String, String>,
    /// Documents opened this session
    documents: DocumentTracker,
}

impl LspManager {
    /// Create a pool with no servers
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.canonicalize().unwrap_or_else(|_| root.to_path_buf()),
            clients: BTreeMap::new(),
            routes: HashMap::new(),
            documents: DocumentTracker::new(),
        }
    }

    /// Start and initialize every configured server. Servers come up
    /// independently; one failing never affects the others.
    pub async fn initialize_all(config: &LspConfig, root: &Path) -> (Self, CapabilityReport) {
        let mut manager = Self::new(root);
        let mut report = CapabilityReport::default();

        if !config.enabled {
            report.servers = config
                .servers
                .iter()
                .map(|(name, cfg)| ServerStatus {
                    name: name.clone(),
                    extensions: cfg.extensions.clone(),
                    available: false,
                    server: None,
                    reason: Some("disabled".to_string()),
                })
                .collect();
            return (manager, report);
        }

        let root = manager.root.clone();
        let startups = config.resolved_servers().map(|(name, cfg)| {
            let root = root.clone();
            async move {
                let extensions = cfg.extensions.clone();
                let mut client = LspClient::new(name, cfg, &root);
                let outcome = if !client.start().await {
                    Err("could not be started".to_string())
                } else if !client.initialize().await {
                    client.shutdown().await;
                    Err("initialize failed".to_string())
                } else {
                    Ok(client)
                };
                (name.to_string(), extensions, outcome)
            }
        });

        for (name, extensions, outcome) in futures::future::join_all(startups).await {
            let (available, server, reason) = match outcome {
                Ok(client) => {
                    let caps = client.capabilities();
                    if !caps.references() || !caps.call_hierarchy() {
                        tracing::warn!(
                            "LSP {} capabilities: references={} callHierarchy={}",
                            name,
                            caps.references(),
                            caps.call_hierarchy()
                        );
                    }
                    let server = client.server_info().map(|info| match &info.version {
                        Some(version) => format!("{} {}", info.name, version),
                        None => info.name.clone(),
                    });
                    manager.add_client(&name, &extensions, client);
                    (true, server, None)
                }
                Err(reason) => {
                    tracing::warn!("LSP {} unavailable: {}", name, reason);
                    (false, None, Some(reason))
                }
            };
            report.servers.push(ServerStatus {
                name,
                extensions,
                available,
                server,
                reason,
            });
        }

        (manager, report)
    }

    /// Register a client under `name` for the given extensions. An extension
    /// already routed to another server keeps its first owner.
    pub fn add_client(&mut self, name: &str, extensions: &[String], client: LspClient) {
        for ext in extensions {
            let ext = ext.trim_start_matches('.').to_lowercase();
            if let Some(owner) = self.routes.get(&ext) {
                tracing::debug!("LSP {}: .{} already handled by {}", name, ext, owner);
                continue;
            }
            self.routes.insert(ext, name.to_string());
        }
        self.clients.insert(name.to_string(), client);
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Names of running servers
    pub fn running_servers(&self) -> Vec<&str> {
        self.clients.keys().map(|s| s.as_str()).collect()
    }

    /// Client responsible for a file, by extension
    pub fn client_for(&self, path: &Path) -> Option<&LspClient> {
        let ext = path.extension().and_then(|e| e.to_str())?.to_lowercase();
        let name = self.routes.get(&ext)?;
        self.clients.get(name)
    }

    pub fn has_client_for(&self, path: &Path) -> bool {
        self.client_for(path).is_some()
    }

    /// Open a document on its server. Each file is opened at most once.
    pub async fn open_file(&mut self, path: &Path, content: &str) -> bool {
        let uri = path_to_uri(&self.root, path);
        if self.documents.is_open(&uri) {
            return true;
        }

        let Some(client) = self.client_for(path) else {
            return false;
        };
        if !client.open_file(path, content).await {
            return false;
        }

        self.documents.mark_open(&uri, content);
        true
    }

    pub fn open_document_count(&self) -> usize {
        self.documents.open_count()
    }

    fn with_context(&self, mut references: Vec<Reference>) -> Vec<Reference> {
        for reference in &mut references {
            let uri = path_to_uri(&self.root, Path::new(&reference.file_path));
            reference.context = self.documents.line(&uri, reference.line);
        }
        references
    }

    /// References and both call directions for the symbol at a position.
    /// Files without a server get an empty result.
    pub async fn get_symbol_references(&self, path: &Path, line: u32, column: u32) -> SymbolReferences {
        let mut result = SymbolReferences::empty(path.display().to_string(), line);

        let Some(client) = self.client_for(path) else {
            return result;
        };

        result.references = self.with_context(client.find_references(path, line, column).await);
        result.incoming_calls = client.incoming_calls(path, line, column).await;
        result.outgoing_calls = client.outgoing_calls(path, line, column).await;
        result
    }

    /// Shut down every distinct client exactly once
    pub async fn shutdown_all(mut self) {
        let clients = std::mem::take(&mut self.clients);
        self.routes.clear();

        for (name, mut client) in clients {
            tracing::debug!("LSP {} shutting down ({})", name, client.state());
            client.shutdown().await;
        }
    }
}

#[async_trait]
impl SymbolQuery for LspManager {
    async fn references(&self, path: &Path, line: u32, column: u32) -> Result<Vec<Reference>, LspError> {
        match self.client_for(path) {
            Some(client) => Ok(self.with_context(client.try_find_references(path, line, column).await?)),
            None => Ok(Vec::new()),
        }
    }

    async fn incoming_calls(&self, path: &Path, line: u32, column: u32) -> Result<Vec<CallHierarchyItem>, LspError> {
        match self.client_for(path) {
            Some(client) => client.try_incoming_calls(path, line, column).await,
            None => Ok(Vec::new()),
        }
    }

    async fn outgoing_calls(&self, path: &Path, line: u32, column: u32) -> Result<Vec<CallHierarchyItem>, LspError> {
        match self.client_for(path) {
            Some(client) => client.try_outgoing_calls(path, line, column).await,
            None => Ok(Vec::new()),
        }
    }
}

impl Drop for LspManager {
    fn drop(&mut self) {
        if !self.clients.is_empty() {
            tracing::warn!(
                "LSP manager dropped without shutdown_all; killing {}",
                self.running_servers().join(", ")
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LspServerConfig;
    use crate::lsp::client::tests::{ready_pair, test_config, FakeServer};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    fn exts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_disabled_config_starts_nothing() {
        let config = LspConfig {
            enabled: false,
            ..Default::default()
        };
        let (manager, report) = LspManager::initialize_all(&config, Path::new("/ws")).await;

        assert!(manager.running_servers().is_empty());
        assert_eq!(report.servers.len(), 2);
        assert!(report.available().is_empty());
        assert_eq!(report.servers[0].reason.as_deref(), Some("disabled"));
        manager.shutdown_all().await;
    }

    #[test]
    fn test_capability_report_display() {
        let report = CapabilityReport {
            servers: vec![
                ServerStatus {
                    name: "clangd".into(),
                    extensions: exts(&["c", "h"]),
                    available: true,
                    server: Some("clangd 17.0.6".into()),
                    reason: None,
                },
                ServerStatus {
                    name: "typescript".into(),
                    extensions: exts(&["ts"]),
                    available: false,
                    server: None,
                    reason: Some("initialize failed".into()),
                },
            ],
        };

        assert_eq!(report.available(), vec!["clangd"]);
        assert_eq!(
            report.to_string(),
            "  clangd (c, h): available, clangd 17.0.6\n  typescript (ts): unavailable, initialize failed\n"
        );

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["servers"][0]["server"], "clangd 17.0.6");
        assert!(json["servers"][1].get("server").is_none());
    }

    #[tokio::test]
    async fn test_missing_servers_degrade_to_empty_results() {
        let dir = tempfile::tempdir().unwrap();
        let mut servers = BTreeMap::new();
        servers.insert(
            "ghost".to_string(),
            LspServerConfig {
                command: "codescope-missing-ls".into(),
                extensions: exts(&["c"]),
                ..Default::default()
            },
        );
        let config = LspConfig {
            servers,
            ..Default::default()
        };

        let (mut manager, report) = LspManager::initialize_all(&config, dir.path()).await;
        assert!(report.available().is_empty());
        assert_eq!(report.servers[0].reason.as_deref(), Some("could not be started"));
        assert!(report.to_string().contains("ghost (c): unavailable"));

        let path = Path::new("main.c");
        assert!(!manager.open_file(path, "int main() {}").await);
        let result = manager.get_symbol_references(path, 1, 4).await;
        assert_eq!(result, SymbolReferences::empty("main.c", 1));
        assert!(manager.references(path, 1, 4).await.unwrap().is_empty());

        manager.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_routes_aliases_to_one_client() {
        let (client, _server) = ready_pair(test_config()).await;
        let mut manager = LspManager::new(Path::new("/ws"));
        manager.add_client("clangd", &exts(&["c", "h", ".CPP"]), client);

        let a = manager.client_for(Path::new("src/a.c")).map(|c| c.name().to_string());
        let b = manager.client_for(Path::new("include/a.h")).map(|c| c.name().to_string());
        let c = manager.client_for(Path::new("x.cpp")).map(|c| c.name().to_string());
        assert_eq!(a.as_deref(), Some("fake"));
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert!(!manager.has_client_for(Path::new("view.ts")));
        assert!(!manager.has_client_for(Path::new("Makefile")));

        // No server for TypeScript: empty, and no traffic
        let result = manager.get_symbol_references(Path::new("view.ts"), 3, 0).await;
        assert!(result.references.is_empty());
    }

    #[tokio::test]
    async fn test_symbol_references_with_context() {
        let (client, mut server) = ready_pair(test_config()).await;
        let mut manager = LspManager::new(Path::new("/ws"));
        manager.add_client("clangd", &exts(&["c"]), client);

        let source = "int add(int a, int b);\n\nint main() { return add(1, 2); }\n";
        assert!(manager.open_file(Path::new("main.c"), source).await);
        // Second open is a no-op
        assert!(manager.open_file(Path::new("main.c"), source).await);
        assert_eq!(manager.open_document_count(), 1);

        let server_side = async {
            let open = server.recv().await;
            assert_eq!(open["method"], "textDocument/didOpen");

            let refs = server.recv().await;
            assert_eq!(refs["method"], "textDocument/references");
            let loc = |line: u32, ch: u32| {
                json!({
                    "uri": "file:///ws/main.c",
                    "range": { "start": { "line": line, "character": ch }, "end": { "line": line, "character": ch + 3 } }
                })
            };
            server.reply(&refs, json!([loc(0, 4), loc(2, 20)])).await;

            for _ in 0..2 {
                let prepare = server.recv().await;
                assert_eq!(prepare["method"], "textDocument/prepareCallHierarchy");
                server.reply(&prepare, Value::Null).await;
            }
        };
        let (result, _) = tokio::join!(manager.get_symbol_references(Path::new("main.c"), 1, 4), server_side);

        assert_eq!(result.definition_file, "main.c");
        assert_eq!(result.definition_line, 1);
        assert_eq!(result.references.len(), 2);
        assert_eq!(result.references[0].context.as_deref(), Some("int add(int a, int b);"));
        assert_eq!(result.references[1].line, 3);
        assert_eq!(
            result.references[1].context.as_deref(),
            Some("int main() { return add(1, 2); }")
        );
        assert!(result.incoming_calls.is_empty());
        assert!(result.outgoing_calls.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_all_reaches_each_client_once() {
        let (first, mut first_server) = ready_pair(test_config()).await;
        let (second, mut second_server) = ready_pair(test_config()).await;

        let mut manager = LspManager::new(Path::new("/ws"));
        manager.add_client("clangd", &exts(&["c", "h", "cpp"]), first);
        manager.add_client("typescript", &exts(&["ts", "tsx"]), second);
        assert_eq!(manager.running_servers(), vec!["clangd", "typescript"]);

        async fn serve_shutdown(server: &mut FakeServer) {
            let req = server.recv().await;
            assert_eq!(req["method"], "shutdown");
            server.reply(&req, Value::Null).await;
            assert_eq!(server.recv().await["method"], "exit");
            assert!(server.is_closed().await);
        }

        tokio::join!(
            manager.shutdown_all(),
            serve_shutdown(&mut first_server),
            serve_shutdown(&mut second_server)
        );
    }
}
