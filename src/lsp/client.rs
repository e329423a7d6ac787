//! LSP client for a single language server
//!
//! Handles spawning, the initialize handshake, queries and shutdown of one
//! server. Queries are total: every failure path yields an empty result and
//! a log line.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde_json::json;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::{timeout, Instant};

use super::document::{language_id, path_to_uri, uri_to_relative};
use super::transport::Transport;
use super::types::{
    CallHierarchyIncomingCall, CallHierarchyItem, CallHierarchyOutgoingCall, InitializeResult, Location, Position,
    ServerCapabilities, ServerInfo,
};
use crate::config::LspServerConfig;
use crate::model;

/// Upper bound on waiting for the reply to `shutdown`
const SHUTDOWN_REPLY_WAIT: Duration = Duration::from_secs(2);

/// LSP client errors
#[derive(Error, Debug)]
pub enum LspError {
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i32, message: String },

    #[error("server connection closed")]
    ChannelClosed,

    #[error("server not ready")]
    NotReady,

    #[error("parse error: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for LspError {
    fn from(e: serde_json::Error) -> Self {
        LspError::Parse(e.to_string())
    }
}

/// Lifecycle of one client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    NotStarted,
    Starting,
    Initializing,
    Ready,
    ShuttingDown,
    Stopped,
}

impl std::fmt::Display for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ClientState::NotStarted => "not started",
            ClientState::Starting => "starting",
            ClientState::Initializing => "initializing",
            ClientState::Ready => "ready",
            ClientState::ShuttingDown => "shutting down",
            ClientState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// LSP client for a single language server
pub struct LspClient {
    /// Server name (for logging)
    name: String,
    config: LspServerConfig,
    /// Workspace root, absolute
    root: PathBuf,
    state: ClientState,
    transport: Option<Transport>,
    /// Server process handle; `None` for clients attached with [`LspClient::connect`]
    process: Option<Child>,
    capabilities: ServerCapabilities,
    server_info: Option<ServerInfo>,
    /// Queries wait until this instant after a didOpen
    settle_until: Mutex<Option<Instant>>,
}

impl LspClient {
    /// Create a client that has not spawned its server yet
    pub fn new(name: &str, config: LspServerConfig, root: &Path) -> Self {
        Self {
            name: name.to_string(),
            config,
            root: root.canonicalize().unwrap_or_else(|_| root.to_path_buf()),
            state: ClientState::NotStarted,
            transport: None,
            process: None,
            capabilities: ServerCapabilities::default(),
            server_info: None,
            settle_until: Mutex::new(None),
        }
    }

    /// Attach to a server that is already running on the given streams.
    ///
    /// The client starts out `Initializing`; call [`LspClient::initialize`] next.
    pub fn connect<R, W>(name: &str, config: LspServerConfig, root: &Path, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut client = Self::new(name, config, root);
        client.transport = Some(Transport::spawn(name, reader, writer));
        client.state = ClientState::Initializing;
        client
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ClientState::Ready
    }

    pub fn capabilities(&self) -> &ServerCapabilities {
        &self.capabilities
    }

    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    // ========== Lifecycle ==========

    /// Spawn the server binary, falling back to the configured launcher when
    /// the binary is not installed. Returns false if nothing could be spawned.
    pub async fn start(&mut self) -> bool {
        if self.state != ClientState::NotStarted {
            return self.transport.is_some();
        }
        self.state = ClientState::Starting;

        let spawned = match self.spawn_process(&self.config.command, &self.config.args) {
            Err(LspError::Spawn { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                match self.config.fallback_command() {
                    Some((cmd, args)) => {
                        tracing::info!(
                            "LSP {}: {} not found, trying {} {:?}",
                            self.name,
                            self.config.command,
                            cmd,
                            args
                        );
                        self.spawn_process(cmd, args)
                    }
                    None => Err(LspError::Spawn {
                        command: self.config.command.clone(),
                        source,
                    }),
                }
            }
            other => other,
        };

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!("LSP {} unavailable: {}", self.name, e);
                self.state = ClientState::NotStarted;
                return false;
            }
        };

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            tracing::warn!("LSP {} unavailable: missing stdio pipes", self.name);
            let _ = child.start_kill();
            self.state = ClientState::NotStarted;
            return false;
        };

        if let Some(stderr) = child.stderr.take() {
            let name = self.name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::trace!("LSP {} stderr: {}", name, line);
                }
            });
        }

        self.transport = Some(Transport::spawn(&self.name, stdout, stdin));
        self.process = Some(child);
        self.state = ClientState::Initializing;
        true
    }

    fn spawn_process(&self, command: &str, args: &[String]) -> Result<Child, LspError> {
        tracing::info!("Spawning LSP server '{}': {} {:?}", self.name, command, args);

        let mut cmd = Command::new(command);
        cmd.args(args)
            .current_dir(&self.root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in &self.config.env {
            cmd.env(key, value);
        }

        cmd.spawn().map_err(|source| LspError::Spawn {
            command: command.to_string(),
            source,
        })
    }

    /// Run the initialize handshake. On failure the client stays
    /// uninitialized and every query returns empty.
    pub async fn initialize(&mut self) -> bool {
        if self.state != ClientState::Initializing {
            return self.is_ready();
        }
        let Some(transport) = self.transport.as_ref() else {
            return false;
        };

        let root_uri = path_to_uri(&self.root, &self.root);
        let folder_name = self
            .root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.root.display().to_string());

        let mut params = json!({
            "processId": std::process::id(),
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION")
            },
            "rootUri": root_uri,
            "workspaceFolders": [{ "uri": root_uri, "name": folder_name }],
            "capabilities": {
                "textDocument": {
                    "synchronization": { "dynamicRegistration": false, "didSave": false },
                    "references": { "dynamicRegistration": false },
                    "definition": { "dynamicRegistration": false, "linkSupport": true },
                    "callHierarchy": { "dynamicRegistration": false }
                },
                "workspace": { "workspaceFolders": true }
            }
        });
        if let Some(options) = &self.config.init_options {
            params["initializationOptions"] = options.clone();
        }

        tracing::debug!("LSP {} sending initialize", self.name);

        let outcome = transport
            .request("initialize", Some(params), self.config.init_timeout())
            .await
            .and_then(|value| Ok(serde_json::from_value::<InitializeResult>(value)?))
            .and_then(|result| {
                transport.notify("initialized", Some(json!({})))?;
                Ok(result)
            });

        match outcome {
            Ok(result) => {
                if let Some(info) = &result.server_info {
                    tracing::info!(
                        "LSP {} initialized: {} {}",
                        self.name,
                        info.name,
                        info.version.as_deref().unwrap_or("")
                    );
                }
                self.capabilities = result.capabilities;
                self.server_info = result.server_info;
                self.state = ClientState::Ready;
                true
            }
            Err(e) => {
                tracing::warn!("LSP {} initialize failed: {}", self.name, e);
                false
            }
        }
    }

    /// Shut the server down: `shutdown`, `exit`, then terminate the process.
    /// Runs from any state, including a client that never became ready.
    pub async fn shutdown(&mut self) {
        if matches!(self.state, ClientState::Stopped | ClientState::NotStarted) && self.process.is_none() {
            self.state = ClientState::Stopped;
            return;
        }

        tracing::info!("Shutting down LSP server: {}", self.name);
        self.state = ClientState::ShuttingDown;
        let grace = self.config.shutdown_grace();

        if let Some(transport) = self.transport.take() {
            if transport.is_alive() {
                if let Err(e) = transport
                    .request("shutdown", None, grace.max(SHUTDOWN_REPLY_WAIT))
                    .await
                {
                    tracing::debug!("LSP {} shutdown request: {}", self.name, e);
                }
                let _ = transport.notify("exit", None);
            }
            transport.close().await;
        }

        if let Some(mut process) = self.process.take() {
            match timeout(grace, process.wait()).await {
                Ok(Ok(status)) => tracing::debug!("LSP {} exited: {}", self.name, status),
                _ => {
                    if let Err(e) = process.kill().await {
                        tracing::debug!("LSP {} kill: {}", self.name, e);
                    }
                }
            }
        }

        self.state = ClientState::Stopped;
    }

    // ========== Documents ==========

    /// Send didOpen. The next query waits out the settle period so the
    /// server has a chance to index the file.
    pub async fn open_file(&self, path: &Path, content: &str) -> bool {
        if !self.is_ready() {
            return false;
        }
        let Some(transport) = self.transport.as_ref() else {
            return false;
        };

        let params = json!({
            "textDocument": {
                "uri": path_to_uri(&self.root, path),
                "languageId": language_id(path),
                "version": 1,
                "text": content
            }
        });

        if let Err(e) = transport.notify("textDocument/didOpen", Some(params)) {
            tracing::debug!("LSP {} didOpen {}: {}", self.name, path.display(), e);
            return false;
        }

        *self.settle_until.lock().await = Some(Instant::now() + self.config.open_settle());
        true
    }

    // ========== Queries ==========

    async fn query(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value, LspError> {
        if !self.is_ready() {
            return Err(LspError::NotReady);
        }
        let transport = self.transport.as_ref().ok_or(LspError::NotReady)?;

        let settle = *self.settle_until.lock().await;
        if let Some(deadline) = settle {
            tokio::time::sleep_until(deadline).await;
        }

        transport.request(method, Some(params), self.config.request_timeout()).await
    }

    fn position_params(&self, path: &Path, line: u32, column: u32) -> serde_json::Value {
        json!({
            "textDocument": { "uri": path_to_uri(&self.root, path) },
            "position": Position::from_model(line, column)
        })
    }

    fn log_failure(&self, what: &str, err: &LspError) {
        match err {
            LspError::NotReady => tracing::trace!("LSP {} {}: not ready", self.name, what),
            LspError::Timeout(_) => tracing::warn!("LSP {} {}: {}", self.name, what, err),
            _ => tracing::debug!("LSP {} {}: {}", self.name, what, err),
        }
    }

    /// textDocument/references at a 1-based line and 0-based column
    pub async fn try_find_references(
        &self,
        path: &Path,
        line: u32,
        column: u32,
    ) -> Result<Vec<model::Reference>, LspError> {
        let mut params = self.position_params(path, line, column);
        params["context"] = json!({ "includeDeclaration": true });

        let result = self.query("textDocument/references", params).await?;
        if result.is_null() {
            return Ok(Vec::new());
        }

        let locations: Vec<Location> = serde_json::from_value(result)?;
        Ok(locations
            .into_iter()
            .map(|loc| model::Reference {
                file_path: uri_to_relative(&self.root, &loc.uri),
                line: loc.range.start.model_line(),
                column: loc.range.start.character,
                context: None,
            })
            .collect())
    }

    pub async fn find_references(&self, path: &Path, line: u32, column: u32) -> Vec<model::Reference> {
        self.try_find_references(path, line, column)
            .await
            .unwrap_or_else(|e| {
                self.log_failure("references", &e);
                Vec::new()
            })
    }

    /// First call hierarchy anchor at a position, if the server resolves one
    async fn prepare_call_hierarchy(
        &self,
        path: &Path,
        line: u32,
        column: u32,
    ) -> Result<Option<CallHierarchyItem>, LspError> {
        let params = self.position_params(path, line, column);
        let result = self.query("textDocument/prepareCallHierarchy", params).await?;
        if result.is_null() {
            return Ok(None);
        }
        let items: Vec<CallHierarchyItem> = serde_json::from_value(result)?;
        Ok(items.into_iter().next())
    }

    fn to_model_item(&self, item: CallHierarchyItem) -> model::CallHierarchyItem {
        model::CallHierarchyItem {
            file_path: uri_to_relative(&self.root, &item.uri),
            line: item.range.start.model_line(),
            column: item.range.start.character,
            kind: item.kind,
            name: item.name,
        }
    }

    pub async fn try_incoming_calls(
        &self,
        path: &Path,
        line: u32,
        column: u32,
    ) -> Result<Vec<model::CallHierarchyItem>, LspError> {
        let Some(anchor) = self.prepare_call_hierarchy(path, line, column).await? else {
            return Ok(Vec::new());
        };

        let result = self
            .query("callHierarchy/incomingCalls", json!({ "item": anchor }))
            .await?;
        if result.is_null() {
            return Ok(Vec::new());
        }

        let calls: Vec<CallHierarchyIncomingCall> = serde_json::from_value(result)?;
        Ok(calls.into_iter().map(|c| self.to_model_item(c.from)).collect())
    }

    pub async fn incoming_calls(&self, path: &Path, line: u32, column: u32) -> Vec<model::CallHierarchyItem> {
        self.try_incoming_calls(path, line, column)
            .await
            .unwrap_or_else(|e| {
                self.log_failure("incoming calls", &e);
                Vec::new()
            })
    }

    pub async fn try_outgoing_calls(
        &self,
        path: &Path,
        line: u32,
        column: u32,
    ) -> Result<Vec<model::CallHierarchyItem>, LspError> {
        let Some(anchor) = self.prepare_call_hierarchy(path, line, column).await? else {
            return Ok(Vec::new());
        };

        let result = self
            .query("callHierarchy/outgoingCalls", json!({ "item": anchor }))
            .await?;
        if result.is_null() {
            return Ok(Vec::new());
        }

        let calls: Vec<CallHierarchyOutgoingCall> = serde_json::from_value(result)?;
        Ok(calls.into_iter().map(|c| self.to_model_item(c.to)).collect())
    }

    pub async fn outgoing_calls(&self, path: &Path, line: u32, column: u32) -> Vec<model::CallHierarchyItem> {
        self.try_outgoing_calls(path, line, column)
            .await
            .unwrap_or_else(|e| {
                self.log_failure("outgoing calls", &e);
                Vec::new()
            })
    }
}

impl Drop for LspClient {
    fn drop(&mut self) {
        // Best-effort cleanup - can't do async in Drop
        if let Some(mut process) = self.process.take() {
            let _ = process.start_kill();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::lsp::protocol::{frame, FrameReader};
    use crate::lsp::SymbolKind;
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use tokio::io::{AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

    /// Scripted server end of a duplex pipe
    pub(crate) struct FakeServer {
        frames: FrameReader<BufReader<ReadHalf<DuplexStream>>>,
        out: WriteHalf<DuplexStream>,
    }

    impl FakeServer {
        pub(crate) async fn recv(&mut self) -> Value {
            self.frames.read_one().await.expect("client frame")
        }

        pub(crate) async fn send(&mut self, message: Value) {
            let body = serde_json::to_vec(&message).unwrap();
            self.out.write_all(&frame(&body)).await.unwrap();
            self.out.flush().await.unwrap();
        }

        pub(crate) async fn reply(&mut self, request: &Value, result: Value) {
            self.send(json!({ "jsonrpc": "2.0", "id": request["id"], "result": result }))
                .await;
        }

        /// Answer the initialize handshake
        pub(crate) async fn handshake(&mut self) -> Value {
            let init = self.recv().await;
            assert_eq!(init["method"], "initialize");
            self.reply(
                &init,
                json!({
                    "capabilities": { "referencesProvider": true, "callHierarchyProvider": true },
                    "serverInfo": { "name": "fake", "version": "0.1" }
                }),
            )
            .await;
            let note = self.recv().await;
            assert_eq!(note["method"], "initialized");
            init
        }

        pub(crate) async fn is_closed(&mut self) -> bool {
            self.frames.read_one().await.is_none() && self.frames.is_closed()
        }
    }

    pub(crate) fn test_config() -> LspServerConfig {
        LspServerConfig {
            command: "fake-ls".into(),
            extensions: vec!["c".into(), "h".into()],
            init_timeout_secs: 5,
            timeout_secs: 5,
            open_settle_ms: 0,
            shutdown_grace_ms: 50,
            ..Default::default()
        }
    }

    pub(crate) fn pair(config: LspServerConfig) -> (LspClient, FakeServer) {
        pair_at(config, Path::new("/ws"))
    }

    pub(crate) fn pair_at(config: LspServerConfig, root: &Path) -> (LspClient, FakeServer) {
        let (client_end, server_end) = tokio::io::duplex(64 * 1024);
        let (client_read, client_write) = tokio::io::split(client_end);
        let (server_read, server_write) = tokio::io::split(server_end);
        let client = LspClient::connect("fake", config, root, client_read, client_write);
        let server = FakeServer {
            frames: FrameReader::new(BufReader::new(server_read)),
            out: server_write,
        };
        (client, server)
    }

    pub(crate) async fn ready_pair(config: LspServerConfig) -> (LspClient, FakeServer) {
        ready_pair_at(config, Path::new("/ws")).await
    }

    pub(crate) async fn ready_pair_at(config: LspServerConfig, root: &Path) -> (LspClient, FakeServer) {
        let (mut client, mut server) = pair_at(config, root);
        let (ok, _) = tokio::join!(client.initialize(), server.handshake());
        assert!(ok);
        (client, server)
    }

    fn location(uri: &str, line: u32, character: u32) -> Value {
        json!({
            "uri": uri,
            "range": {
                "start": { "line": line, "character": character },
                "end": { "line": line, "character": character + 3 }
            }
        })
    }

    fn item(name: &str, uri: &str, line: u32, kind: u8) -> Value {
        json!({
            "name": name,
            "kind": kind,
            "uri": uri,
            "range": { "start": { "line": line, "character": 0 }, "end": { "line": line + 2, "character": 1 } },
            "selectionRange": { "start": { "line": line, "character": 4 }, "end": { "line": line, "character": 7 } },
            "data": { "id": name }
        })
    }

    #[test]
    fn test_lsp_error_display() {
        let err = LspError::Timeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "request timed out after 30s");

        let err = LspError::Rpc {
            code: -32600,
            message: "Invalid Request".into(),
        };
        assert!(err.to_string().contains("-32600"));
        assert!(err.to_string().contains("Invalid Request"));
    }

    #[tokio::test]
    async fn test_initialize_handshake() {
        let (mut client, mut server) = pair(test_config());
        assert_eq!(client.state(), ClientState::Initializing);

        let (ok, init) = tokio::join!(client.initialize(), server.handshake());
        assert!(ok);
        assert_eq!(client.state(), ClientState::Ready);
        assert!(client.capabilities().references());
        assert!(client.capabilities().call_hierarchy());
        assert_eq!(client.server_info().map(|i| i.name.as_str()), Some("fake"));

        let params = &init["params"];
        assert_eq!(params["processId"], std::process::id());
        assert_eq!(params["rootUri"], "file:///ws");
        assert_eq!(params["workspaceFolders"][0]["name"], "ws");
        assert!(params["capabilities"]["textDocument"]["callHierarchy"].is_object());
        assert!(params["capabilities"]["textDocument"]["references"].is_object());
        assert!(params.get("initializationOptions").is_none());
    }

    #[tokio::test]
    async fn test_initialize_forwards_init_options() {
        let config = LspServerConfig {
            init_options: Some(json!({ "preferences": { "includeCompletionsForModuleExports": false } })),
            ..test_config()
        };
        let (mut client, mut server) = pair(config);

        let (ok, init) = tokio::join!(client.initialize(), server.handshake());
        assert!(ok);
        assert_eq!(
            init["params"]["initializationOptions"]["preferences"]["includeCompletionsForModuleExports"],
            false
        );
    }

    #[tokio::test]
    async fn test_malformed_initialize_leaves_client_unready() {
        let (mut client, mut server) = pair(test_config());

        let server_side = async {
            let init = server.recv().await;
            server.reply(&init, Value::Null).await;
        };
        let (ok, _) = tokio::join!(client.initialize(), server_side);
        assert!(!ok);
        assert_eq!(client.state(), ClientState::Initializing);
        assert!(client.find_references(Path::new("a.c"), 1, 0).await.is_empty());
    }

    #[tokio::test]
    async fn test_queries_before_ready_are_empty() {
        let (client, _server) = pair(test_config());
        assert!(client.find_references(Path::new("a.c"), 1, 0).await.is_empty());
        assert!(client.incoming_calls(Path::new("a.c"), 1, 0).await.is_empty());
        assert!(client.outgoing_calls(Path::new("a.c"), 1, 0).await.is_empty());
        assert!(!client.open_file(Path::new("a.c"), "int x;").await);
        assert!(matches!(
            client.try_find_references(Path::new("a.c"), 1, 0).await,
            Err(LspError::NotReady)
        ));
    }

    #[tokio::test]
    async fn test_references_empty_result() {
        let (client, mut server) = ready_pair(test_config()).await;

        let server_side = async {
            let req = server.recv().await;
            assert_eq!(req["method"], "textDocument/references");
            assert_eq!(req["params"]["context"]["includeDeclaration"], true);
            server.reply(&req, json!([])).await;
        };
        let (refs, _) = tokio::join!(client.try_find_references(Path::new("src/math.c"), 3, 4), server_side);
        assert!(refs.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sequential_queries_match_ids() {
        let (client, mut server) = ready_pair(test_config()).await;
        let path = Path::new("src/math.c");

        let first = async {
            let req = server.recv().await;
            assert_eq!(req["params"]["position"], json!({ "line": 2, "character": 4 }));
            assert_eq!(req["params"]["textDocument"]["uri"], "file:///ws/src/math.c");
            server
                .reply(&req, json!([location("file:///ws/src/main.c", 9, 11)]))
                .await;
            req["id"].as_i64().unwrap()
        };
        let (refs, first_id) = tokio::join!(client.find_references(path, 3, 4), first);
        assert_eq!(
            refs,
            vec![model::Reference {
                file_path: "src/main.c".into(),
                line: 10,
                column: 11,
                context: None,
            }]
        );

        let second = async {
            let req = server.recv().await;
            server
                .reply(&req, json!([location("file:///elsewhere/lib.h", 0, 2)]))
                .await;
            req["id"].as_i64().unwrap()
        };
        let (refs, second_id) = tokio::join!(client.find_references(path, 7, 0), second);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].file_path, "/elsewhere/lib.h");
        assert_eq!(refs[0].line, 1);
        assert_ne!(first_id, second_id);
    }

    #[tokio::test]
    async fn test_concurrent_queries_out_of_order() {
        let (client, mut server) = ready_pair(test_config()).await;

        let server_side = async {
            let a = server.recv().await;
            let b = server.recv().await;
            // Answer in reverse order, echoing each request's line back
            for req in [&b, &a] {
                let line = req["params"]["position"]["line"].as_u64().unwrap() as u32;
                server.reply(req, json!([location("file:///ws/x.c", line, 0)])).await;
            }
        };
        let (first, second, _) = tokio::join!(
            client.find_references(Path::new("x.c"), 5, 0),
            client.find_references(Path::new("x.c"), 20, 0),
            server_side
        );
        assert_eq!(first[0].line, 5);
        assert_eq!(second[0].line, 20);
    }

    #[tokio::test]
    async fn test_rpc_error_and_timeout_yield_empty() {
        let mut config = test_config();
        config.timeout_secs = 1;
        let (client, mut server) = ready_pair(config).await;

        let server_side = async {
            let req = server.recv().await;
            server
                .send(json!({ "jsonrpc": "2.0", "id": req["id"], "error": { "code": -32601, "message": "nope" } }))
                .await;
        };
        let (result, _) = tokio::join!(client.try_find_references(Path::new("a.c"), 1, 0), server_side);
        assert!(matches!(result, Err(LspError::Rpc { code: -32601, .. })));

        // Never answered
        let server_side = async { server.recv().await };
        let (result, late) = tokio::join!(client.try_find_references(Path::new("a.c"), 1, 0), server_side);
        assert!(matches!(result, Err(LspError::Timeout(_))));

        // A late answer is dropped and does not disturb the next query
        server.reply(&late, json!([location("file:///ws/late.c", 0, 0)])).await;
        let server_side = async {
            let req = server.recv().await;
            server.reply(&req, json!([])).await;
        };
        let (refs, _) = tokio::join!(client.find_references(Path::new("a.c"), 1, 0), server_side);
        assert!(refs.is_empty());
    }

    #[tokio::test]
    async fn test_server_exit_releases_waiters() {
        let (client, mut server) = ready_pair(test_config()).await;

        let server_side = async move {
            let _ = server.recv().await;
            drop(server);
        };
        let (result, _) = tokio::join!(client.try_find_references(Path::new("a.c"), 1, 0), server_side);
        assert!(matches!(result, Err(LspError::ChannelClosed)));

        // Later queries fail fast
        assert!(client.find_references(Path::new("a.c"), 1, 0).await.is_empty());
    }

    #[tokio::test]
    async fn test_call_hierarchy_two_step() {
        let (client, mut server) = ready_pair(test_config()).await;

        let server_side = async {
            let prepare = server.recv().await;
            assert_eq!(prepare["method"], "textDocument/prepareCallHierarchy");
            server
                .reply(&prepare, json!([item("add", "file:///ws/math.c", 2, 12)]))
                .await;

            let follow = server.recv().await;
            assert_eq!(follow["method"], "callHierarchy/incomingCalls");
            assert_eq!(follow["params"]["item"]["data"]["id"], "add");
            server
                .reply(
                    &follow,
                    json!([{ "from": item("main", "file:///ws/main.c", 9, 12), "fromRanges": [] }]),
                )
                .await;
        };
        let (calls, _) = tokio::join!(client.incoming_calls(Path::new("math.c"), 3, 4), server_side);
        assert_eq!(
            calls,
            vec![model::CallHierarchyItem {
                name: "main".into(),
                kind: SymbolKind::Function,
                file_path: "main.c".into(),
                line: 10,
                column: 0,
            }]
        );

        let server_side = async {
            let prepare = server.recv().await;
            server
                .reply(&prepare, json!([item("main", "file:///ws/main.c", 9, 12)]))
                .await;
            let follow = server.recv().await;
            assert_eq!(follow["method"], "callHierarchy/outgoingCalls");
            server
                .reply(
                    &follow,
                    json!([{ "to": item("printf", "file:///usr/include/stdio.h", 40, 6), "fromRanges": [] }]),
                )
                .await;
        };
        let (calls, _) = tokio::join!(client.outgoing_calls(Path::new("main.c"), 10, 4), server_side);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "printf");
        assert_eq!(calls[0].kind, SymbolKind::Method);
        assert_eq!(calls[0].file_path, "/usr/include/stdio.h");
    }

    #[tokio::test]
    async fn test_unknown_symbol_kind_keeps_other_callers() {
        let (client, mut server) = ready_pair(test_config()).await;

        let server_side = async {
            let prepare = server.recv().await;
            server
                .reply(&prepare, json!([item("add", "file:///ws/math.c", 2, 12)]))
                .await;
            let follow = server.recv().await;
            server
                .reply(
                    &follow,
                    json!([
                        { "from": item("main", "file:///ws/main.c", 9, 12), "fromRanges": [] },
                        { "from": item("bench", "file:///ws/bench.c", 4, 255), "fromRanges": [] }
                    ]),
                )
                .await;
        };
        let (calls, _) = tokio::join!(client.try_incoming_calls(Path::new("math.c"), 3, 4), server_side);
        let calls = calls.unwrap();
        let kinds: Vec<(&str, SymbolKind)> = calls.iter().map(|c| (c.name.as_str(), c.kind)).collect();
        assert_eq!(kinds, vec![("main", SymbolKind::Function), ("bench", SymbolKind::Unknown)]);
    }

    #[tokio::test]
    async fn test_unresolved_anchor_skips_follow_up() {
        let (client, mut server) = ready_pair(test_config()).await;

        let server_side = async {
            let prepare = server.recv().await;
            server.reply(&prepare, Value::Null).await;
        };
        let (calls, _) = tokio::join!(client.incoming_calls(Path::new("a.c"), 1, 0), server_side);
        assert!(calls.is_empty());

        // The next frame the server sees is the next query, not a follow-up
        let server_side = async {
            let req = server.recv().await;
            assert_eq!(req["method"], "textDocument/references");
            server.reply(&req, json!([])).await;
        };
        tokio::join!(client.find_references(Path::new("a.c"), 1, 0), server_side);
    }

    #[tokio::test]
    async fn test_server_requests_are_acknowledged() {
        let (_client, mut server) = ready_pair(test_config()).await;

        server
            .send(json!({ "jsonrpc": "2.0", "id": 99, "method": "window/workDoneProgress/create", "params": { "token": "x" } }))
            .await;
        let ack = server.recv().await;
        assert_eq!(ack["id"], 99);
        assert!(ack["result"].is_null());
    }

    #[tokio::test]
    async fn test_open_file_sends_language_id() {
        let (client, mut server) = ready_pair(test_config()).await;

        assert!(client.open_file(Path::new("src/view.tsx"), "export {}\n").await);
        let note = server.recv().await;
        assert_eq!(note["method"], "textDocument/didOpen");
        assert_eq!(note["params"]["textDocument"]["languageId"], "typescriptreact");
        assert_eq!(note["params"]["textDocument"]["uri"], "file:///ws/src/view.tsx");
        assert_eq!(note["params"]["textDocument"]["text"], "export {}\n");
    }

    #[tokio::test]
    async fn test_shutdown_sequence() {
        let (mut client, mut server) = ready_pair(test_config()).await;

        let server_side = async {
            let req = server.recv().await;
            assert_eq!(req["method"], "shutdown");
            server.reply(&req, Value::Null).await;
            let exit = server.recv().await;
            assert_eq!(exit["method"], "exit");
            assert!(exit.get("id").is_none());
            server.is_closed().await
        };
        let (_, closed) = tokio::join!(client.shutdown(), server_side);
        assert!(closed);
        assert_eq!(client.state(), ClientState::Stopped);
        assert!(client.find_references(Path::new("a.c"), 1, 0).await.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_before_ready() {
        let (mut client, mut server) = pair(test_config());

        let server_side = async {
            let req = server.recv().await;
            assert_eq!(req["method"], "shutdown");
            server.reply(&req, Value::Null).await;
            assert_eq!(server.recv().await["method"], "exit");
        };
        tokio::join!(client.shutdown(), server_side);
        assert_eq!(client.state(), ClientState::Stopped);
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let config = LspServerConfig {
            command: "codescope-no-such-language-server".into(),
            fallback: vec!["codescope-no-such-launcher".into(), "--stdio".into()],
            ..test_config()
        };
        let dir = tempfile::tempdir().unwrap();
        let mut client = LspClient::new("missing", config, dir.path());

        assert!(!client.start().await);
        assert_eq!(client.state(), ClientState::NotStarted);
        assert!(!client.initialize().await);
        assert!(client.find_references(Path::new("a.c"), 1, 0).await.is_empty());

        client.shutdown().await;
        assert_eq!(client.state(), ClientState::Stopped);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fallback_launcher_used_when_binary_missing() {
        let config = LspServerConfig {
            command: "codescope-no-such-language-server".into(),
            fallback: vec!["cat".into()],
            ..test_config()
        };
        let dir = tempfile::tempdir().unwrap();
        let mut client = LspClient::new("fallback", config, dir.path());

        assert!(client.start().await);
        assert_eq!(client.state(), ClientState::Initializing);

        client.shutdown().await;
        assert_eq!(client.state(), ClientState::Stopped);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_that_echoes_is_not_a_server() {
        // `cat` starts fine but never produces an initialize result
        let config = LspServerConfig {
            command: "cat".into(),
            ..test_config()
        };
        let dir = tempfile::tempdir().unwrap();
        let mut client = LspClient::new("cat", config, dir.path());

        assert!(client.start().await);
        assert_eq!(client.state(), ClientState::Initializing);
        assert!(!client.initialize().await);
        assert!(!client.is_ready());

        client.shutdown().await;
        assert_eq!(client.state(), ClientState::Stopped);
    }
}
