//! Framed message transport over a server's standard streams
//!
//! One reader task and one writer task per connection. Responses are routed
//! to the waiter that issued the request through a per-id oneshot handle,
//! so any number of requests may be in flight on the same connection.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::client::LspError;
use super::protocol::{
    FrameReader, IdGenerator, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, JsonRpcResponseOut,
};
use super::types::{IncomingNotification, ServerRequest};

type Waiter = oneshot::Sender<Result<serde_json::Value, LspError>>;
type PendingMap = Arc<Mutex<Pending>>;

/// Waiters by request id. Once closed, nothing new is registered.
#[derive(Default)]
struct Pending {
    waiters: HashMap<i64, Waiter>,
    closed: bool,
}

impl Pending {
    fn register(&mut self, id: i64, tx: Waiter) -> Result<(), LspError> {
        if self.closed {
            return Err(LspError::ChannelClosed);
        }
        self.waiters.insert(id, tx);
        Ok(())
    }

    fn take(&mut self, id: i64) -> Option<Waiter> {
        self.waiters.remove(&id)
    }

    /// Drop every waiter so they observe a closed channel
    fn close(&mut self) {
        self.closed = true;
        self.waiters.clear();
    }
}

/// A live connection to one language server
pub struct Transport {
    name: String,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    pending: PendingMap,
    ids: IdGenerator,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Transport {
    /// Start the reader and writer tasks over the given streams
    pub fn spawn<R, W>(name: &str, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let pending: PendingMap = Arc::new(Mutex::new(Pending::default()));
        let (outbound, outbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();

        let reader = tokio::spawn(Self::reader_loop(
            FrameReader::new(BufReader::new(reader)),
            pending.clone(),
            outbound.clone(),
            name.to_string(),
        ));
        let writer = tokio::spawn(Self::writer_loop(writer, outbound_rx, name.to_string()));

        Self {
            name: name.to_string(),
            outbound,
            pending,
            ids: IdGenerator::new(),
            reader,
            writer,
        }
    }

    /// Reader loop - decodes frames until the stream closes
    async fn reader_loop<R>(
        mut frames: FrameReader<BufReader<R>>,
        pending: PendingMap,
        outbound: mpsc::UnboundedSender<Vec<u8>>,
        name: String,
    ) where
        R: AsyncRead + Unpin,
    {
        while !frames.is_closed() {
            let Some(message) = frames.read_one().await else {
                continue;
            };
            Self::dispatch(message, &pending, &outbound, &name).await;
        }

        tracing::debug!("LSP {} reader: EOF", name);

        // Waiters observe a closed channel instead of sitting out their timeout
        pending.lock().await.close();
    }

    async fn dispatch(
        message: serde_json::Value,
        pending: &PendingMap,
        outbound: &mpsc::UnboundedSender<Vec<u8>>,
        name: &str,
    ) {
        let has_method = message.get("method").is_some();
        let has_id = message.get("id").is_some_and(|id| !id.is_null());

        if has_method && has_id {
            if let Ok(request) = serde_json::from_value::<ServerRequest>(message) {
                Self::answer_server_request(&request, outbound, name);
            }
            return;
        }

        if has_method {
            if let Ok(notification) = serde_json::from_value::<IncomingNotification>(message) {
                Self::log_notification(&notification, name);
            }
            return;
        }

        match serde_json::from_value::<JsonRpcResponse>(message) {
            Ok(JsonRpcResponse { id: Some(id), result, error, .. }) => {
                let waiter = pending.lock().await.take(id);
                match waiter {
                    Some(tx) => {
                        let outcome = match error {
                            Some(err) => Err(LspError::Rpc {
                                code: err.code,
                                message: err.message,
                            }),
                            None => Ok(result.unwrap_or(serde_json::Value::Null)),
                        };
                        let _ = tx.send(outcome);
                    }
                    None => {
                        // Response for unknown/timed-out request
                        tracing::debug!("LSP {} discarding response for unknown id {}", name, id);
                    }
                }
            }
            Ok(_) => tracing::debug!("LSP {} response without id", name),
            Err(e) => tracing::warn!("LSP {} unrecognised message: {}", name, e),
        }
    }

    /// Server-to-client requests get a null result so the server never blocks on us
    fn answer_server_request(request: &ServerRequest, outbound: &mpsc::UnboundedSender<Vec<u8>>, name: &str) {
        match request.method.as_str() {
            "window/workDoneProgress/create" | "client/registerCapability" | "window/showMessageRequest" => {
                tracing::debug!("LSP {} acknowledging {}", name, request.method);
            }
            other => tracing::warn!("LSP {} unknown server request: {}", name, other),
        }

        let response = JsonRpcResponseOut::success_null(request.id.clone());
        if let Ok(encoded) = response.encode() {
            let _ = outbound.send(encoded);
        }
    }

    fn log_notification(notification: &IncomingNotification, name: &str) {
        match notification.method.as_str() {
            "window/logMessage" | "window/showMessage" => {
                if let Some(msg) = notification
                    .params
                    .as_ref()
                    .and_then(|p| p.get("message"))
                    .and_then(|v| v.as_str())
                {
                    tracing::debug!("LSP {} message: {}", name, msg);
                }
            }
            "$/progress" => tracing::trace!("LSP {} progress", name),
            "textDocument/publishDiagnostics" => tracing::trace!("LSP {} diagnostics received", name),
            other => tracing::trace!("LSP {} unhandled notification: {}", name, other),
        }
    }

    /// Writer loop - a failed write ends the loop and later writes are lost
    async fn writer_loop<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<Vec<u8>>, name: String)
    where
        W: AsyncWrite + Unpin,
    {
        while let Some(data) = rx.recv().await {
            if let Err(e) = writer.write_all(&data).await {
                tracing::warn!("LSP {} writer error: {}", name, e);
                break;
            }
            if let Err(e) = writer.flush().await {
                tracing::warn!("LSP {} flush error: {}", name, e);
                break;
            }
        }
        let _ = writer.shutdown().await;
        tracing::debug!("LSP {} writer loop ended", name);
    }

    /// Send a request and wait up to `wait` for its response
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        wait: Duration,
    ) -> Result<serde_json::Value, LspError> {
        if !self.is_alive() {
            return Err(LspError::ChannelClosed);
        }

        let id = self.ids.next();
        let encoded = JsonRpcRequest::new(id, method, params)
            .encode()
            .map_err(|e| LspError::Parse(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.register(id, tx)?;

        if self.outbound.send(encoded).is_err() {
            self.pending.lock().await.take(id);
            return Err(LspError::ChannelClosed);
        }

        tracing::trace!("LSP {} -> {} (id={})", self.name, method, id);

        match timeout(wait, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(LspError::ChannelClosed),
            Err(_) => {
                self.pending.lock().await.take(id);
                Err(LspError::Timeout(wait))
            }
        }
    }

    /// Send a notification (no response expected)
    pub fn notify(&self, method: &str, params: Option<serde_json::Value>) -> Result<(), LspError> {
        let encoded = JsonRpcNotification::new(method, params)
            .encode()
            .map_err(|e| LspError::Parse(e.to_string()))?;
        self.outbound.send(encoded).map_err(|_| LspError::ChannelClosed)
    }

    /// Whether the reader is still consuming server output
    pub fn is_alive(&self) -> bool {
        !self.reader.is_finished()
    }

    /// Stop both tasks. Writes that were already queued are flushed first.
    pub async fn close(self) {
        let Transport { outbound, reader, writer, .. } = self;
        drop(outbound);
        // The reader holds the last sender clone; the writer drains once it is gone
        reader.abort();
        let _ = reader.await;
        let _ = timeout(Duration::from_millis(500), writer).await;
    }
}
