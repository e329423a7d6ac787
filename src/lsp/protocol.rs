//! JSON-RPC protocol handling for LSP
//!
//! Implements the JSON-RPC 2.0 message format used by LSP,
//! including Content-Length framing for stdio transport.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// JSON-RPC version constant
pub const JSONRPC_VERSION: &str = "2.0";

/// Wrap a serialized body in an LSP `Content-Length` frame
pub fn frame(body: &[u8]) -> Vec<u8> {
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    let mut message = Vec::with_capacity(header.len() + body.len());
    message.extend_from_slice(header.as_bytes());
    message.extend_from_slice(body);
    message
}

/// Serialize any message and frame it
pub fn encode_message<T: Serialize>(message: &T) -> Result<Vec<u8>, serde_json::Error> {
    let body = serde_json::to_vec(message)?;
    Ok(frame(&body))
}

/// JSON-RPC request message
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: i64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    pub fn new(id: i64, method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            method: method.into(),
            params,
        }
    }

    /// Encode request to LSP wire format with Content-Length header
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        encode_message(self)
    }
}

/// JSON-RPC notification (no id, no response expected)
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            params,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        encode_message(self)
    }
}

/// JSON-RPC response (incoming from server)
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: String,
    pub id: Option<i64>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Get the result, or error if present
    pub fn into_result(self) -> Result<serde_json::Value, JsonRpcError> {
        if let Some(error) = self.error {
            Err(error)
        } else {
            Ok(self.result.unwrap_or(serde_json::Value::Null))
        }
    }
}

/// JSON-RPC response (outgoing to server - for responding to server requests)
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponseOut {
    pub jsonrpc: &'static str,
    pub id: serde_json::Value,
    pub result: serde_json::Value,
}

impl JsonRpcResponseOut {
    /// Create a success response with null result
    pub fn success_null(id: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: serde_json::Value::Null,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        encode_message(self)
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, Deserialize, thiserror::Error)]
#[error("JSON-RPC error {code}: {message}")]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// Atomic ID generator for JSON-RPC requests
#[derive(Debug)]
pub struct IdGenerator(AtomicI64);

impl IdGenerator {
    pub fn new() -> Self {
        Self(AtomicI64::new(1))
    }

    pub fn next(&self) -> i64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse Content-Length header from LSP message headers
///
/// LSP uses HTTP-like headers before the JSON body:
/// ```text
/// Content-Length: 123\r\n
/// \r\n
/// {"jsonrpc": "2.0", ...}
/// ```
pub fn parse_content_length(headers: &str) -> Option<usize> {
    for line in headers.lines() {
        let line = line.trim();
        if line.to_lowercase().starts_with("content-length:") {
            return line
                .split(':')
                .nth(1)
                .and_then(|len| len.trim().parse().ok());
        }
    }
    None
}

/// Reads `Content-Length` framed JSON messages from a byte stream
pub struct FrameReader<R> {
    inner: R,
    closed: bool,
}

impl<R: AsyncBufRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            closed: false,
        }
    }

    /// True once the underlying stream has hit EOF or an I/O error
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Read one complete frame.
    ///
    /// Returns `None` on EOF, on a missing or non-numeric length header, and
    /// on a body that is not valid JSON. Never fails past this point.
    pub async fn read_one(&mut self) -> Option<serde_json::Value> {
        if self.closed {
            return None;
        }

        let mut headers = String::new();
        loop {
            let mut line = String::new();
            match self.inner.read_line(&mut line).await {
                Ok(0) => {
                    self.closed = true;
                    return None;
                }
                Ok(_) => {
                    if line.trim().is_empty() {
                        if headers.is_empty() {
                            // Stray blank line between frames
                            continue;
                        }
                        break;
                    }
                    headers.push_str(&line);
                }
                Err(e) => {
                    tracing::debug!("frame header read failed: {}", e);
                    self.closed = true;
                    return None;
                }
            }
        }

        let Some(len) = parse_content_length(&headers) else {
            tracing::warn!("frame without a usable Content-Length header: {:?}", headers.trim());
            return None;
        };

        let mut body = vec![0u8; len];
        if let Err(e) = self.inner.read_exact(&mut body).await {
            tracing::debug!("truncated frame body ({} bytes expected): {}", len, e);
            self.closed = true;
            return None;
        }

        match serde_json::from_slice(&body) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("frame body is not valid JSON: {}", e);
                None
            }
        }
    }
}
