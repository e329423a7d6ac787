//! Language Server Protocol client infrastructure
//!
//! Drives external language servers to enrich extracted entities with
//! references and call hierarchy.
//!
//! # Components
//!
//! - [`types`] - LSP type definitions (Position, Range, Location, etc.)
//! - [`protocol`] - JSON-RPC messages and Content-Length framing
//! - [`transport`] - Reader/writer tasks with per-request completion handles
//! - [`client`] - Per-server LSP client
//! - [`manager`] - Multi-server routing and lifecycle management
//! - [`document`] - Opened documents and path/URI mapping
//!
//! # Supported Languages
//!
//! - C/C++ (clangd)
//! - TypeScript/TSX (typescript-language-server)

pub mod types;
pub mod protocol;
pub mod transport;
pub mod client;
pub mod manager;
pub mod document;

pub use client::{ClientState, LspClient, LspError};
pub use manager::{CapabilityReport, LspManager, ServerStatus};
pub use types::SymbolKind;
