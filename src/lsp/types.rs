//! LSP type definitions
//!
//! The subset of Language Server Protocol types needed for references
//! and call hierarchy queries.

use serde::{Deserialize, Deserializer, Serialize};

/// A position in a text document (0-indexed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Line number (0-indexed)
    pub line: u32,
    /// Character offset in the line (0-indexed)
    pub character: u32,
}

impl Position {
    /// Build from a 1-based model line and a 0-based column
    pub fn from_model(line: u32, column: u32) -> Self {
        Self {
            line: to_protocol_line(line),
            character: column,
        }
    }

    /// 1-based model line for this position
    pub fn model_line(&self) -> u32 {
        from_protocol_line(self.line)
    }
}

/// 1-based model line to 0-based protocol line
pub fn to_protocol_line(model_line: u32) -> u32 {
    model_line.saturating_sub(1)
}

/// 0-based protocol line to 1-based model line
pub fn from_protocol_line(protocol_line: u32) -> u32 {
    protocol_line + 1
}

/// A range in a text document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    /// Start position (inclusive)
    pub start: Position,
    /// End position (exclusive)
    pub end: Position,
}

/// A location in a document (URI + range)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Document URI (file:// scheme)
    pub uri: String,
    /// Range within the document
    pub range: Range,
}

/// Symbol kinds in LSP (integer-encoded on the wire)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde_repr::Serialize_repr, serde_repr::Deserialize_repr,
)]
#[repr(u8)]
pub enum SymbolKind {
    /// Not part of the protocol vocabulary; used for unrecognised names
    Unknown = 0,
    File = 1,
    Module = 2,
    Namespace = 3,
    Package = 4,
    Class = 5,
    Method = 6,
    Property = 7,
    Field = 8,
    Constructor = 9,
    Enum = 10,
    Interface = 11,
    #[default]
    Function = 12,
    Variable = 13,
    Constant = 14,
    String = 15,
    Number = 16,
    Boolean = 17,
    Array = 18,
    Object = 19,
    Key = 20,
    Null = 21,
    EnumMember = 22,
    Struct = 23,
    Event = 24,
    Operator = 25,
    TypeParameter = 26,
}

impl SymbolKind {
    const NAMED: [SymbolKind; 27] = [
        SymbolKind::Unknown,
        SymbolKind::File,
        SymbolKind::Module,
        SymbolKind::Namespace,
        SymbolKind::Package,
        SymbolKind::Class,
        SymbolKind::Method,
        SymbolKind::Property,
        SymbolKind::Field,
        SymbolKind::Constructor,
        SymbolKind::Enum,
        SymbolKind::Interface,
        SymbolKind::Function,
        SymbolKind::Variable,
        SymbolKind::Constant,
        SymbolKind::String,
        SymbolKind::Number,
        SymbolKind::Boolean,
        SymbolKind::Array,
        SymbolKind::Object,
        SymbolKind::Key,
        SymbolKind::Null,
        SymbolKind::EnumMember,
        SymbolKind::Struct,
        SymbolKind::Event,
        SymbolKind::Operator,
        SymbolKind::TypeParameter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Unknown => "unknown",
            SymbolKind::File => "file",
            SymbolKind::Module => "module",
            SymbolKind::Namespace => "namespace",
            SymbolKind::Package => "package",
            SymbolKind::Class => "class",
            SymbolKind::Method => "method",
            SymbolKind::Property => "property",
            SymbolKind::Field => "field",
            SymbolKind::Constructor => "constructor",
            SymbolKind::Enum => "enum",
            SymbolKind::Interface => "interface",
            SymbolKind::Function => "function",
            SymbolKind::Variable => "variable",
            SymbolKind::Constant => "constant",
            SymbolKind::String => "string",
            SymbolKind::Number => "number",
            SymbolKind::Boolean => "boolean",
            SymbolKind::Array => "array",
            SymbolKind::Object => "object",
            SymbolKind::Key => "key",
            SymbolKind::Null => "null",
            SymbolKind::EnumMember => "enum_member",
            SymbolKind::Struct => "struct",
            SymbolKind::Event => "event",
            SymbolKind::Operator => "operator",
            SymbolKind::TypeParameter => "type_parameter",
        }
    }

    /// Kind for a wire code; codes outside the protocol range map to `Unknown`
    pub fn from_code(code: u64) -> Self {
        usize::try_from(code)
            .ok()
            .and_then(|i| Self::NAMED.get(i))
            .copied()
            .unwrap_or(SymbolKind::Unknown)
    }

    /// Inverse of [`SymbolKind::as_str`]; unrecognised names map to `Unknown`
    pub fn from_name(name: &str) -> Self {
        Self::NAMED
            .iter()
            .copied()
            .find(|kind| kind.as_str() == name)
            .unwrap_or(SymbolKind::Unknown)
    }
}

/// Servers may send kinds newer than this vocabulary; one odd item must not
/// fail the whole list it arrives in.
fn lenient_symbol_kind<'de, D>(deserializer: D) -> Result<SymbolKind, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Value::deserialize(deserializer)?;
    Ok(raw.as_u64().map(SymbolKind::from_code).unwrap_or(SymbolKind::Unknown))
}

/// Call hierarchy item as sent by the server.
///
/// Echoed back verbatim in follow-up requests, so `data` must survive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallHierarchyItem {
    pub name: String,
    #[serde(default, deserialize_with = "lenient_symbol_kind")]
    pub kind: SymbolKind,
    pub uri: String,
    pub range: Range,
    pub selection_range: Range,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Incoming call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallHierarchyIncomingCall {
    pub from: CallHierarchyItem,
    #[serde(default)]
    pub from_ranges: Vec<Range>,
}

/// Outgoing call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallHierarchyOutgoingCall {
    pub to: CallHierarchyItem,
    #[serde(default)]
    pub from_ranges: Vec<Range>,
}

/// Server capabilities (subset we care about)
///
/// Providers may be `true` or an options object, so they are kept as raw
/// values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCapabilities {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references_provider: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition_provider: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_hierarchy_provider: Option<serde_json::Value>,
}

impl ServerCapabilities {
    fn enabled(value: &Option<serde_json::Value>) -> bool {
        match value {
            None | Some(serde_json::Value::Null) => false,
            Some(serde_json::Value::Bool(b)) => *b,
            Some(_) => true,
        }
    }

    pub fn references(&self) -> bool {
        Self::enabled(&self.references_provider)
    }

    pub fn call_hierarchy(&self) -> bool {
        Self::enabled(&self.call_hierarchy_provider)
    }
}

/// Initialize result from server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    #[serde(default)]
    pub capabilities: ServerCapabilities,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_info: Option<ServerInfo>,
}

/// Server info
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Incoming request from server (has id, expects response)
#[derive(Debug, Clone, Deserialize)]
pub struct ServerRequest {
    pub id: serde_json::Value, // Can be number or string
    pub method: String,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
}

/// Incoming notification from server (no id)
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingNotification {
    pub method: String,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
}
