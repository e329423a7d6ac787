//! Core data model shared by extraction, enrichment and downstream consumers
//!
//! Entities carry no durable identifier. Identity is positional
//! (`file_path` + `start_line` + `name`).

use serde::{Deserialize, Serialize};

use crate::lsp::SymbolKind;

/// Closed vocabulary of entity kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Function,
    ArrowFunction,
    Class,
    Struct,
    Union,
    Enum,
    Typedef,
    Macro,
    Interface,
    TypeAlias,
    Namespace,
    TemplateFunction,
    TemplateClass,
    TemplateStruct,
    TemplateUnion,
    TemplateTypeAlias,
    GlobalVariable,
    JsonKey,
}

/// What kind of enrichment query an entity gets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRole {
    /// Query incoming/outgoing calls
    Callable,
    /// Query references
    Referenceable,
    /// No protocol I/O
    Skip,
}

impl EntityType {
    pub const ALL: [EntityType; 18] = [
        EntityType::Function,
        EntityType::ArrowFunction,
        EntityType::Class,
        EntityType::Struct,
        EntityType::Union,
        EntityType::Enum,
        EntityType::Typedef,
        EntityType::Macro,
        EntityType::Interface,
        EntityType::TypeAlias,
        EntityType::Namespace,
        EntityType::TemplateFunction,
        EntityType::TemplateClass,
        EntityType::TemplateStruct,
        EntityType::TemplateUnion,
        EntityType::TemplateTypeAlias,
        EntityType::GlobalVariable,
        EntityType::JsonKey,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Function => "function",
            EntityType::ArrowFunction => "arrow_function",
            EntityType::Class => "class",
            EntityType::Struct => "struct",
            EntityType::Union => "union",
            EntityType::Enum => "enum",
            EntityType::Typedef => "typedef",
            EntityType::Macro => "macro",
            EntityType::Interface => "interface",
            EntityType::TypeAlias => "type_alias",
            EntityType::Namespace => "namespace",
            EntityType::TemplateFunction => "template_function",
            EntityType::TemplateClass => "template_class",
            EntityType::TemplateStruct => "template_struct",
            EntityType::TemplateUnion => "template_union",
            EntityType::TemplateTypeAlias => "template_type_alias",
            EntityType::GlobalVariable => "global_variable",
            EntityType::JsonKey => "json_key",
        }
    }

    /// The `template_` variant of this kind, if it can be templated
    pub fn templated(self) -> Option<EntityType> {
        match self {
            EntityType::Function => Some(EntityType::TemplateFunction),
            EntityType::Class => Some(EntityType::TemplateClass),
            EntityType::Struct => Some(EntityType::TemplateStruct),
            EntityType::Union => Some(EntityType::TemplateUnion),
            EntityType::TypeAlias => Some(EntityType::TemplateTypeAlias),
            _ => None,
        }
    }

    pub fn role(self) -> EntityRole {
        match self {
            EntityType::Function | EntityType::ArrowFunction | EntityType::TemplateFunction => {
                EntityRole::Callable
            }
            EntityType::GlobalVariable
            | EntityType::Struct
            | EntityType::Union
            | EntityType::Enum
            | EntityType::Typedef
            | EntityType::Macro
            | EntityType::Interface
            | EntityType::TypeAlias
            | EntityType::Class
            | EntityType::TemplateClass
            | EntityType::TemplateStruct
            | EntityType::TemplateUnion
            | EntityType::TemplateTypeAlias => EntityRole::Referenceable,
            EntityType::Namespace | EntityType::JsonKey => EntityRole::Skip,
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A usage site of a symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Workspace-relative path (absolute if outside the workspace)
    pub file_path: String,
    /// 1-based line
    pub line: u32,
    /// 0-based column
    pub column: u32,
    /// Source line containing the reference, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// A caller or callee of a callable entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallHierarchyItem {
    pub name: String,
    #[serde(with = "symbol_kind_name")]
    pub kind: SymbolKind,
    pub file_path: String,
    /// 1-based line
    pub line: u32,
    /// 0-based column
    pub column: u32,
}

/// A named, position-addressed unit of source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeEntity {
    pub name: String,
    pub entity_type: EntityType,
    /// Workspace-relative path
    pub file_path: String,
    /// 1-based, inclusive
    pub start_line: u32,
    /// 1-based, inclusive
    pub end_line: u32,
    /// 0-based column of the name token
    pub name_column: u32,
    /// 1-based line of the name token; differs from `start_line` when the
    /// declaration starts before its name (`static char *\nname(...)`)
    #[serde(default)]
    pub name_line: u32,
    /// Verbatim source slice
    pub code: String,
    #[serde(default)]
    pub references: Vec<Reference>,
    #[serde(default)]
    pub incoming_calls: Vec<CallHierarchyItem>,
    #[serde(default)]
    pub outgoing_calls: Vec<CallHierarchyItem>,
}

impl CodeEntity {
    pub fn new(
        name: impl Into<String>,
        entity_type: EntityType,
        file_path: impl Into<String>,
        start_line: u32,
        end_line: u32,
        name_column: u32,
        code: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            entity_type,
            file_path: file_path.into(),
            start_line,
            end_line,
            name_column,
            name_line: start_line,
            code: code.into(),
            references: Vec::new(),
            incoming_calls: Vec::new(),
            outgoing_calls: Vec::new(),
        }
    }

    pub fn with_name_line(mut self, name_line: u32) -> Self {
        self.name_line = name_line;
        self
    }

    /// Position to query a language server at: the name token
    pub fn name_position(&self) -> (u32, u32) {
        (self.name_line.max(self.start_line), self.name_column)
    }

    pub fn is_enriched(&self) -> bool {
        !self.references.is_empty()
            || !self.incoming_calls.is_empty()
            || !self.outgoing_calls.is_empty()
    }
}

impl std::fmt::Display for CodeEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} ({}:{}-{})",
            self.entity_type, self.name, self.file_path, self.start_line, self.end_line
        )
    }
}

/// Aggregate result of one symbol query against the pool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolReferences {
    pub symbol_name: String,
    pub definition_file: String,
    pub definition_line: u32,
    pub references: Vec<Reference>,
    pub incoming_calls: Vec<CallHierarchyItem>,
    pub outgoing_calls: Vec<CallHierarchyItem>,
}

impl SymbolReferences {
    /// Empty result anchored at a definition site
    pub fn empty(definition_file: impl Into<String>, definition_line: u32) -> Self {
        Self {
            definition_file: definition_file.into(),
            definition_line,
            ..Default::default()
        }
    }
}

mod symbol_kind_name {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::lsp::SymbolKind;

    pub fn serialize<S: Serializer>(kind: &SymbolKind, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(kind.as_str())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<SymbolKind, D::Error> {
        let name = String::deserialize(d)?;
        Ok(SymbolKind::from_name(&name))
    }
}
