//! C++ entity extraction

use tree_sitter::Node;

use super::c::{function_definition, global_declaration, record, type_definition};
use super::common::{children, is_file_scope, named_children, push_by_name_field, EntitySink};
use crate::model::EntityType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CppNode {
    FunctionDefinition,
    ClassSpecifier,
    StructSpecifier,
    UnionSpecifier,
    EnumSpecifier,
    TypeDefinition,
    AliasDeclaration,
    NamespaceDefinition,
    TemplateDeclaration,
    PreprocDef,
    PreprocFunctionDef,
    Declaration,
    Other,
}

impl CppNode {
    fn of(node: Node) -> Self {
        match node.kind() {
            "function_definition" => CppNode::FunctionDefinition,
            "class_specifier" => CppNode::ClassSpecifier,
            "struct_specifier" => CppNode::StructSpecifier,
            "union_specifier" => CppNode::UnionSpecifier,
            "enum_specifier" => CppNode::EnumSpecifier,
            "type_definition" => CppNode::TypeDefinition,
            "alias_declaration" => CppNode::AliasDeclaration,
            "namespace_definition" => CppNode::NamespaceDefinition,
            "template_declaration" => CppNode::TemplateDeclaration,
            "preproc_def" => CppNode::PreprocDef,
            "preproc_function_def" => CppNode::PreprocFunctionDef,
            "declaration" => CppNode::Declaration,
            _ => CppNode::Other,
        }
    }

    /// Entity kind for declarations a template may wrap
    fn templatable(self) -> Option<EntityType> {
        match self {
            CppNode::FunctionDefinition => Some(EntityType::Function),
            CppNode::ClassSpecifier => Some(EntityType::Class),
            CppNode::StructSpecifier => Some(EntityType::Struct),
            CppNode::UnionSpecifier => Some(EntityType::Union),
            CppNode::AliasDeclaration => Some(EntityType::TypeAlias),
            CppNode::EnumSpecifier
            | CppNode::TypeDefinition
            | CppNode::NamespaceDefinition
            | CppNode::TemplateDeclaration
            | CppNode::PreprocDef
            | CppNode::PreprocFunctionDef
            | CppNode::Declaration
            | CppNode::Other => None,
        }
    }
}

pub(super) fn extract(root: Node, sink: &mut EntitySink) {
    visit(root, sink);
}

fn visit(node: Node, sink: &mut EntitySink) {
    let kind = CppNode::of(node);
    match kind {
        CppNode::TemplateDeclaration => {
            template(node, sink);
            return;
        }
        CppNode::Declaration => {
            if is_file_scope(node, true) {
                global_declaration(node, sink);
            }
        }
        CppNode::TypeDefinition => type_definition(node, sink),
        CppNode::EnumSpecifier => {
            record(node, sink, EntityType::Enum);
        }
        CppNode::NamespaceDefinition => {
            push_by_name_field(node, sink, EntityType::Namespace);
        }
        CppNode::PreprocDef | CppNode::PreprocFunctionDef => {
            push_by_name_field(node, sink, EntityType::Macro);
        }
        CppNode::FunctionDefinition
        | CppNode::ClassSpecifier
        | CppNode::StructSpecifier
        | CppNode::UnionSpecifier
        | CppNode::AliasDeclaration => {
            if let Some(entity_type) = kind.templatable() {
                emit(kind, node, sink, entity_type);
            }
        }
        CppNode::Other => {}
    }

    for child in children(node) {
        visit(child, sink);
    }
}

fn emit(kind: CppNode, node: Node, sink: &mut EntitySink, entity_type: EntityType) -> bool {
    match kind {
        CppNode::FunctionDefinition => function_definition(node, sink, entity_type),
        CppNode::AliasDeclaration => push_by_name_field(node, sink, entity_type),
        _ => record(node, sink, entity_type),
    }
}

/// `template<...> X`: X is emitted once with a `template_` kind, then only
/// its children are walked so it is not emitted a second time.
fn template(node: Node, sink: &mut EntitySink) {
    for child in named_children(node) {
        let kind = CppNode::of(child);
        match kind.templatable().and_then(EntityType::templated) {
            Some(entity_type) => {
                emit(kind, child, sink, entity_type);
                for grandchild in children(child) {
                    visit(grandchild, sink);
                }
            }
            None => visit(child, sink),
        }
    }
}
