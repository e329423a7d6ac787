//! C entity extraction
//!
//! The rule functions here are shared with the C++ extractor, whose grammar
//! uses the same node shapes for the C subset.

use tree_sitter::Node;

use super::common::{
    children, declarator_name, declares_function, is_file_scope, push_by_name_field, EntitySink,
};
use crate::model::EntityType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CNode {
    FunctionDefinition,
    StructSpecifier,
    UnionSpecifier,
    EnumSpecifier,
    TypeDefinition,
    PreprocDef,
    PreprocFunctionDef,
    Declaration,
    Other,
}

impl CNode {
    fn of(node: Node) -> Self {
        match node.kind() {
            "function_definition" => CNode::FunctionDefinition,
            "struct_specifier" => CNode::StructSpecifier,
            "union_specifier" => CNode::UnionSpecifier,
            "enum_specifier" => CNode::EnumSpecifier,
            "type_definition" => CNode::TypeDefinition,
            "preproc_def" => CNode::PreprocDef,
            "preproc_function_def" => CNode::PreprocFunctionDef,
            "declaration" => CNode::Declaration,
            _ => CNode::Other,
        }
    }
}

pub(super) fn extract(root: Node, sink: &mut EntitySink) {
    visit(root, sink);
}

fn visit(node: Node, sink: &mut EntitySink) {
    match CNode::of(node) {
        CNode::FunctionDefinition => {
            function_definition(node, sink, EntityType::Function);
        }
        CNode::StructSpecifier => {
            record(node, sink, EntityType::Struct);
        }
        CNode::UnionSpecifier => {
            record(node, sink, EntityType::Union);
        }
        CNode::EnumSpecifier => {
            record(node, sink, EntityType::Enum);
        }
        CNode::TypeDefinition => type_definition(node, sink),
        CNode::PreprocDef | CNode::PreprocFunctionDef => {
            push_by_name_field(node, sink, EntityType::Macro);
        }
        CNode::Declaration => {
            if is_file_scope(node, false) {
                global_declaration(node, sink);
            }
        }
        CNode::Other => {}
    }

    for child in children(node) {
        visit(child, sink);
    }
}

/// A function body, named through its declarator
pub(super) fn function_definition(node: Node, sink: &mut EntitySink, entity_type: EntityType) -> bool {
    match node.child_by_field_name("declarator").and_then(declarator_name) {
        Some(name) => {
            sink.push(entity_type, node, name);
            true
        }
        None => false,
    }
}

/// struct/union/enum/class specifier. Without a body it is only a type use.
pub(super) fn record(node: Node, sink: &mut EntitySink, entity_type: EntityType) -> bool {
    if node.child_by_field_name("body").is_none() {
        return false;
    }
    push_by_name_field(node, sink, entity_type)
}

pub(super) fn type_definition(node: Node, sink: &mut EntitySink) {
    let mut cursor = node.walk();
    let declarators: Vec<Node> = node.children_by_field_name("declarator", &mut cursor).collect();
    for declarator in declarators {
        if let Some(name) = declarator_name(declarator) {
            sink.push(EntityType::Typedef, node, name);
        }
    }
}

/// One global per declared object; prototypes are skipped
pub(super) fn global_declaration(node: Node, sink: &mut EntitySink) {
    let mut cursor = node.walk();
    let declarators: Vec<Node> = node.children_by_field_name("declarator", &mut cursor).collect();
    for declarator in declarators {
        if declares_function(declarator) {
            continue;
        }
        if let Some(name) = declarator_name(declarator) {
            sink.push(EntityType::GlobalVariable, node, name);
        }
    }
}
