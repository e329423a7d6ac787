//! TypeScript and TSX entity extraction. Both grammars share node kinds.

use tree_sitter::Node;

use super::common::{children, push_by_name_field, EntitySink};
use crate::model::EntityType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TsNode {
    FunctionDeclaration,
    GeneratorFunctionDeclaration,
    LexicalDeclaration,
    VariableDeclaration,
    ClassDeclaration,
    AbstractClassDeclaration,
    InterfaceDeclaration,
    TypeAliasDeclaration,
    EnumDeclaration,
    ExportStatement,
    Other,
}

impl TsNode {
    fn of(node: Node) -> Self {
        match node.kind() {
            "function_declaration" => TsNode::FunctionDeclaration,
            "generator_function_declaration" => TsNode::GeneratorFunctionDeclaration,
            "lexical_declaration" => TsNode::LexicalDeclaration,
            "variable_declaration" => TsNode::VariableDeclaration,
            "class_declaration" => TsNode::ClassDeclaration,
            "abstract_class_declaration" => TsNode::AbstractClassDeclaration,
            "interface_declaration" => TsNode::InterfaceDeclaration,
            "type_alias_declaration" => TsNode::TypeAliasDeclaration,
            "enum_declaration" => TsNode::EnumDeclaration,
            "export_statement" => TsNode::ExportStatement,
            _ => TsNode::Other,
        }
    }
}

pub(super) fn extract(root: Node, sink: &mut EntitySink) {
    visit(root, sink);
}

fn visit(node: Node, sink: &mut EntitySink) {
    match TsNode::of(node) {
        TsNode::FunctionDeclaration | TsNode::GeneratorFunctionDeclaration => {
            push_by_name_field(node, sink, EntityType::Function);
        }
        TsNode::LexicalDeclaration | TsNode::VariableDeclaration => arrow_functions(node, sink),
        TsNode::ClassDeclaration | TsNode::AbstractClassDeclaration => {
            push_by_name_field(node, sink, EntityType::Class);
        }
        TsNode::InterfaceDeclaration => {
            push_by_name_field(node, sink, EntityType::Interface);
        }
        TsNode::TypeAliasDeclaration => {
            push_by_name_field(node, sink, EntityType::TypeAlias);
        }
        TsNode::EnumDeclaration => {
            push_by_name_field(node, sink, EntityType::Enum);
        }
        TsNode::ExportStatement => {
            // The wrapped declaration is visited instead of the wrapper
            if let Some(declaration) = node.child_by_field_name("declaration") {
                visit(declaration, sink);
                return;
            }
        }
        TsNode::Other => {}
    }

    for child in children(node) {
        visit(child, sink);
    }
}

/// `const f = () => ...`: one entity per arrow-valued declarator, spanning the whole declaration
fn arrow_functions(node: Node, sink: &mut EntitySink) {
    for declarator in children(node) {
        if declarator.kind() != "variable_declarator" {
            continue;
        }
        let is_arrow = declarator
            .child_by_field_name("value")
            .is_some_and(|value| value.kind() == "arrow_function");
        if let (true, Some(name)) = (is_arrow, declarator.child_by_field_name("name")) {
            sink.push(EntityType::ArrowFunction, node, name);
        }
    }
}
