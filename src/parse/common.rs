//! Helpers shared by the per-language extractors

use tree_sitter::{Node, Point};

use crate::model::{CodeEntity, EntityType};

/// Collects entities for one file
pub(super) struct EntitySink<'a> {
    source: &'a [u8],
    file_path: &'a str,
    entities: Vec<CodeEntity>,
}

impl<'a> EntitySink<'a> {
    pub(super) fn new(source: &'a [u8], file_path: &'a str) -> Self {
        Self {
            source,
            file_path,
            entities: Vec::new(),
        }
    }

    /// Source text of a node; invalid UTF-8 is replaced rather than rejected
    pub(super) fn text(&self, node: Node) -> String {
        let bytes = self.source.get(node.byte_range()).unwrap_or_default();
        String::from_utf8_lossy(bytes).into_owned()
    }

    /// Emit an entity spanning `range`, named by the text of `name`
    pub(super) fn push(&mut self, entity_type: EntityType, range: Node, name: Node) {
        let text = self.text(name);
        self.push_named(entity_type, range, text, name.start_position());
    }

    /// Emit an entity spanning `range` whose name token starts at `name_at`
    pub(super) fn push_named(&mut self, entity_type: EntityType, range: Node, name: String, name_at: Point) {
        if name.is_empty() {
            return;
        }
        let start_line = range.start_position().row as u32 + 1;
        let end_line = range.end_position().row as u32 + 1;
        let code = self.text(range);
        self.entities.push(CodeEntity::new(
            name,
            entity_type,
            self.file_path,
            start_line,
            end_line.max(start_line),
            name_at.column as u32,
            code,
        )
        .with_name_line(name_at.row as u32 + 1));
    }

    pub(super) fn finish(self) -> Vec<CodeEntity> {
        self.entities
    }
}

pub(super) fn children(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

pub(super) fn named_children(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

/// Emit `node` under the name in its `name` field. Returns whether anything was emitted.
pub(super) fn push_by_name_field(node: Node, sink: &mut EntitySink, entity_type: EntityType) -> bool {
    match node.child_by_field_name("name") {
        Some(name) => {
            sink.push(entity_type, node, name);
            true
        }
        None => false,
    }
}

/// Unwrap a C/C++ declarator down to the node carrying the declared name.
///
/// `int *(*table[4])(void)` and friends nest pointer, array, function and
/// parenthesized declarators arbitrarily deep.
pub(super) fn declarator_name(node: Node) -> Option<Node> {
    match node.kind() {
        "identifier" | "field_identifier" | "type_identifier" | "destructor_name" | "operator_name" => Some(node),
        "qualified_identifier" => node.child_by_field_name("name").and_then(declarator_name),
        "init_declarator" | "pointer_declarator" | "array_declarator" | "function_declarator"
        | "attributed_declarator" => node.child_by_field_name("declarator").and_then(declarator_name),
        // No `declarator` field on these; the inner declarator is the first named child
        "parenthesized_declarator" | "reference_declarator" => {
            named_children(node).into_iter().find_map(declarator_name)
        }
        _ => None,
    }
}

/// Whether a declarator declares a function (a prototype) rather than an object.
/// A parenthesized inner declarator makes it a function pointer, which is an object.
pub(super) fn declares_function(node: Node) -> bool {
    match node.kind() {
        "function_declarator" => node
            .child_by_field_name("declarator")
            .is_some_and(|inner| inner.kind() != "parenthesized_declarator"),
        "pointer_declarator" | "reference_declarator" | "attributed_declarator" => {
            match node.child_by_field_name("declarator") {
                Some(inner) => declares_function(inner),
                None => named_children(node).into_iter().any(declares_function),
            }
        }
        _ => false,
    }
}

/// Whether a declaration sits at file scope. Preprocessor conditionals and
/// `extern "C"` blocks are transparent; with `namespaces`, so is a namespace body.
pub(super) fn is_file_scope(node: Node, namespaces: bool) -> bool {
    let mut parent = node.parent();
    while let Some(p) = parent {
        match p.kind() {
            "translation_unit" => return true,
            "preproc_if" | "preproc_ifdef" | "preproc_else" | "preproc_elif" | "preproc_elifdef"
            | "linkage_specification" => parent = p.parent(),
            "declaration_list" => match p.parent() {
                Some(owner) if owner.kind() == "namespace_definition" => return namespaces,
                Some(owner) if owner.kind() == "linkage_specification" => parent = Some(owner),
                _ => return false,
            },
            _ => return false,
        }
    }
    false
}
