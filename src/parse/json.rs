//! JSON extraction: the keys of the top-level object, without descending into values

use tree_sitter::Node;

use super::common::{children, EntitySink};
use crate::model::EntityType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JsonNode {
    Document,
    Object,
    Pair,
    Other,
}

impl JsonNode {
    fn of(node: Node) -> Self {
        match node.kind() {
            "document" => JsonNode::Document,
            "object" => JsonNode::Object,
            "pair" => JsonNode::Pair,
            _ => JsonNode::Other,
        }
    }
}

pub(super) fn extract(root: Node, sink: &mut EntitySink) {
    if JsonNode::of(root) != JsonNode::Document {
        return;
    }
    for value in children(root) {
        if JsonNode::of(value) == JsonNode::Object {
            object_keys(value, sink);
        }
    }
}

fn object_keys(object: Node, sink: &mut EntitySink) {
    for pair in children(object) {
        if JsonNode::of(pair) != JsonNode::Pair {
            continue;
        }
        if let Some(key) = pair.child_by_field_name("key") {
            let name = unquote(&sink.text(key)).to_string();
            sink.push_named(EntityType::JsonKey, pair, name, key.start_position());
        }
    }
}

/// Drop the delimiting quotes only; escaped quotes inside the key stay
fn unquote(raw: &str) -> &str {
    let inner = raw.strip_prefix('"').unwrap_or(raw);
    inner.strip_suffix('"').unwrap_or(inner)
}
