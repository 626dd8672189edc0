// Symbol and reference extraction from parsed trees

pub mod references;
pub mod symbols;

use tree_sitter::Node;

/// Sentinel name for anonymous entities (default-exported expressions etc.)
pub const ANONYMOUS: &str = "<anonymous>";

pub(crate) fn node_text<'a>(node: Node, content: &'a str) -> &'a str {
    &content[node.byte_range()]
}

pub(crate) fn field_text(node: Node, field: &str, content: &str) -> Option<String> {
    node.child_by_field_name(field)
        .map(|n| node_text(n, content).to_string())
}

/// 1-indexed line for a node start
pub(crate) fn start_line(node: Node) -> u32 {
    node.start_position().row as u32 + 1
}

/// 0-indexed column for a node start
pub(crate) fn start_column(node: Node) -> u32 {
    node.start_position().column as u32
}

/// True when the node has an `async` keyword child.
pub(crate) fn has_async_keyword(node: Node) -> bool {
    let mut cursor = node.walk();
    let has_async = node.children(&mut cursor).any(|child| child.kind() == "async");
    has_async
}

/// The declaration node as seen by its siblings: the export statement when
/// the declaration is wrapped in one, otherwise the node itself.
pub(crate) fn outermost(node: Node) -> Node {
    match node.parent() {
        Some(parent) if parent.kind() == "export_statement" => parent,
        _ => node,
    }
}

pub(crate) fn is_exported(node: Node) -> bool {
    matches!(node.parent(), Some(parent) if parent.kind() == "export_statement")
}

/// Documentation from an immediately preceding `/** ... */` comment.
pub(crate) fn doc_comment(node: Node, content: &str) -> Option<String> {
    let prev = outermost(node).prev_sibling()?;
    if prev.kind() != "comment" {
        return None;
    }
    let text = node_text(prev, content);
    if !text.starts_with("/**") {
        return None;
    }

    let body = text
        .trim_start_matches("/**")
        .trim_end_matches("*/")
        .lines()
        .map(|line| line.trim().trim_start_matches('*').trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if body.is_empty() {
        None
    } else {
        Some(body)
    }
}
