// Reference extraction

use serde_json::json;
use tree_sitter::Node;

use super::{node_text, start_column, start_line};
use crate::parser::ParsedFile;
use crate::store::{Reference, ReferenceType};

/// Reference-bearing node kinds. As with declarations, the closed set makes
/// every skipped shape an explicit `Ignored` branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefKind {
    Import,
    Call,
    Member,
    TypeScope,
    ExtendsClause,
    ExtendsTypeClause,
    ImplementsClause,
    Ignored,
}

impl RefKind {
    fn classify(kind: &str) -> Self {
        match kind {
            "import_statement" => RefKind::Import,
            "call_expression" => RefKind::Call,
            "member_expression" => RefKind::Member,
            "type_annotation" | "type_arguments" => RefKind::TypeScope,
            "extends_clause" => RefKind::ExtendsClause,
            "extends_type_clause" => RefKind::ExtendsTypeClause,
            "implements_clause" => RefKind::ImplementsClause,
            _ => RefKind::Ignored,
        }
    }
}

/// Extract all cross-references from a parsed file. Pure and total over any
/// well-formed tree.
pub fn extract_references(parsed: &ParsedFile, content: &str, file_path: &str) -> Vec<Reference> {
    let mut references = Vec::new();
    walk(parsed.tree.root_node(), content, file_path, &mut references);
    references
}

fn walk(node: Node, content: &str, file_path: &str, references: &mut Vec<Reference>) {
    match RefKind::classify(node.kind()) {
        RefKind::Import => {
            extract_import(node, content, file_path, references);
            // Import statements are fully consumed here
            return;
        }
        RefKind::Call => extract_call(node, content, file_path, references),
        RefKind::Member => extract_member(node, content, file_path, references),
        RefKind::TypeScope => {
            collect_type_identifiers(node, content, file_path, references);
            // Type subtrees are fully consumed by the collection above
            return;
        }
        RefKind::ExtendsClause => {
            extract_heritage(node, content, file_path, ReferenceType::Extends, references)
        }
        RefKind::ExtendsTypeClause => {
            extract_heritage(node, content, file_path, ReferenceType::Extends, references)
        }
        RefKind::ImplementsClause => {
            extract_heritage(node, content, file_path, ReferenceType::Implements, references)
        }
        RefKind::Ignored => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(child, content, file_path, references);
    }
}

fn reference(
    file_path: &str,
    target_name: String,
    kind: ReferenceType,
    node: Node,
    metadata: serde_json::Value,
) -> Reference {
    Reference {
        file_path: file_path.to_string(),
        target_name,
        kind,
        line_number: start_line(node),
        column_number: start_column(node),
        metadata,
        target_file_path: None,
    }
}

/// One reference per imported binding. The import source string and the
/// import form (default/named/namespace) travel in metadata, which also
/// feeds the storage dedup key.
fn extract_import(node: Node, content: &str, file_path: &str, references: &mut Vec<Reference>) {
    let mut source_cursor = node.walk();
    let source_node = node.child_by_field_name("source").or_else(|| {
        node.children(&mut source_cursor)
            .find(|child| child.kind() == "string")
    });
    let Some(source_node) = source_node else {
        return;
    };
    let source = string_value(source_node, content);

    let mut cursor = node.walk();
    let clause = node
        .children(&mut cursor)
        .find(|child| child.kind() == "import_clause");

    let Some(clause) = clause else {
        // Side-effect import: `import './polyfill';`
        references.push(reference(
            file_path,
            source.clone(),
            ReferenceType::Import,
            node,
            json!({ "source": source, "import_kind": "side_effect" }),
        ));
        return;
    };

    let mut cursor = clause.walk();
    for binding in clause.named_children(&mut cursor) {
        match binding.kind() {
            "identifier" => {
                let name = node_text(binding, content).to_string();
                references.push(reference(
                    file_path,
                    name.clone(),
                    ReferenceType::Import,
                    binding,
                    json!({ "source": source, "import_kind": "default", "name": name }),
                ));
            }
            "namespace_import" => {
                let mut inner = binding.walk();
                let alias = binding
                    .named_children(&mut inner)
                    .find(|n| n.kind() == "identifier");
                if let Some(alias) = alias {
                    let name = node_text(alias, content).to_string();
                    references.push(reference(
                        file_path,
                        name.clone(),
                        ReferenceType::Import,
                        binding,
                        json!({ "source": source, "import_kind": "namespace", "name": name }),
                    ));
                }
            }
            "named_imports" => {
                let mut inner = binding.walk();
                for spec in binding.named_children(&mut inner) {
                    if spec.kind() != "import_specifier" {
                        continue;
                    }
                    let Some(name_node) = spec.child_by_field_name("name") else {
                        continue;
                    };
                    let name = node_text(name_node, content).to_string();
                    let alias = spec
                        .child_by_field_name("alias")
                        .map(|a| node_text(a, content).to_string());

                    let mut metadata = json!({
                        "source": source,
                        "import_kind": "named",
                        "name": name,
                    });
                    if let Some(alias) = &alias {
                        metadata["alias"] = json!(alias);
                    }

                    references.push(reference(
                        file_path,
                        name,
                        ReferenceType::Import,
                        spec,
                        metadata,
                    ));
                }
            }
            _ => {}
        }
    }
}

fn extract_call(node: Node, content: &str, file_path: &str, references: &mut Vec<Reference>) {
    let Some(callee) = node.child_by_field_name("function") else {
        return;
    };

    match callee.kind() {
        "identifier" => {
            let name = node_text(callee, content).to_string();
            references.push(reference(
                file_path,
                name.clone(),
                ReferenceType::Call,
                node,
                json!({ "name": name, "callee_kind": "identifier" }),
            ));
        }
        "member_expression" => {
            let Some(property) = callee.child_by_field_name("property") else {
                return;
            };
            let name = node_text(property, content).to_string();
            let mut metadata = json!({ "name": name, "callee_kind": "member" });
            if let Some(object) = callee.child_by_field_name("object") {
                if object.kind() == "identifier" {
                    metadata["object"] = json!(node_text(object, content));
                }
            }
            references.push(reference(file_path, name, ReferenceType::Call, node, metadata));
        }
        _ => {}
    }
}

fn extract_member(node: Node, content: &str, file_path: &str, references: &mut Vec<Reference>) {
    // The callee of a method call is already recorded as a call reference
    if let Some(parent) = node.parent() {
        if parent.kind() == "call_expression"
            && parent.child_by_field_name("function") == Some(node)
        {
            return;
        }
    }

    let Some(property) = node.child_by_field_name("property") else {
        return;
    };
    let name = node_text(property, content).to_string();
    let mut metadata = json!({ "name": name });
    if let Some(object) = node.child_by_field_name("object") {
        if object.kind() == "identifier" {
            metadata["object"] = json!(node_text(object, content));
        }
    }

    references.push(reference(
        file_path,
        name,
        ReferenceType::PropertyAccess,
        node,
        metadata,
    ));
}

/// Every `type_identifier` inside a type annotation or type-argument list.
fn collect_type_identifiers(
    node: Node,
    content: &str,
    file_path: &str,
    references: &mut Vec<Reference>,
) {
    if node.kind() == "type_identifier" {
        let name = node_text(node, content).to_string();
        references.push(reference(
            file_path,
            name.clone(),
            ReferenceType::TypeReference,
            node,
            json!({ "name": name }),
        ));
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_type_identifiers(child, content, file_path, references);
    }
}

fn extract_heritage(
    node: Node,
    content: &str,
    file_path: &str,
    kind: ReferenceType,
    references: &mut Vec<Reference>,
) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        let name_node = match child.kind() {
            "identifier" | "type_identifier" => Some(child),
            // `extends Generic<T>` - take the base name, recursion picks up T
            "generic_type" => child.child_by_field_name("name"),
            _ => None,
        };
        if let Some(name_node) = name_node {
            let name = node_text(name_node, content).to_string();
            references.push(reference(
                file_path,
                name.clone(),
                kind,
                child,
                json!({ "name": name }),
            ));
        }
    }
}

fn string_value(node: Node, content: &str) -> String {
    let mut cursor = node.walk();
    if let Some(fragment) = node
        .children(&mut cursor)
        .find(|child| child.kind() == "string_fragment")
    {
        return node_text(fragment, content).to_string();
    }
    node_text(node, content)
        .trim_matches(|c| c == '\'' || c == '"' || c == '`')
        .to_string()
}
