// Dependency graph construction

pub mod cycles;
pub mod resolver;

use std::collections::{HashMap, HashSet};

use serde_json::json;

use self::resolver::resolve_import;
use crate::store::{
    DependencyLink, DependencyType, FileEntry, Reference, ReferenceType, Symbol, SymbolKey,
};

/// Build dependency links from the full extraction of a repository.
///
/// Import references resolve to file-import links and have their
/// `target_file_path` annotated in place. Call, property-access and
/// type-reference targets are matched against symbol names across the whole
/// repository - not scoped by visible imports - so symbols that merely share
/// a name in unrelated files will be linked. Downstream consumers rely on
/// that looser recall; do not narrow it here.
pub fn build_dependency_graph(
    files: &[FileEntry],
    symbols: &[Symbol],
    references: &mut [Reference],
) -> Vec<DependencyLink> {
    let paths: HashSet<String> = files.iter().map(|f| f.path.clone()).collect();

    let mut by_name: HashMap<&str, Vec<&Symbol>> = HashMap::new();
    let mut by_file: HashMap<&str, Vec<&Symbol>> = HashMap::new();
    for symbol in symbols {
        by_name.entry(symbol.name.as_str()).or_default().push(symbol);
        by_file
            .entry(symbol.file_path.as_str())
            .or_default()
            .push(symbol);
    }

    let mut links = Vec::new();
    let mut seen_file_pairs: HashSet<(String, String)> = HashSet::new();
    let mut seen_symbol_pairs: HashSet<(SymbolKey, SymbolKey)> = HashSet::new();

    for reference in references.iter_mut() {
        match reference.kind {
            ReferenceType::Import => {
                let Some(source) = reference.metadata.get("source").and_then(|v| v.as_str())
                else {
                    continue;
                };
                let Some(target) = resolve_import(source, &reference.file_path, &paths) else {
                    continue;
                };
                reference.target_file_path = Some(target.clone());

                let pair = (reference.file_path.clone(), target.clone());
                if seen_file_pairs.insert(pair) {
                    links.push(DependencyLink {
                        from_file: Some(reference.file_path.clone()),
                        to_file: Some(target),
                        from_symbol: None,
                        to_symbol: None,
                        dependency_type: DependencyType::FileImport,
                        metadata: json!({ "source": source }),
                    });
                }
            }
            ReferenceType::Call | ReferenceType::PropertyAccess | ReferenceType::TypeReference => {
                let Some(targets) = by_name.get(reference.target_name.as_str()) else {
                    continue;
                };
                let Some(from) = enclosing_symbol(
                    by_file.get(reference.file_path.as_str()),
                    reference.line_number,
                ) else {
                    continue;
                };
                let from_key = SymbolKey::of(from);

                for target in targets {
                    let to_key = SymbolKey::of(target);
                    if !seen_symbol_pairs.insert((from_key.clone(), to_key.clone())) {
                        continue;
                    }
                    links.push(DependencyLink {
                        from_file: Some(from.file_path.clone()),
                        to_file: Some(target.file_path.clone()),
                        from_symbol: Some(from_key.clone()),
                        to_symbol: Some(to_key),
                        dependency_type: DependencyType::SymbolUsage,
                        metadata: json!({ "reference_type": reference.kind.as_str() }),
                    });
                }
            }
            // Heritage references stay reference-only; they do not form edges
            ReferenceType::Extends | ReferenceType::Implements => {}
        }
    }

    links
}

/// The innermost symbol in the referring file whose line range contains the
/// reference. References outside any symbol body produce no symbol edge.
fn enclosing_symbol<'a>(
    file_symbols: Option<&Vec<&'a Symbol>>,
    line: u32,
) -> Option<&'a Symbol> {
    file_symbols?
        .iter()
        .filter(|s| s.line_start <= line && line <= s.line_end)
        .max_by_key(|s| s.line_start)
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SymbolKind;

    fn file(path: &str) -> FileEntry {
        FileEntry {
            path: path.to_string(),
            content: String::new(),
            language: "typescript".to_string(),
            metadata: json!({}),
        }
    }

    fn symbol(path: &str, name: &str, line_start: u32, line_end: u32) -> Symbol {
        Symbol {
            file_path: path.to_string(),
            name: name.to_string(),
            kind: SymbolKind::Function,
            line_start,
            line_end,
            column_start: 0,
            column_end: 1,
            signature: None,
            documentation: None,
            is_exported: false,
            is_async: None,
            access_modifier: None,
        }
    }

    fn import_ref(path: &str, source: &str, line: u32) -> Reference {
        Reference {
            file_path: path.to_string(),
            target_name: source.to_string(),
            kind: ReferenceType::Import,
            line_number: line,
            column_number: 0,
            metadata: json!({ "source": source, "import_kind": "side_effect" }),
            target_file_path: None,
        }
    }

    fn call_ref(path: &str, name: &str, line: u32) -> Reference {
        Reference {
            file_path: path.to_string(),
            target_name: name.to_string(),
            kind: ReferenceType::Call,
            line_number: line,
            column_number: 2,
            metadata: json!({ "name": name, "callee_kind": "identifier" }),
            target_file_path: None,
        }
    }

    #[test]
    fn test_import_reference_builds_file_link() {
        let files = vec![file("src/a.ts"), file("src/b.ts")];
        let mut refs = vec![import_ref("src/a.ts", "./b", 1)];

        let links = build_dependency_graph(&files, &[], &mut refs);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].dependency_type, DependencyType::FileImport);
        assert_eq!(links[0].from_file.as_deref(), Some("src/a.ts"));
        assert_eq!(links[0].to_file.as_deref(), Some("src/b.ts"));
        assert_eq!(refs[0].target_file_path.as_deref(), Some("src/b.ts"));
    }

    #[test]
    fn test_external_import_builds_nothing() {
        let files = vec![file("src/a.ts")];
        let mut refs = vec![import_ref("src/a.ts", "lodash", 1)];

        let links = build_dependency_graph(&files, &[], &mut refs);
        assert!(links.is_empty());
        assert_eq!(refs[0].target_file_path, None);
    }

    #[test]
    fn test_call_builds_symbol_link_from_enclosing_symbol() {
        let files = vec![file("src/a.ts"), file("src/b.ts")];
        let symbols = vec![symbol("src/a.ts", "caller", 1, 5), symbol("src/b.ts", "callee", 1, 3)];
        let mut refs = vec![call_ref("src/a.ts", "callee", 2)];

        let links = build_dependency_graph(&files, &symbols, &mut refs);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].dependency_type, DependencyType::SymbolUsage);
        assert_eq!(links[0].from_symbol.as_ref().unwrap().name, "caller");
        assert_eq!(links[0].to_symbol.as_ref().unwrap().name, "callee");
        assert_eq!(links[0].to_file.as_deref(), Some("src/b.ts"));
    }

    #[test]
    fn test_recursive_call_builds_self_link() {
        let files = vec![file("src/f.ts")];
        let symbols = vec![symbol("src/f.ts", "recurse", 1, 4)];
        let mut refs = vec![call_ref("src/f.ts", "recurse", 2)];

        let links = build_dependency_graph(&files, &symbols, &mut refs);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].from_symbol, links[0].to_symbol);
    }

    #[test]
    fn test_call_outside_any_symbol_builds_nothing() {
        let files = vec![file("src/a.ts"), file("src/b.ts")];
        let symbols = vec![symbol("src/b.ts", "callee", 1, 3)];
        // Top-level call on a line not inside any extracted symbol
        let mut refs = vec![call_ref("src/a.ts", "callee", 10)];

        let links = build_dependency_graph(&files, &symbols, &mut refs);
        assert!(links.is_empty());
    }

    #[test]
    fn test_duplicate_links_are_collapsed() {
        let files = vec![file("src/a.ts"), file("src/b.ts")];
        let mut refs = vec![
            import_ref("src/a.ts", "./b", 1),
            import_ref("src/a.ts", "./b", 2),
        ];

        let links = build_dependency_graph(&files, &[], &mut refs);
        assert_eq!(links.len(), 1);
    }

    #[test]
    fn test_innermost_enclosing_symbol_wins() {
        let files = vec![file("src/a.ts")];
        let symbols = vec![
            symbol("src/a.ts", "outer", 1, 10),
            symbol("src/a.ts", "inner", 3, 6),
            symbol("src/a.ts", "target", 20, 22),
        ];
        let mut refs = vec![call_ref("src/a.ts", "target", 4)];

        let links = build_dependency_graph(&files, &symbols, &mut refs);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].from_symbol.as_ref().unwrap().name, "inner");
    }
}
