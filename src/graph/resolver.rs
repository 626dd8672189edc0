// Import resolution

use std::collections::HashSet;

/// Extensions probed when an import omits one, in resolution order.
pub const RESOLVE_EXTENSIONS: [&str; 6] = ["ts", "tsx", "js", "jsx", "mjs", "cjs"];

/// Resolve an import source string to a file in the repository's file set.
///
/// Non-relative sources are external packages and resolve to `None` - they
/// are not graph nodes. Relative sources resolve against the importing
/// file's directory: the literal path first, then each extension appended,
/// then `<path>/index.<ext>`. An unresolved import is simply dropped from
/// the graph.
pub fn resolve_import(source: &str, from_path: &str, files: &HashSet<String>) -> Option<String> {
    if !source.starts_with("./") && !source.starts_with("../") {
        return None;
    }

    let dir = match from_path.rsplit_once('/') {
        Some((dir, _)) => dir,
        None => "",
    };
    let base = join_relative(dir, source)?;

    if files.contains(&base) {
        return Some(base);
    }

    for ext in RESOLVE_EXTENSIONS {
        let candidate = format!("{base}.{ext}");
        if files.contains(&candidate) {
            return Some(candidate);
        }
    }

    for ext in RESOLVE_EXTENSIONS {
        let candidate = format!("{base}/index.{ext}");
        if files.contains(&candidate) {
            return Some(candidate);
        }
    }

    None
}

/// Lexically join a relative source onto a base directory, collapsing `.`
/// and `..` segments. Escaping above the root is unresolvable.
fn join_relative(base_dir: &str, source: &str) -> Option<String> {
    let mut parts: Vec<&str> = if base_dir.is_empty() {
        Vec::new()
    } else {
        base_dir.split('/').collect()
    };

    for segment in source.split('/') {
        match segment {
            "" | "." => {}
            ".." => match parts.last() {
                // An empty last segment is the leading '/' of an absolute path
                None | Some(&"") => return None,
                Some(_) => {
                    parts.pop();
                }
            },
            other => parts.push(other),
        }
    }

    Some(parts.join("/"))
}
