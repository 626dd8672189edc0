// Source parsing via tree-sitter

use tree_sitter::{Node, Parser as TreeParser, Tree};

/// File extensions eligible for parsing. Everything else is reported as
/// unsupported rather than attempted.
pub const SUPPORTED_EXTENSIONS: [&str; 6] = ["ts", "tsx", "js", "jsx", "mjs", "cjs"];

/// Source languages the engine parses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    TypeScript,
    Tsx,
    JavaScript,
}

impl Language {
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = path.rsplit('.').next()?;
        match ext {
            "ts" => Some(Language::TypeScript),
            "tsx" => Some(Language::Tsx),
            "js" | "jsx" | "mjs" | "cjs" => Some(Language::JavaScript),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::TypeScript => "typescript",
            Language::Tsx => "tsx",
            Language::JavaScript => "javascript",
        }
    }

    fn grammar(&self) -> tree_sitter::Language {
        match self {
            Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Language::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Language::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
        }
    }
}

/// A structured per-file parse error. Parse errors never abort a run; the
/// pipeline records them and keeps going.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub file_path: String,
    /// 1-indexed line of the first syntax error, when known
    pub line: Option<u32>,
    /// 0-indexed column of the first syntax error, when known
    pub column: Option<u32>,
}

/// A successfully parsed file
pub struct ParsedFile {
    pub tree: Tree,
    pub language: Language,
}

/// Discriminated parse outcome
pub enum ParseOutcome {
    Parsed(ParsedFile),
    Failed(ParseError),
    Unsupported,
}

/// Stateless source parser. A fresh tree-sitter parser is configured per
/// call, so instances are freely shareable across threads.
#[derive(Clone)]
pub struct SourceParser;

impl SourceParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, file_path: &str, content: &str) -> ParseOutcome {
        let Some(language) = Language::from_path(file_path) else {
            return ParseOutcome::Unsupported;
        };

        let mut parser = TreeParser::new();
        if let Err(e) = parser.set_language(&language.grammar()) {
            return ParseOutcome::Failed(ParseError {
                message: format!("Failed to load {} grammar: {}", language.as_str(), e),
                file_path: file_path.to_string(),
                line: None,
                column: None,
            });
        }

        let Some(tree) = parser.parse(content, None) else {
            return ParseOutcome::Failed(ParseError {
                message: "Parser produced no syntax tree".to_string(),
                file_path: file_path.to_string(),
                line: None,
                column: None,
            });
        };

        if tree.root_node().has_error() {
            let error = first_error_node(tree.root_node());
            let (line, column) = error
                .map(|node| {
                    let pos = node.start_position();
                    (Some(pos.row as u32 + 1), Some(pos.column as u32))
                })
                .unwrap_or((None, None));

            return ParseOutcome::Failed(ParseError {
                message: match (line, column) {
                    (Some(l), Some(c)) => format!("Syntax error at {}:{}", l, c),
                    _ => "Syntax error".to_string(),
                },
                file_path: file_path.to_string(),
                line,
                column,
            });
        }

        ParseOutcome::Parsed(ParsedFile { tree, language })
    }
}

impl Default for SourceParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Locate the first ERROR or missing node in document order.
fn first_error_node(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    for child in children {
        if let Some(found) = first_error_node(child) {
            return Some(found);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_from_path() {
        assert_eq!(Language::from_path("src/a.ts"), Some(Language::TypeScript));
        assert_eq!(Language::from_path("src/App.tsx"), Some(Language::Tsx));
        assert_eq!(Language::from_path("lib/util.mjs"), Some(Language::JavaScript));
        assert_eq!(Language::from_path("README.md"), None);
        assert_eq!(Language::from_path("Makefile"), None);
    }

    #[test]
    fn test_parse_valid_typescript() {
        let parser = SourceParser::new();
        let outcome = parser.parse("src/a.ts", "export function greet(name: string) {}");
        match outcome {
            ParseOutcome::Parsed(parsed) => {
                assert_eq!(parsed.language, Language::TypeScript);
                assert!(!parsed.tree.root_node().has_error());
            }
            _ => panic!("expected a parsed tree"),
        }
    }

    #[test]
    fn test_parse_error_is_structured() {
        let parser = SourceParser::new();
        let outcome = parser.parse("src/broken.ts", "function ( {{{");
        match outcome {
            ParseOutcome::Failed(err) => {
                assert_eq!(err.file_path, "src/broken.ts");
                assert!(err.line.is_some());
                assert!(err.message.contains("Syntax error"));
            }
            _ => panic!("expected a parse failure"),
        }
    }

    #[test]
    fn test_unsupported_extension() {
        let parser = SourceParser::new();
        assert!(matches!(
            parser.parse("notes.txt", "hello"),
            ParseOutcome::Unsupported
        ));
    }
}
