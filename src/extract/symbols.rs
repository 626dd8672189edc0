// Symbol extraction

use tree_sitter::Node;

use super::{
    doc_comment, field_text, has_async_keyword, is_exported, node_text, start_column, start_line,
    ANONYMOUS,
};
use crate::parser::ParsedFile;
use crate::store::{AccessModifier, Symbol, SymbolKind};

/// Declaration node kinds the extractor understands. Everything else lands
/// in `Ignored`, which makes skipped node shapes visible at the match site
/// instead of falling through silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeclKind {
    Function,
    Class,
    Method,
    ClassField,
    Interface,
    TypeAlias,
    Enum,
    LexicalDecl,
    VarDecl,
    /// Function/class expression forms; a symbol only as a default export
    Expression,
    Ignored,
}

impl DeclKind {
    fn classify(kind: &str) -> Self {
        match kind {
            "function_declaration" | "generator_function_declaration" => DeclKind::Function,
            "class_declaration" => DeclKind::Class,
            "method_definition" => DeclKind::Method,
            "public_field_definition" | "field_definition" => DeclKind::ClassField,
            "interface_declaration" => DeclKind::Interface,
            "type_alias_declaration" => DeclKind::TypeAlias,
            "enum_declaration" => DeclKind::Enum,
            "lexical_declaration" => DeclKind::LexicalDecl,
            "variable_declaration" => DeclKind::VarDecl,
            "function_expression" | "function" | "generator_function" | "arrow_function"
            | "class" => DeclKind::Expression,
            _ => DeclKind::Ignored,
        }
    }
}

/// Extract all named declarations from a parsed file.
///
/// Total over any well-formed tree: unrecognized shapes are skipped, never
/// an error.
pub fn extract_symbols(parsed: &ParsedFile, content: &str, file_path: &str) -> Vec<Symbol> {
    let mut symbols = Vec::new();
    walk(parsed.tree.root_node(), content, file_path, &mut symbols);
    symbols
}

fn walk(node: Node, content: &str, file_path: &str, symbols: &mut Vec<Symbol>) {
    match DeclKind::classify(node.kind()) {
        DeclKind::Function => {
            symbols.push(callable_symbol(node, content, file_path, SymbolKind::Function));
        }
        DeclKind::Class => {
            symbols.push(named_symbol(node, content, file_path, SymbolKind::Class));
        }
        DeclKind::Method => {
            let mut symbol = callable_symbol(node, content, file_path, SymbolKind::Method);
            symbol.access_modifier = access_modifier(node, content);
            symbols.push(symbol);
        }
        DeclKind::ClassField => {
            let mut symbol = named_symbol(node, content, file_path, SymbolKind::Property);
            symbol.access_modifier = access_modifier(node, content);
            symbols.push(symbol);
        }
        DeclKind::Interface => {
            symbols.push(named_symbol(node, content, file_path, SymbolKind::Interface));
        }
        DeclKind::TypeAlias => {
            symbols.push(named_symbol(node, content, file_path, SymbolKind::TypeAlias));
        }
        DeclKind::Enum => {
            symbols.push(named_symbol(node, content, file_path, SymbolKind::Enum));
        }
        DeclKind::LexicalDecl | DeclKind::VarDecl => {
            extract_declarators(node, content, file_path, symbols);
        }
        DeclKind::Expression => {
            // `export default function () {}` and friends; anywhere else an
            // expression form is just a value, not a declaration
            if is_exported(node) {
                if node.kind() == "class" {
                    symbols.push(named_symbol(node, content, file_path, SymbolKind::Class));
                } else {
                    symbols.push(callable_symbol(node, content, file_path, SymbolKind::Function));
                }
            }
        }
        DeclKind::Ignored => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(child, content, file_path, symbols);
    }
}

/// A declaration identified by its `name` field.
fn named_symbol(node: Node, content: &str, file_path: &str, kind: SymbolKind) -> Symbol {
    let name = field_text(node, "name", content).unwrap_or_else(|| ANONYMOUS.to_string());
    base_symbol(node, content, file_path, name, kind)
}

/// A function or method, with a rendered signature and async flag.
fn callable_symbol(node: Node, content: &str, file_path: &str, kind: SymbolKind) -> Symbol {
    let name = field_text(node, "name", content).unwrap_or_else(|| ANONYMOUS.to_string());
    let mut symbol = base_symbol(node, content, file_path, name.clone(), kind);
    symbol.signature = Some(render_signature(&name, node, content));
    symbol.is_async = Some(has_async_keyword(node));
    symbol
}

fn base_symbol(
    node: Node,
    content: &str,
    file_path: &str,
    name: String,
    kind: SymbolKind,
) -> Symbol {
    Symbol {
        file_path: file_path.to_string(),
        name,
        kind,
        line_start: start_line(node),
        line_end: node.end_position().row as u32 + 1,
        column_start: start_column(node),
        column_end: node.end_position().column as u32,
        signature: None,
        documentation: doc_comment(node, content),
        is_exported: is_exported(node),
        is_async: None,
        access_modifier: None,
    }
}

/// `const`/`let`/`var` declarators. A declarator whose initializer is a
/// function form is recorded as a function symbol; otherwise `const`
/// becomes a constant and `let`/`var` a variable.
fn extract_declarators(node: Node, content: &str, file_path: &str, symbols: &mut Vec<Symbol>) {
    let is_const = node
        .child(0)
        .map(|kw| kw.kind() == "const")
        .unwrap_or(false);
    let exported = is_exported(node);

    let mut cursor = node.walk();
    for declarator in node.named_children(&mut cursor) {
        if declarator.kind() != "variable_declarator" {
            continue;
        }
        let Some(name_node) = declarator.child_by_field_name("name") else {
            continue;
        };
        // Destructuring patterns carry no single name; skip them
        if name_node.kind() != "identifier" {
            continue;
        }
        let name = node_text(name_node, content).to_string();

        let value = declarator.child_by_field_name("value");
        let value_kind = value.map(|v| v.kind()).unwrap_or("");
        let is_function = matches!(
            value_kind,
            "arrow_function" | "function_expression" | "function" | "generator_function"
        );

        let mut symbol = base_symbol(declarator, content, file_path, name.clone(), SymbolKind::Variable);
        symbol.documentation = doc_comment(node, content);
        symbol.is_exported = exported;

        if let Some(value) = value.filter(|_| is_function) {
            symbol.kind = SymbolKind::Function;
            symbol.signature = Some(render_signature(&name, value, content));
            symbol.is_async = Some(has_async_keyword(value));
        } else if is_const {
            symbol.kind = SymbolKind::Constant;
        }

        symbols.push(symbol);
    }
}

fn render_signature(name: &str, node: Node, content: &str) -> String {
    let params = node
        .child_by_field_name("parameters")
        .or_else(|| node.child_by_field_name("parameter"))
        .map(|n| node_text(n, content).to_string())
        .unwrap_or_else(|| "()".to_string());
    let ret = field_text(node, "return_type", content).unwrap_or_default();
    format!("{name}{params}{ret}")
}

fn access_modifier(node: Node, content: &str) -> Option<AccessModifier> {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "accessibility_modifier" {
            return AccessModifier::parse(node_text(child, content)).ok();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{ParseOutcome, SourceParser};

    fn parse_and_extract(path: &str, content: &str) -> Vec<Symbol> {
        let parser = SourceParser::new();
        match parser.parse(path, content) {
            ParseOutcome::Parsed(parsed) => extract_symbols(&parsed, content, path),
            _ => panic!("fixture failed to parse"),
        }
    }

    fn find<'a>(symbols: &'a [Symbol], name: &str) -> &'a Symbol {
        symbols
            .iter()
            .find(|s| s.name == name)
            .unwrap_or_else(|| panic!("symbol {name} not extracted"))
    }

    #[test]
    fn test_extracts_function_with_signature() {
        let symbols = parse_and_extract(
            "src/a.ts",
            "export async function fetchUser(id: string): Promise<User> {\n  return load(id);\n}\n",
        );

        let f = find(&symbols, "fetchUser");
        assert_eq!(f.kind, SymbolKind::Function);
        assert_eq!(f.line_start, 1);
        assert_eq!(f.line_end, 3);
        assert!(f.is_exported);
        assert_eq!(f.is_async, Some(true));
        assert_eq!(
            f.signature.as_deref(),
            Some("fetchUser(id: string): Promise<User>")
        );
    }

    #[test]
    fn test_extracts_class_members() {
        let content = "class Account {\n  private balance: number = 0;\n  public deposit(amount: number): void {}\n  withdraw(amount: number) {}\n}\n";
        let symbols = parse_and_extract("src/account.ts", content);

        let class = find(&symbols, "Account");
        assert_eq!(class.kind, SymbolKind::Class);
        assert!(!class.is_exported);

        let field = find(&symbols, "balance");
        assert_eq!(field.kind, SymbolKind::Property);
        assert_eq!(field.access_modifier, Some(AccessModifier::Private));

        let deposit = find(&symbols, "deposit");
        assert_eq!(deposit.kind, SymbolKind::Method);
        assert_eq!(deposit.access_modifier, Some(AccessModifier::Public));

        let withdraw = find(&symbols, "withdraw");
        assert_eq!(withdraw.access_modifier, None);
    }

    #[test]
    fn test_extracts_types_and_enums() {
        let content = "export interface User { id: string }\ntype Ids = string[];\nenum Color { Red, Green }\n";
        let symbols = parse_and_extract("src/types.ts", content);

        assert_eq!(find(&symbols, "User").kind, SymbolKind::Interface);
        assert!(find(&symbols, "User").is_exported);
        assert_eq!(find(&symbols, "Ids").kind, SymbolKind::TypeAlias);
        assert_eq!(find(&symbols, "Color").kind, SymbolKind::Enum);
    }

    #[test]
    fn test_const_arrow_function_is_a_function() {
        let content = "export const handler = async (req: Request) => {};\nconst LIMIT = 10;\nlet counter = 0;\n";
        let symbols = parse_and_extract("src/handlers.ts", content);

        let handler = find(&symbols, "handler");
        assert_eq!(handler.kind, SymbolKind::Function);
        assert_eq!(handler.is_async, Some(true));
        assert!(handler.is_exported);

        assert_eq!(find(&symbols, "LIMIT").kind, SymbolKind::Constant);
        assert_eq!(find(&symbols, "counter").kind, SymbolKind::Variable);
    }

    #[test]
    fn test_doc_comment_is_attached() {
        let content = "/**\n * Greets a user.\n * Politely.\n */\nexport function greet(name: string) {}\n";
        let symbols = parse_and_extract("src/greet.ts", content);

        let greet = find(&symbols, "greet");
        assert_eq!(
            greet.documentation.as_deref(),
            Some("Greets a user.\nPolitely.")
        );
    }

    #[test]
    fn test_anonymous_default_export() {
        let symbols = parse_and_extract("src/main.ts", "export default function () {}\n");
        let f = find(&symbols, ANONYMOUS);
        assert_eq!(f.kind, SymbolKind::Function);
    }

    #[test]
    fn test_unrecognized_shapes_are_skipped() {
        // Statements only - nothing to extract, and nothing panics
        let symbols = parse_and_extract("src/noop.ts", "if (true) { console.log(1); }\n");
        assert!(symbols.is_empty());
    }
}
