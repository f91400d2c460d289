// ABOUTME: Lowers tree-sitter Python parse trees into the tagged syntax tree.
// ABOUTME: Unrecognized constructs become Stmt::Other / Expr::Unsupported.
use crate::error::{ParseError, Result};
use crate::language::parse_python;
use crate::syntax::{
    DictItem, Expr, FStringPart, ImportAlias, Keyword, Module, Param, Stmt, Target,
};
use std::path::Path;
use tree_sitter::Node;

/// Parse and lower a Python source file held in memory.
pub fn lower_source(path: &Path, source: &str) -> Result<Module> {
    let tree = parse_python(source)?.ok_or_else(|| ParseError::Syntax {
        path: path.to_path_buf(),
    })?;
    let lowerer = Lowerer { source };
    let body = lowerer.block(tree.root_node());
    Ok(Module {
        path: path.to_path_buf(),
        body,
    })
}

/// Read, parse and lower a Python file; invalid UTF-8 is replaced.
pub fn lower_file(path: &Path) -> Result<Module> {
    let bytes = std::fs::read(path)?;
    let source = String::from_utf8_lossy(&bytes);
    lower_source(path, &source)
}

struct Lowerer<'s> {
    source: &'s str,
}

fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .collect()
}

impl<'s> Lowerer<'s> {
    fn text(&self, node: Node) -> &'s str {
        node.utf8_text(self.source.as_bytes()).unwrap_or("")
    }

    /// Statements of a `module` or `block` node.
    fn block(&self, node: Node) -> Vec<Stmt> {
        named_children(node)
            .into_iter()
            .map(|child| self.stmt(child))
            .filter(|stmt| *stmt != Stmt::Other)
            .collect()
    }

    fn field_block(&self, node: Node, field: &str) -> Vec<Stmt> {
        node.child_by_field_name(field)
            .map(|b| self.block(b))
            .unwrap_or_default()
    }

    fn stmt(&self, node: Node) -> Stmt {
        match node.kind() {
            "expression_statement" => self.expression_statement(node),
            "class_definition" => match node.child_by_field_name("name") {
                Some(name) => Stmt::ClassDef {
                    name: self.text(name).to_string(),
                    body: self.field_block(node, "body"),
                },
                None => Stmt::Other,
            },
            "function_definition" => match node.child_by_field_name("name") {
                Some(name) => Stmt::FunctionDef {
                    name: self.text(name).to_string(),
                    params: node
                        .child_by_field_name("parameters")
                        .map(|p| self.params(p))
                        .unwrap_or_default(),
                    body: self.field_block(node, "body"),
                },
                None => Stmt::Other,
            },
            "decorated_definition" => node
                .child_by_field_name("definition")
                .map(|d| self.stmt(d))
                .unwrap_or(Stmt::Other),
            "return_statement" => Stmt::Return(
                named_children(node)
                    .into_iter()
                    .next()
                    .map(|value| self.expr(value)),
            ),
            "import_from_statement" => self.import_from(node),
            "import_statement" => {
                let mut cursor = node.walk();
                let names = node
                    .children_by_field_name("name", &mut cursor)
                    .filter_map(|n| self.alias(n))
                    .collect();
                Stmt::Import(names)
            }
            "if_statement" | "elif_clause" | "else_clause" | "try_statement" | "except_clause"
            | "finally_clause" | "with_statement" | "for_statement" | "while_statement" => {
                let mut stmts = Vec::new();
                for child in named_children(node) {
                    match child.kind() {
                        "block" => stmts.extend(self.block(child)),
                        "elif_clause" | "else_clause" | "except_clause" | "finally_clause" => {
                            if let Stmt::Block(inner) = self.stmt(child) {
                                stmts.extend(inner);
                            }
                        }
                        _ => {}
                    }
                }
                Stmt::Block(stmts)
            }
            _ => Stmt::Other,
        }
    }

    fn expression_statement(&self, node: Node) -> Stmt {
        let Some(inner) = named_children(node).into_iter().next() else {
            return Stmt::Other;
        };
        match inner.kind() {
            "assignment" => {
                let mut targets = Vec::new();
                let mut current = inner;
                loop {
                    if let Some(left) = current.child_by_field_name("left") {
                        targets.push(self.target(left));
                    }
                    match current.child_by_field_name("right") {
                        Some(right) if right.kind() == "assignment" => current = right,
                        Some(right) => {
                            return Stmt::Assign {
                                targets,
                                value: self.expr(right),
                            }
                        }
                        // Bare annotation: `x: int`
                        None => return Stmt::Other,
                    }
                }
            }
            "augmented_assignment" => Stmt::Other,
            _ => Stmt::Expr(self.expr(inner)),
        }
    }

    fn target(&self, node: Node) -> Target {
        match node.kind() {
            "identifier" => Target::Name(self.text(node).to_string()),
            "subscript" => {
                let name = node
                    .child_by_field_name("value")
                    .filter(|v| v.kind() == "identifier")
                    .map(|v| self.text(v).to_string());
                let key = node
                    .child_by_field_name("subscript")
                    .map(|k| self.expr(k));
                match (name, key) {
                    (Some(name), Some(key)) => Target::Subscript { name, key },
                    _ => Target::Other,
                }
            }
            _ => Target::Other,
        }
    }

    fn params(&self, node: Node) -> Vec<Param> {
        named_children(node)
            .into_iter()
            .filter_map(|param| match param.kind() {
                "identifier" => Some(Param {
                    name: self.text(param).to_string(),
                    default: None,
                }),
                "typed_parameter" => named_children(param)
                    .into_iter()
                    .find(|c| c.kind() == "identifier")
                    .map(|id| Param {
                        name: self.text(id).to_string(),
                        default: None,
                    }),
                "default_parameter" | "typed_default_parameter" => {
                    let name = param.child_by_field_name("name")?;
                    Some(Param {
                        name: self.text(name).to_string(),
                        default: param.child_by_field_name("value").map(|v| self.expr(v)),
                    })
                }
                _ => None,
            })
            .collect()
    }

    fn import_from(&self, node: Node) -> Stmt {
        let (level, module) = match node.child_by_field_name("module_name") {
            Some(m) if m.kind() == "relative_import" => {
                let mut level = 0;
                let mut module = None;
                for child in named_children(m) {
                    match child.kind() {
                        "import_prefix" => level = self.text(child).matches('.').count(),
                        "dotted_name" => module = Some(self.text(child).to_string()),
                        _ => {}
                    }
                }
                (level, module)
            }
            Some(m) => (0, Some(self.text(m).to_string())),
            None => (0, None),
        };
        let mut cursor = node.walk();
        let names = node
            .children_by_field_name("name", &mut cursor)
            .filter_map(|n| self.alias(n))
            .collect();
        Stmt::ImportFrom {
            level,
            module,
            names,
        }
    }

    fn alias(&self, node: Node) -> Option<ImportAlias> {
        match node.kind() {
            "dotted_name" | "identifier" => Some(ImportAlias {
                name: self.text(node).to_string(),
                asname: None,
            }),
            "aliased_import" => Some(ImportAlias {
                name: self.text(node.child_by_field_name("name")?).to_string(),
                asname: node
                    .child_by_field_name("alias")
                    .map(|a| self.text(a).to_string()),
            }),
            _ => None,
        }
    }

    fn expr(&self, node: Node) -> Expr {
        match node.kind() {
            "string" => self.string(node),
            "concatenated_string" => {
                let mut parts = Vec::new();
                for child in named_children(node) {
                    match self.string(child) {
                        Expr::Str(s) => parts.push(FStringPart::Literal(s)),
                        Expr::FString(inner) => parts.extend(inner),
                        _ => return Expr::Unsupported,
                    }
                }
                collapse_fstring(parts)
            }
            "integer" => parse_int(self.text(node)).map(Expr::Int).unwrap_or(Expr::Unsupported),
            "float" => self
                .text(node)
                .replace('_', "")
                .parse()
                .map(Expr::Float)
                .unwrap_or(Expr::Unsupported),
            "true" => Expr::Bool(true),
            "false" => Expr::Bool(false),
            "none" => Expr::None,
            "identifier" => Expr::Name(self.text(node).to_string()),
            "attribute" => {
                match (
                    node.child_by_field_name("object"),
                    node.child_by_field_name("attribute"),
                ) {
                    (Some(object), Some(attr)) => Expr::Attribute {
                        value: Box::new(self.expr(object)),
                        attr: self.text(attr).to_string(),
                    },
                    _ => Expr::Unsupported,
                }
            }
            "call" => self.call(node),
            "dictionary" => Expr::Dict(
                named_children(node)
                    .into_iter()
                    .filter_map(|item| match item.kind() {
                        "pair" => Some(DictItem::Pair(
                            item.child_by_field_name("key")
                                .map(|k| self.expr(k))
                                .unwrap_or(Expr::Unsupported),
                            item.child_by_field_name("value")
                                .map(|v| self.expr(v))
                                .unwrap_or(Expr::Unsupported),
                        )),
                        "dictionary_splat" => named_children(item)
                            .into_iter()
                            .next()
                            .map(|inner| DictItem::Spread(self.expr(inner))),
                        _ => None,
                    })
                    .collect(),
            ),
            "list" | "set" => Expr::List(self.exprs(node)),
            "tuple" | "expression_list" => Expr::Tuple(self.exprs(node)),
            "parenthesized_expression" => named_children(node)
                .into_iter()
                .next()
                .map(|inner| self.expr(inner))
                .unwrap_or(Expr::Unsupported),
            "binary_operator" => {
                let op = node
                    .child_by_field_name("operator")
                    .map(|o| self.text(o))
                    .unwrap_or("");
                match (
                    op,
                    node.child_by_field_name("left"),
                    node.child_by_field_name("right"),
                ) {
                    ("+", Some(left), Some(right)) => {
                        Expr::Add(Box::new(self.expr(left)), Box::new(self.expr(right)))
                    }
                    _ => Expr::Unsupported,
                }
            }
            _ => Expr::Unsupported,
        }
    }

    fn exprs(&self, node: Node) -> Vec<Expr> {
        named_children(node)
            .into_iter()
            .map(|child| self.expr(child))
            .collect()
    }

    fn call(&self, node: Node) -> Expr {
        let Some(func) = node.child_by_field_name("function") else {
            return Expr::Unsupported;
        };
        let mut args = Vec::new();
        let mut keywords = Vec::new();
        if let Some(arguments) = node
            .child_by_field_name("arguments")
            .filter(|a| a.kind() == "argument_list")
        {
            for arg in named_children(arguments) {
                match arg.kind() {
                    "keyword_argument" => {
                        if let (Some(name), Some(value)) = (
                            arg.child_by_field_name("name"),
                            arg.child_by_field_name("value"),
                        ) {
                            keywords.push(Keyword {
                                name: Some(self.text(name).to_string()),
                                value: self.expr(value),
                            });
                        }
                    }
                    "dictionary_splat" => {
                        if let Some(inner) = named_children(arg).into_iter().next() {
                            keywords.push(Keyword {
                                name: None,
                                value: self.expr(inner),
                            });
                        }
                    }
                    "list_splat" => args.push(Expr::Unsupported),
                    _ => args.push(self.expr(arg)),
                }
            }
        }
        Expr::Call {
            func: Box::new(self.expr(func)),
            args,
            keywords,
        }
    }

    fn string(&self, node: Node) -> Expr {
        if node.kind() != "string" {
            return Expr::Unsupported;
        }
        let mut prefix = "";
        let mut parts = Vec::new();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "string_start" => {
                    let start = self.text(child);
                    prefix = start.trim_end_matches(['"', '\'']);
                }
                "string_content" => {
                    let raw = self.text(child);
                    let lower = prefix.to_ascii_lowercase();
                    let mut text = if lower.contains('r') {
                        raw.to_string()
                    } else {
                        unescape(raw)
                    };
                    if lower.contains('f') {
                        text = text.replace("{{", "{").replace("}}", "}");
                    }
                    parts.push(FStringPart::Literal(text));
                }
                "escape_sequence" => parts.push(FStringPart::Literal(unescape(self.text(child)))),
                "escape_interpolation" => {
                    let text = self.text(child);
                    parts.push(FStringPart::Literal(text.chars().take(1).collect()));
                }
                "interpolation" => {
                    let expr = child
                        .child_by_field_name("expression")
                        .map(|e| self.expr(e))
                        .unwrap_or(Expr::Unsupported);
                    parts.push(FStringPart::Expr(expr));
                }
                _ => {}
            }
        }
        collapse_fstring(parts)
    }
}

/// Literal-only part lists become a plain string.
fn collapse_fstring(parts: Vec<FStringPart>) -> Expr {
    if parts.iter().all(|p| matches!(p, FStringPart::Literal(_))) {
        let joined = parts
            .into_iter()
            .map(|p| match p {
                FStringPart::Literal(s) => s,
                FStringPart::Expr(_) => String::new(),
            })
            .collect();
        Expr::Str(joined)
    } else {
        Expr::FString(parts)
    }
}

fn parse_int(text: &str) -> Option<i64> {
    let cleaned = text.replace('_', "").to_ascii_lowercase();
    let (digits, radix) = if let Some(hex) = cleaned.strip_prefix("0x") {
        (hex.to_string(), 16)
    } else if let Some(oct) = cleaned.strip_prefix("0o") {
        (oct.to_string(), 8)
    } else if let Some(bin) = cleaned.strip_prefix("0b") {
        (bin.to_string(), 2)
    } else {
        (cleaned, 10)
    };
    i64::from_str_radix(&digits, radix).ok()
}

/// Python escape sequences; unknown escapes are kept verbatim.
fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('\n') => {}
            Some('x') => push_code(&mut out, &mut chars, 2, "\\x"),
            Some('u') => push_code(&mut out, &mut chars, 4, "\\u"),
            Some('U') => push_code(&mut out, &mut chars, 8, "\\U"),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

fn push_code(
    out: &mut String,
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    width: usize,
    marker: &str,
) {
    let digits: String = (0..width).filter_map(|_| chars.next()).collect();
    match u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32) {
        Some(c) if digits.len() == width => out.push(c),
        _ => {
            out.push_str(marker);
            out.push_str(&digits);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lower(src: &str) -> Module {
        lower_source(Path::new("test.py"), src).unwrap()
    }

    #[test]
    fn lowers_assignments_and_classes() {
        let module = lower("A = B = 'x'\nclass Foo(Base):\n    NAME = \"foo\"\n");
        assert_eq!(
            module.body[0],
            Stmt::Assign {
                targets: vec![Target::Name("A".into()), Target::Name("B".into())],
                value: Expr::Str("x".into()),
            }
        );
        assert_eq!(module.class_names(), vec!["Foo"]);
        assert_eq!(
            module.find_class("Foo").unwrap()[0],
            Stmt::Assign {
                targets: vec![Target::Name("NAME".into())],
                value: Expr::Str("foo".into()),
            }
        );
    }

    #[test]
    fn lowers_relative_imports() {
        let module = lower("from ..pkg.nodes import Foo as Bar, Baz\nfrom . import utils\n");
        assert_eq!(
            module.body[0],
            Stmt::ImportFrom {
                level: 2,
                module: Some("pkg.nodes".into()),
                names: vec![
                    ImportAlias {
                        name: "Foo".into(),
                        asname: Some("Bar".into())
                    },
                    ImportAlias {
                        name: "Baz".into(),
                        asname: None
                    },
                ],
            }
        );
        assert!(matches!(
            &module.body[1],
            Stmt::ImportFrom { level: 1, module: None, names } if names[0].name == "utils"
        ));
    }

    #[test]
    fn lowers_dicts_with_spreads_and_calls() {
        let module = lower("M = {'A': Foo, **OTHER, get('x', y=2): 3}\n");
        let Some(Expr::Dict(items)) = module.find_assignment("M") else {
            panic!("expected dict");
        };
        assert_eq!(items.len(), 3);
        assert_eq!(
            items[0],
            DictItem::Pair(Expr::Str("A".into()), Expr::Name("Foo".into()))
        );
        assert_eq!(items[1], DictItem::Spread(Expr::Name("OTHER".into())));
        let DictItem::Pair(Expr::Call { args, keywords, .. }, Expr::Int(3)) = &items[2] else {
            panic!("expected call key");
        };
        assert_eq!(args, &vec![Expr::Str("x".into())]);
        assert_eq!(keywords[0].name.as_deref(), Some("y"));
    }

    #[test]
    fn lowers_fstrings_and_escapes() {
        let module = lower("A = f\"{name} ({NS})\"\nB = 'a\\tb'\nC = 'x' 'y'\nD = f'{{literal}}'\n");
        assert_eq!(
            module.find_assignment("A"),
            Some(&Expr::FString(vec![
                FStringPart::Expr(Expr::Name("name".into())),
                FStringPart::Literal(" (".into()),
                FStringPart::Expr(Expr::Name("NS".into())),
                FStringPart::Literal(")".into()),
            ]))
        );
        assert_eq!(module.find_assignment("B"), Some(&Expr::Str("a\tb".into())));
        assert_eq!(module.find_assignment("C"), Some(&Expr::Str("xy".into())));
        assert_eq!(module.find_assignment("D"), Some(&Expr::Str("{literal}".into())));
    }

    #[test]
    fn lowers_functions_with_defaults() {
        let module = lower(
            "@decorator\ndef get_name(name, suffix: str = 'x'):\n    if name:\n        return name + suffix\n    return None\n",
        );
        let (params, body) = module.find_function("get_name").unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params[1].default, Some(Expr::Str("x".into())));
        assert_eq!(
            crate::syntax::first_return(body),
            Some(&Expr::Add(
                Box::new(Expr::Name("name".into())),
                Box::new(Expr::Name("suffix".into()))
            ))
        );
    }

    #[test]
    fn assignments_inside_try_blocks_are_top_level() {
        let module = lower("try:\n    X = 'a'\nexcept ImportError:\n    X = 'b'\n");
        assert_eq!(module.find_assignment("X"), Some(&Expr::Str("a".into())));
    }

    #[test]
    fn subscript_targets() {
        let module = lower("M['Key'] = Foo\n");
        assert_eq!(
            module.body[0],
            Stmt::Assign {
                targets: vec![Target::Subscript {
                    name: "M".into(),
                    key: Expr::Str("Key".into())
                }],
                value: Expr::Name("Foo".into()),
            }
        );
    }
}
