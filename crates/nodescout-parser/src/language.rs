// ABOUTME: Builds tree-sitter parsers for the Python sources found in node packages.
// ABOUTME: One parser per thread; tree-sitter parsers are not shareable.
use crate::error::{ParseError, Result};
use std::cell::RefCell;
use tree_sitter::{Parser, Tree};

pub const PYTHON_EXTENSIONS: [&str; 2] = ["py", "pyi"];

pub fn python_language() -> tree_sitter::Language {
    tree_sitter_python::LANGUAGE.into()
}

pub fn create_parser() -> Result<Parser> {
    let mut parser = Parser::new();
    parser
        .set_language(&python_language())
        .map_err(|e| ParseError::Grammar(e.to_string()))?;
    Ok(parser)
}

thread_local! {
    static PARSER: RefCell<Option<Parser>> = const { RefCell::new(None) };
}

/// Parse Python source with this thread's cached parser.
pub fn parse_python(source: &str) -> Result<Option<Tree>> {
    PARSER.with(|cell| {
        let mut slot = cell.borrow_mut();
        if slot.is_none() {
            *slot = Some(create_parser()?);
        }
        match slot.as_mut() {
            Some(parser) => Ok(parser.parse(source, None)),
            None => Ok(None),
        }
    })
}

pub fn is_python_file(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| PYTHON_EXTENSIONS.contains(&e))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree_sitter::{LANGUAGE_VERSION, MIN_COMPATIBLE_LANGUAGE_VERSION};

    #[test]
    fn python_grammar_uses_supported_version() {
        let version = python_language().abi_version();
        assert!(
            (MIN_COMPATIBLE_LANGUAGE_VERSION..=LANGUAGE_VERSION).contains(&version),
            "Python grammar uses incompatible Tree-sitter version {} (supported {}..={})",
            version,
            MIN_COMPATIBLE_LANGUAGE_VERSION,
            LANGUAGE_VERSION
        );
    }

    #[test]
    fn parses_on_repeated_calls() {
        let first = parse_python("x = 1\n").unwrap().unwrap();
        let second = parse_python("class A:\n    pass\n").unwrap().unwrap();
        assert_eq!(first.root_node().kind(), "module");
        assert_eq!(second.root_node().kind(), "module");
    }
}
