//! Tagged syntax tree for the subset of Python the resolver understands.
//!
//! Anything outside the subset lowers to `Stmt::Other` / `Expr::Unsupported`,
//! so consumers can pattern-match exhaustively without inspecting raw nodes.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub path: PathBuf,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `a = b = value`
    Assign { targets: Vec<Target>, value: Expr },
    ClassDef { name: String, body: Vec<Stmt> },
    FunctionDef {
        name: String,
        params: Vec<Param>,
        body: Vec<Stmt>,
    },
    Return(Option<Expr>),
    /// `from <level dots><module> import names`
    ImportFrom {
        level: usize,
        module: Option<String>,
        names: Vec<ImportAlias>,
    },
    Import(Vec<ImportAlias>),
    Expr(Expr),
    /// Body of an `if`/`try`/`with`/`for`/`while`, flattened.
    Block(Vec<Stmt>),
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Name(String),
    /// `name[key] = ...`
    Subscript { name: String, key: Expr },
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportAlias {
    pub name: String,
    pub asname: Option<String>,
}

impl ImportAlias {
    /// Name bound in the importing module.
    pub fn bound_name(&self) -> &str {
        self.asname.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    /// `None` for `**mapping`.
    pub name: Option<String>,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DictItem {
    Pair(Expr, Expr),
    /// `**mapping`
    Spread(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FStringPart {
    Literal(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
    Name(String),
    Attribute { value: Box<Expr>, attr: String },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        keywords: Vec<Keyword>,
    },
    Dict(Vec<DictItem>),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    /// `left + right`
    Add(Box<Expr>, Box<Expr>),
    FString(Vec<FStringPart>),
    Unsupported,
}

impl Expr {
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Expr::Name(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Expr::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl Module {
    pub fn file(&self) -> &Path {
        &self.path
    }

    /// Module-level statements, descending into flattened blocks but not into
    /// class or function bodies.
    pub fn top_level(&self) -> Vec<&Stmt> {
        let mut out = Vec::new();
        flatten(&self.body, &mut out);
        out
    }

    /// First module-level assignment to `name`.
    pub fn find_assignment(&self, name: &str) -> Option<&Expr> {
        find_assignment_in(&self.body, name)
    }

    pub fn find_class(&self, name: &str) -> Option<&[Stmt]> {
        self.top_level().into_iter().find_map(|stmt| match stmt {
            Stmt::ClassDef { name: n, body } if n == name => Some(body.as_slice()),
            _ => None,
        })
    }

    pub fn find_function(&self, name: &str) -> Option<(&[Param], &[Stmt])> {
        self.top_level().into_iter().find_map(|stmt| match stmt {
            Stmt::FunctionDef {
                name: n,
                params,
                body,
            } if n == name => Some((params.as_slice(), body.as_slice())),
            _ => None,
        })
    }

    /// Names of every top-level class.
    pub fn class_names(&self) -> Vec<String> {
        self.top_level()
            .into_iter()
            .filter_map(|stmt| match stmt {
                Stmt::ClassDef { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }
}

pub(crate) fn flatten<'a>(stmts: &'a [Stmt], out: &mut Vec<&'a Stmt>) {
    for stmt in stmts {
        match stmt {
            Stmt::Block(inner) => flatten(inner, out),
            other => out.push(other),
        }
    }
}

pub fn find_assignment_in<'a>(stmts: &'a [Stmt], name: &str) -> Option<&'a Expr> {
    let mut flat = Vec::new();
    flatten(stmts, &mut flat);
    flat.into_iter().find_map(|stmt| match stmt {
        Stmt::Assign { targets, value }
            if targets
                .iter()
                .any(|t| matches!(t, Target::Name(n) if n == name)) =>
        {
            Some(value)
        }
        _ => None,
    })
}

/// First `return` in a function body, searching nested blocks in order.
pub fn first_return(stmts: &[Stmt]) -> Option<&Expr> {
    let mut flat = Vec::new();
    flatten(stmts, &mut flat);
    flat.into_iter().find_map(|stmt| match stmt {
        Stmt::Return(Some(expr)) => Some(expr),
        _ => None,
    })
}
