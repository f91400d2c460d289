//! Non-executing evaluator for load-time Python values.
//!
//! Resolves literal constants, module-level names (following relative
//! imports), class attributes, single-level function calls with bound
//! arguments, `str.format`, f-strings and `+` concatenation. Anything else is
//! unresolved (`None`), never an error. Every name, attribute and call step is
//! guarded by a per-request [`ResolutionStack`] so self-referential definitions
//! terminate.

use crate::lower::lower_file;
use crate::syntax::{first_return, DictItem, Expr, FStringPart, Module, Param, Stmt, Target};
use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

/// A statically recovered value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
    List(Vec<Value>),
    Dict(Vec<(Value, Value)>),
    /// A class, by name.
    ClassRef(String),
    /// A module reached through `from . import module`.
    ModuleRef(PathBuf),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Text a mapping key or class value stands for.
    pub fn as_identifier(&self) -> Option<String> {
        match self {
            Value::Str(s) | Value::ClassRef(s) => Some(s.clone()),
            _ => None,
        }
    }

    fn repr(&self) -> String {
        match self {
            Value::Str(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            other => other.to_string(),
        }
    }
}

/// Python `str()` rendering.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) | Value::ClassRef(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) if x.is_finite() && x.fract() == 0.0 => write!(f, "{:.1}", x),
            Value::Float(x) => write!(f, "{}", x),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::None => f.write_str("None"),
            Value::List(items) => {
                let inner: Vec<String> = items.iter().map(Value::repr).collect();
                write!(f, "[{}]", inner.join(", "))
            }
            Value::Dict(items) => {
                let inner: Vec<String> = items
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.repr(), v.repr()))
                    .collect();
                write!(f, "{{{}}}", inner.join(", "))
            }
            Value::ModuleRef(path) => write!(f, "<module {}>", path.display()),
        }
    }
}

/// `(file, symbol)` pairs currently being resolved in one call chain.
#[derive(Debug, Default)]
pub struct ResolutionStack {
    frames: Vec<(PathBuf, String)>,
    entered: usize,
}

impl ResolutionStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// False when the pair is already in progress.
    fn enter(&mut self, file: &Path, symbol: &str) -> bool {
        if self
            .frames
            .iter()
            .any(|(f, s)| f.as_path() == file && s == symbol)
        {
            return false;
        }
        self.frames.push((file.to_path_buf(), symbol.to_string()));
        self.entered += 1;
        true
    }

    fn leave(&mut self) {
        self.frames.pop();
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Guarded steps entered so far.
    pub fn entered(&self) -> usize {
        self.entered
    }
}

/// Where an imported name comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportTarget {
    Symbol { file: PathBuf, name: String },
    Module(PathBuf),
}

/// Evaluation context: the file being read plus bound call arguments.
#[derive(Debug, Clone)]
struct Scope {
    file: PathBuf,
    locals: HashMap<String, Value>,
    class: Option<String>,
}

impl Scope {
    fn module(file: &Path) -> Self {
        Self {
            file: file.to_path_buf(),
            locals: HashMap::new(),
            class: None,
        }
    }
}

/// Shared evaluator; caches are safe to use from many scanning threads.
#[derive(Default)]
pub struct SymbolicResolver {
    modules: DashMap<PathBuf, Option<Arc<Module>>>,
    imports: DashMap<PathBuf, Arc<HashMap<String, ImportTarget>>>,
    constants: DashMap<(PathBuf, String), Value>,
}

impl SymbolicResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear_caches(&self) {
        self.modules.clear();
        self.imports.clear();
        self.constants.clear();
        debug!("Symbolic resolver caches cleared");
    }

    pub fn cached_modules(&self) -> usize {
        self.modules.len()
    }

    /// Parsed module, memoized; unreadable files are remembered as missing.
    pub fn module(&self, file: &Path) -> Option<Arc<Module>> {
        if let Some(entry) = self.modules.get(file) {
            return entry.clone();
        }
        let parsed = match lower_file(file) {
            Ok(module) => Some(Arc::new(module)),
            Err(e) => {
                debug!("Cannot load {}: {}", file.display(), e);
                None
            }
        };
        self.modules.insert(file.to_path_buf(), parsed.clone());
        parsed
    }

    /// Relative imports of `file`, keyed by bound name.
    pub fn import_map(&self, file: &Path) -> Arc<HashMap<String, ImportTarget>> {
        if let Some(map) = self.imports.get(file) {
            return map.clone();
        }
        let map = Arc::new(
            self.module(file)
                .map(|m| build_import_map(&m))
                .unwrap_or_default(),
        );
        self.imports.insert(file.to_path_buf(), map.clone());
        map
    }

    /// Value of a module-level name in `file`.
    pub fn resolve_name(&self, file: &Path, name: &str) -> Option<Value> {
        let mut stack = ResolutionStack::new();
        self.name_in(&Scope::module(file), name, &mut stack)
    }

    /// Value of an expression read from `file`.
    pub fn resolve_expr(&self, file: &Path, expr: &Expr) -> Option<Value> {
        let mut stack = ResolutionStack::new();
        self.eval(&Scope::module(file), expr, &mut stack)
    }

    /// Like [`resolve_expr`](Self::resolve_expr) with a caller-owned stack.
    pub fn resolve_expr_with(
        &self,
        file: &Path,
        expr: &Expr,
        stack: &mut ResolutionStack,
    ) -> Option<Value> {
        self.eval(&Scope::module(file), expr, stack)
    }

    /// Entries of the mapping bound to `variable` in `file`, as
    /// `(display name, class name)` pairs in definition order. Folds literal
    /// pairs, `**spread` entries, `.update(...)` calls and subscript
    /// assignments; pairs that cannot be resolved are skipped.
    pub fn resolve_mapping(&self, file: &Path, variable: &str) -> Vec<(String, String)> {
        let mut stack = ResolutionStack::new();
        let mut out = Vec::new();
        self.mapping_in(file, variable, &mut stack, &mut out);
        out
    }

    fn mapping_in(
        &self,
        file: &Path,
        variable: &str,
        stack: &mut ResolutionStack,
        out: &mut Vec<(String, String)>,
    ) {
        let symbol = format!("{}{{}}", variable);
        if !stack.enter(file, &symbol) {
            debug!("Mapping cycle at {}:{}", file.display(), variable);
            return;
        }
        let mut local = Vec::new();
        self.mapping_body(file, variable, stack, &mut local);
        stack.leave();
        out.extend(local);
    }

    fn mapping_body(
        &self,
        file: &Path,
        variable: &str,
        stack: &mut ResolutionStack,
        out: &mut Vec<(String, String)>,
    ) {
        let Some(module) = self.module(file) else {
            return;
        };
        let scope = Scope::module(file);
        let mut assigned = false;

        for stmt in module.top_level() {
            match stmt {
                Stmt::Assign { targets, value } => {
                    for target in targets {
                        match target {
                            Target::Name(n) if n == variable => {
                                // Rebinding replaces earlier contents.
                                out.clear();
                                assigned = true;
                                self.mapping_expr(&scope, value, stack, out);
                            }
                            Target::Subscript { name, key } if name == variable => {
                                self.mapping_pair(&scope, key, value, stack, out);
                            }
                            _ => {}
                        }
                    }
                }
                Stmt::Expr(Expr::Call {
                    func,
                    args,
                    keywords,
                }) => {
                    let Expr::Attribute { value, attr } = func.as_ref() else {
                        continue;
                    };
                    if attr != "update" || value.as_name() != Some(variable) {
                        continue;
                    }
                    for arg in args {
                        self.mapping_expr(&scope, arg, stack, out);
                    }
                    for kw in keywords {
                        match &kw.name {
                            Some(key) => {
                                if let Some(class) = self.class_name(&scope, &kw.value, stack) {
                                    out.push((key.clone(), class));
                                }
                            }
                            None => self.mapping_expr(&scope, &kw.value, stack, out),
                        }
                    }
                }
                _ => {}
            }
        }

        if !assigned {
            if let Some(ImportTarget::Symbol { file: source, name }) =
                self.import_map(file).get(variable)
            {
                let mut imported = Vec::new();
                self.mapping_in(source, name, stack, &mut imported);
                // Imported contents come first; local mutations follow.
                imported.append(out);
                *out = imported;
            }
        }
    }

    /// Entries contributed by an expression that should evaluate to a mapping.
    fn mapping_expr(
        &self,
        scope: &Scope,
        expr: &Expr,
        stack: &mut ResolutionStack,
        out: &mut Vec<(String, String)>,
    ) {
        match expr {
            Expr::Dict(items) => {
                for item in items {
                    match item {
                        DictItem::Pair(key, value) => {
                            self.mapping_pair(scope, key, value, stack, out)
                        }
                        DictItem::Spread(inner) => self.mapping_expr(scope, inner, stack, out),
                    }
                }
            }
            Expr::Name(name) => {
                let module_has = self
                    .module(&scope.file)
                    .map(|m| m.find_assignment(name).is_some())
                    .unwrap_or(false);
                if module_has {
                    self.mapping_in(&scope.file, name, stack, out);
                } else if let Some(ImportTarget::Symbol { file, name }) =
                    self.import_map(&scope.file).get(name.as_str())
                {
                    self.mapping_in(file, name, stack, out);
                }
            }
            // `module.MAPPING`
            Expr::Attribute { value, attr } => {
                if let Some(Value::ModuleRef(file)) = self.eval(scope, value, stack) {
                    self.mapping_in(&file, attr, stack, out);
                }
            }
            other => {
                if let Some(Value::Dict(pairs)) = self.eval(scope, other, stack) {
                    for (k, v) in pairs {
                        if let (Some(k), Some(v)) = (k.as_identifier(), v.as_identifier()) {
                            out.push((k, v));
                        }
                    }
                }
            }
        }
    }

    fn mapping_pair(
        &self,
        scope: &Scope,
        key: &Expr,
        value: &Expr,
        stack: &mut ResolutionStack,
        out: &mut Vec<(String, String)>,
    ) {
        let key = match key {
            Expr::Str(s) => Some(s.clone()),
            other => self.eval(scope, other, stack).and_then(|v| v.as_identifier()),
        };
        let Some(key) = key else {
            trace!("Unresolved mapping key in {}", scope.file.display());
            return;
        };
        match self.class_name(scope, value, stack) {
            Some(class) => out.push((key, class)),
            None => trace!("Unresolved mapping value for {}", key),
        }
    }

    /// Class named by a mapping value: a bare name is taken as the class.
    fn class_name(&self, scope: &Scope, value: &Expr, stack: &mut ResolutionStack) -> Option<String> {
        match value {
            Expr::Name(name) => Some(name.clone()),
            Expr::Attribute { attr, .. } => Some(attr.clone()),
            other => self.eval(scope, other, stack)?.as_identifier(),
        }
    }

    fn eval(&self, scope: &Scope, expr: &Expr, stack: &mut ResolutionStack) -> Option<Value> {
        match expr {
            Expr::Str(s) => Some(Value::Str(s.clone())),
            Expr::Int(i) => Some(Value::Int(*i)),
            Expr::Float(x) => Some(Value::Float(*x)),
            Expr::Bool(b) => Some(Value::Bool(*b)),
            Expr::None => Some(Value::None),
            Expr::Name(name) => self.name_in(scope, name, stack),
            Expr::Attribute { value, attr } => self.attribute(scope, value, attr, stack),
            Expr::Call {
                func,
                args,
                keywords,
            } => self.call(scope, func, args, keywords, stack),
            Expr::Dict(items) => {
                let mut pairs = Vec::new();
                for item in items {
                    match item {
                        DictItem::Pair(k, v) => {
                            pairs.push((self.eval(scope, k, stack)?, self.eval(scope, v, stack)?))
                        }
                        DictItem::Spread(inner) => match self.eval(scope, inner, stack)? {
                            Value::Dict(more) => pairs.extend(more),
                            _ => return None,
                        },
                    }
                }
                Some(Value::Dict(pairs))
            }
            Expr::List(items) | Expr::Tuple(items) => items
                .iter()
                .map(|item| self.eval(scope, item, stack))
                .collect::<Option<Vec<_>>>()
                .map(Value::List),
            Expr::Add(left, right) => {
                let left = self.eval(scope, left, stack)?;
                let right = self.eval(scope, right, stack)?;
                add(left, right)
            }
            Expr::FString(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        FStringPart::Literal(s) => out.push_str(s),
                        FStringPart::Expr(e) => out.push_str(&self.eval(scope, e, stack)?.to_string()),
                    }
                }
                Some(Value::Str(out))
            }
            Expr::Unsupported => None,
        }
    }

    fn name_in(&self, scope: &Scope, name: &str, stack: &mut ResolutionStack) -> Option<Value> {
        if let Some(value) = scope.locals.get(name) {
            return Some(value.clone());
        }
        if let Some(class) = &scope.class {
            let symbol = format!("{}.{}", class, name);
            if let Some(value) = self.class_attr(&scope.file, class, name, &symbol, stack) {
                return Some(value);
            }
        }
        self.module_name(&scope.file, name, stack)
    }

    /// Module-level binding: assignment, class, then relative import.
    fn module_name(&self, file: &Path, name: &str, stack: &mut ResolutionStack) -> Option<Value> {
        let key = (file.to_path_buf(), name.to_string());
        if let Some(hit) = self.constants.get(&key) {
            return Some(hit.clone());
        }
        if !stack.enter(file, name) {
            debug!("Cycle while resolving {} in {}", name, file.display());
            return None;
        }
        let result = self.module_name_body(file, name, stack);
        stack.leave();
        if let Some(value) = &result {
            self.constants.insert(key, value.clone());
        }
        result
    }

    fn module_name_body(&self, file: &Path, name: &str, stack: &mut ResolutionStack) -> Option<Value> {
        let module = self.module(file)?;
        if let Some(expr) = module.find_assignment(name) {
            return self.eval(&Scope::module(file), expr, stack);
        }
        if module.find_class(name).is_some() {
            return Some(Value::ClassRef(name.to_string()));
        }
        match self.import_map(file).get(name)? {
            ImportTarget::Symbol { file, name } => self.module_name(file, name, stack),
            ImportTarget::Module(path) => Some(Value::ModuleRef(path.clone())),
        }
    }

    fn attribute(
        &self,
        scope: &Scope,
        value: &Expr,
        attr: &str,
        stack: &mut ResolutionStack,
    ) -> Option<Value> {
        if let Expr::Name(owner) = value {
            if let Some((file, class)) = self.locate_class(&scope.file, owner) {
                let symbol = format!("{}.{}", class, attr);
                return self.class_attr(&file, &class, attr, &symbol, stack);
            }
        }
        match self.eval(scope, value, stack)? {
            Value::ModuleRef(file) => self.module_name(&file, attr, stack),
            _ => None,
        }
    }

    /// Class definition for `name` as seen from `file`, following imports.
    fn locate_class(&self, file: &Path, name: &str) -> Option<(PathBuf, String)> {
        let module = self.module(file)?;
        if module.find_class(name).is_some() {
            return Some((file.to_path_buf(), name.to_string()));
        }
        match self.import_map(file).get(name)? {
            ImportTarget::Symbol { file, name } => {
                let target = self.module(file)?;
                target
                    .find_class(name)
                    .map(|_| (file.clone(), name.clone()))
            }
            ImportTarget::Module(_) => None,
        }
    }

    fn class_attr(
        &self,
        file: &Path,
        class: &str,
        attr: &str,
        symbol: &str,
        stack: &mut ResolutionStack,
    ) -> Option<Value> {
        if !stack.enter(file, symbol) {
            debug!("Cycle while resolving {} in {}", symbol, file.display());
            return None;
        }
        let result = self.module(file).and_then(|module| {
            let body = module.find_class(class)?;
            let expr = crate::syntax::find_assignment_in(body, attr)?;
            let scope = Scope {
                file: file.to_path_buf(),
                locals: HashMap::new(),
                class: Some(class.to_string()),
            };
            self.eval(&scope, expr, stack)
        });
        stack.leave();
        result
    }

    fn call(
        &self,
        scope: &Scope,
        func: &Expr,
        args: &[Expr],
        keywords: &[crate::syntax::Keyword],
        stack: &mut ResolutionStack,
    ) -> Option<Value> {
        if let Expr::Attribute { value, attr } = func {
            match attr.as_str() {
                "format" => {
                    let template = self.eval(scope, value, stack)?;
                    let positional = args
                        .iter()
                        .map(|a| self.eval(scope, a, stack))
                        .collect::<Option<Vec<_>>>()?;
                    let mut named = HashMap::new();
                    for kw in keywords {
                        named.insert(kw.name.clone()?, self.eval(scope, &kw.value, stack)?);
                    }
                    return python_format(template.as_str()?, &positional, &named).map(Value::Str);
                }
                "join" => {
                    let sep = self.eval(scope, value, stack)?;
                    let Value::List(items) = self.eval(scope, args.first()?, stack)? else {
                        return None;
                    };
                    let parts = items
                        .iter()
                        .map(|v| v.as_str().map(str::to_string))
                        .collect::<Option<Vec<_>>>()?;
                    return Some(Value::Str(parts.join(sep.as_str()?)));
                }
                _ => {}
            }
        }

        let (file, name) = self.locate_function(scope, func, stack)?;
        let symbol = format!("{}()", name);
        if !stack.enter(&file, &symbol) {
            debug!("Cycle while calling {} in {}", name, file.display());
            return None;
        }
        let result = self.invoke(scope, &file, &name, args, keywords, stack);
        stack.leave();
        result
    }

    fn locate_function(
        &self,
        scope: &Scope,
        func: &Expr,
        stack: &mut ResolutionStack,
    ) -> Option<(PathBuf, String)> {
        match func {
            Expr::Name(name) => {
                let module = self.module(&scope.file)?;
                if module.find_function(name).is_some() {
                    return Some((scope.file.clone(), name.clone()));
                }
                match self.import_map(&scope.file).get(name.as_str())? {
                    ImportTarget::Symbol { file, name } => {
                        let target = self.module(file)?;
                        target
                            .find_function(name)
                            .map(|_| (file.clone(), name.clone()))
                    }
                    ImportTarget::Module(_) => None,
                }
            }
            // `module.function`
            Expr::Attribute { value, attr } => match self.eval(scope, value, stack)? {
                Value::ModuleRef(file) => {
                    let target = self.module(&file)?;
                    target.find_function(attr).map(|_| (file.clone(), attr.clone()))
                }
                _ => None,
            },
            _ => None,
        }
    }

    fn invoke(
        &self,
        caller: &Scope,
        file: &Path,
        name: &str,
        args: &[Expr],
        keywords: &[crate::syntax::Keyword],
        stack: &mut ResolutionStack,
    ) -> Option<Value> {
        let module = self.module(file)?;
        let (params, body) = module.find_function(name)?;
        let returned = first_return(body)?;

        let mut locals = HashMap::new();
        for (param, arg) in params.iter().zip(args) {
            if let Some(value) = self.eval(caller, arg, stack) {
                locals.insert(param.name.clone(), value);
            }
        }
        for kw in keywords {
            let Some(key) = &kw.name else { continue };
            if params.iter().any(|p: &Param| &p.name == key) {
                if let Some(value) = self.eval(caller, &kw.value, stack) {
                    locals.insert(key.clone(), value);
                }
            }
        }
        let defaults = Scope::module(file);
        for param in params {
            if locals.contains_key(&param.name) {
                continue;
            }
            if let Some(default) = &param.default {
                if let Some(value) = self.eval(&defaults, default, stack) {
                    locals.insert(param.name.clone(), value);
                }
            }
        }

        let scope = Scope {
            file: file.to_path_buf(),
            locals,
            class: None,
        };
        self.eval(&scope, returned, stack)
    }
}

fn add(left: Value, right: Value) -> Option<Value> {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Some(Value::Str(a + &b)),
        (Value::Int(a), Value::Int(b)) => a.checked_add(b).map(Value::Int),
        (Value::Float(a), Value::Float(b)) => Some(Value::Float(a + b)),
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
            Some(Value::Float(a as f64 + b))
        }
        (Value::List(mut a), Value::List(b)) => {
            a.extend(b);
            Some(Value::List(a))
        }
        _ => None,
    }
}

/// `str.format` over resolved arguments. Supports `{}`, `{0}`, `{name}`,
/// conversions and specs (ignored), and `{{`/`}}`.
pub fn python_format(
    template: &str,
    args: &[Value],
    kwargs: &HashMap<String, Value>,
) -> Option<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut auto_index = 0usize;
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next()? {
                        '}' => break,
                        ch => field.push(ch),
                    }
                }
                let name = field.split([':', '!']).next().unwrap_or("").trim();
                let value = if name.is_empty() {
                    let v = args.get(auto_index)?;
                    auto_index += 1;
                    v
                } else if let Ok(idx) = name.parse::<usize>() {
                    args.get(idx)?
                } else {
                    kwargs.get(name)?
                };
                out.push_str(&value.to_string());
            }
            '}' => return None,
            other => out.push(other),
        }
    }
    Some(out)
}

/// Name -> origin for every relative import in `module`. Absolute imports
/// are left out: their targets are not part of the scanned tree.
pub fn build_import_map(module: &Module) -> HashMap<String, ImportTarget> {
    let mut map = HashMap::new();
    let Some(dir) = module.path.parent() else {
        return map;
    };
    for stmt in module.top_level() {
        let Stmt::ImportFrom {
            level,
            module: from,
            names,
        } = stmt
        else {
            continue;
        };
        if *level == 0 {
            continue;
        }
        let mut base = dir.to_path_buf();
        for _ in 1..*level {
            match base.parent() {
                Some(parent) => base = parent.to_path_buf(),
                None => break,
            }
        }
        match from {
            Some(dotted) => {
                let mut target = base.clone();
                for part in dotted.split('.') {
                    target.push(part);
                }
                let Some(file) = module_file(&target) else {
                    continue;
                };
                for alias in names {
                    map.insert(
                        alias.bound_name().to_string(),
                        ImportTarget::Symbol {
                            file: file.clone(),
                            name: alias.name.clone(),
                        },
                    );
                }
            }
            // `from . import x`: a submodule, or a name from the package `__init__`.
            None => {
                for alias in names {
                    let target = if let Some(sub) = module_file(&base.join(&alias.name)) {
                        ImportTarget::Module(sub)
                    } else {
                        let init = base.join("__init__.py");
                        if !init.is_file() {
                            continue;
                        }
                        ImportTarget::Symbol {
                            file: init,
                            name: alias.name.clone(),
                        }
                    };
                    map.insert(alias.bound_name().to_string(), target);
                }
            }
        }
    }
    map
}

/// `a/b` -> `a/b.py` or `a/b/__init__.py`.
fn module_file(stem: &Path) -> Option<PathBuf> {
    let file = stem.with_extension("py");
    if file.is_file() {
        return Some(file);
    }
    let init = stem.join("__init__.py");
    init.is_file().then_some(init)
}

/// Direct extraction of `variable = {"Key": ClassName, ...}` assignments
/// anywhere at module level; no evaluation.
pub fn literal_mapping(module: &Module, variable: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for stmt in module.top_level() {
        let Stmt::Assign { targets, value } = stmt else {
            continue;
        };
        if !targets
            .iter()
            .any(|t| matches!(t, Target::Name(n) if n == variable))
        {
            continue;
        }
        let Expr::Dict(items) = value else {
            continue;
        };
        for item in items {
            if let DictItem::Pair(Expr::Str(key), Expr::Name(class)) = item {
                out.push((key.clone(), class.clone()));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Value {
        Value::Str(v.to_string())
    }

    #[test]
    fn format_variants() {
        let mut named = HashMap::new();
        named.insert("ns".to_string(), s("rgthree"));
        assert_eq!(
            python_format("{} ({})", &[s("Seed"), s("rgthree")], &HashMap::new()).as_deref(),
            Some("Seed (rgthree)")
        );
        assert_eq!(
            python_format("{1}-{0}", &[s("a"), s("b")], &HashMap::new()).as_deref(),
            Some("b-a")
        );
        assert_eq!(
            python_format("{name!r:>4} {{x}}", &[], &{
                let mut m = HashMap::new();
                m.insert("name".to_string(), s("n"));
                m
            })
            .as_deref(),
            Some("n {x}")
        );
        assert_eq!(python_format("{ns}", &[], &named).as_deref(), Some("rgthree"));
        assert_eq!(python_format("{}", &[], &HashMap::new()), None);
        assert_eq!(python_format("{unclosed", &[s("a")], &HashMap::new()), None);
    }

    #[test]
    fn display_matches_python_str() {
        assert_eq!(Value::Bool(true).to_string(), "True");
        assert_eq!(Value::None.to_string(), "None");
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::List(vec![s("a"), Value::Int(1)]).to_string(), "['a', 1]");
    }

    #[test]
    fn stack_refuses_reentry() {
        let mut stack = ResolutionStack::new();
        assert!(stack.enter(Path::new("a.py"), "X"));
        assert!(!stack.enter(Path::new("a.py"), "X"));
        assert!(stack.enter(Path::new("b.py"), "X"));
        stack.leave();
        stack.leave();
        assert_eq!(stack.depth(), 0);
        assert_eq!(stack.entered(), 2);
    }
}
