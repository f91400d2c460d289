use nodescout_parser::{literal_mapping, lower_file, ResolutionStack, SymbolicResolver, Value};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write(root: &Path, rel: &str, body: &str) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn resolves_formatted_names_through_imported_function() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "py/constants.py",
        "NAMESPACE = 'rgthree'\n\ndef get_name(name):\n    return '{} ({})'.format(name, NAMESPACE)\n",
    );
    write(
        dir.path(),
        "py/seed.py",
        "from .constants import get_name\n\nclass RgthreeSeed:\n    NAME = get_name('Seed')\n",
    );
    let init = write(
        dir.path(),
        "__init__.py",
        "from .py.seed import RgthreeSeed\n\nNODE_CLASS_MAPPINGS = {\n    RgthreeSeed.NAME: RgthreeSeed,\n}\n",
    );

    let resolver = SymbolicResolver::new();
    let entries = resolver.resolve_mapping(&init, "NODE_CLASS_MAPPINGS");
    assert_eq!(
        entries,
        vec![("Seed (rgthree)".to_string(), "RgthreeSeed".to_string())]
    );
}

#[test]
fn folds_spreads_updates_and_subscripts() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "extra.py",
        "class Extra: pass\nNODE_CLASS_MAPPINGS = {'Extra': Extra}\n",
    );
    write(dir.path(), "more.py", "class More: pass\nMAPPINGS = {'More': More}\n");
    let init = write(
        dir.path(),
        "__init__.py",
        concat!(
            "from . import extra\n",
            "from .more import MAPPINGS as MORE\n",
            "PREFIX = 'Pack'\n",
            "BASE = {'Base': Base}\n",
            "NODE_CLASS_MAPPINGS = {**BASE, **extra.NODE_CLASS_MAPPINGS}\n",
            "NODE_CLASS_MAPPINGS.update(MORE)\n",
            "NODE_CLASS_MAPPINGS.update({PREFIX + 'Joined': Joined}, Kw=KwNode)\n",
            "NODE_CLASS_MAPPINGS[f'{PREFIX} Sub'] = SubNode\n",
        ),
    );

    let resolver = SymbolicResolver::new();
    let entries = resolver.resolve_mapping(&init, "NODE_CLASS_MAPPINGS");
    let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, vec!["Base", "Extra", "More", "PackJoined", "Kw", "Pack Sub"]);
    assert!(entries.contains(&("Kw".to_string(), "KwNode".to_string())));
    assert!(entries.contains(&("Pack Sub".to_string(), "SubNode".to_string())));
}

#[test]
fn mapping_reexported_from_submodule() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "nodes/__init__.py",
        "NODE_CLASS_MAPPINGS = {'Alpha': AlphaNode}\n",
    );
    let init = write(dir.path(), "__init__.py", "from .nodes import NODE_CLASS_MAPPINGS\n");

    let resolver = SymbolicResolver::new();
    assert_eq!(
        resolver.resolve_mapping(&init, "NODE_CLASS_MAPPINGS"),
        vec![("Alpha".to_string(), "AlphaNode".to_string())]
    );
}

#[test]
fn self_referential_definitions_terminate() {
    let dir = TempDir::new().unwrap();
    let file = write(
        dir.path(),
        "loop.py",
        concat!(
            "A = A + 'x'\n",
            "B = C\n",
            "C = B\n",
            "def f(x):\n    return g(x)\n",
            "def g(x):\n    return f(x)\n",
            "D = f('seed')\n",
            "class K:\n    NAME = K.NAME\n",
            "M = {**M}\n",
        ),
    );

    let resolver = SymbolicResolver::new();
    assert_eq!(resolver.resolve_name(&file, "A"), None);
    assert_eq!(resolver.resolve_name(&file, "B"), None);
    assert_eq!(resolver.resolve_name(&file, "D"), None);
    assert!(resolver.resolve_mapping(&file, "M").is_empty());

    let module = lower_file(&file).unwrap();
    let expr = nodescout_parser::Expr::Attribute {
        value: Box::new(nodescout_parser::Expr::Name("K".into())),
        attr: "NAME".into(),
    };
    let mut stack = ResolutionStack::new();
    assert_eq!(resolver.resolve_expr_with(module.file(), &expr, &mut stack), None);
    assert_eq!(stack.depth(), 0);
}

#[test]
fn keyword_arguments_and_defaults_bind() {
    let dir = TempDir::new().unwrap();
    let file = write(
        dir.path(),
        "names.py",
        concat!(
            "SUFFIX = 'pack'\n",
            "def label(name, sep=' | ', tail=SUFFIX):\n    return f'{name}{sep}{tail}'\n",
            "X = label('Loader', tail='custom')\n",
            "Y = label(name='Saver')\n",
            "Z = ', '.join(['a', 'b'])\n",
            "N = 3 + 4\n",
        ),
    );

    let resolver = SymbolicResolver::new();
    assert_eq!(
        resolver.resolve_name(&file, "X"),
        Some(Value::Str("Loader | custom".into()))
    );
    assert_eq!(
        resolver.resolve_name(&file, "Y"),
        Some(Value::Str("Saver | pack".into()))
    );
    assert_eq!(resolver.resolve_name(&file, "Z"), Some(Value::Str("a, b".into())));
    assert_eq!(resolver.resolve_name(&file, "N"), Some(Value::Int(7)));
}

#[test]
fn absolute_imports_stay_unresolved() {
    let dir = TempDir::new().unwrap();
    let file = write(
        dir.path(),
        "abs.py",
        "from somewhere.else import VALUE\nNAME = VALUE\n",
    );
    let resolver = SymbolicResolver::new();
    assert_eq!(resolver.resolve_name(&file, "NAME"), None);
}

#[test]
fn literal_mapping_requires_name_values() {
    let dir = TempDir::new().unwrap();
    let file = write(
        dir.path(),
        "nodes.py",
        "NODE_CLASS_MAPPINGS = {'A': ANode, 'B': make(), KEY: CNode}\n",
    );
    let module = lower_file(&file).unwrap();
    assert_eq!(
        literal_mapping(&module, "NODE_CLASS_MAPPINGS"),
        vec![("A".to_string(), "ANode".to_string())]
    );
}

#[test]
fn clearing_caches_picks_up_edits() {
    let dir = TempDir::new().unwrap();
    let file = write(dir.path(), "v.py", "V = 'one'\n");
    let resolver = SymbolicResolver::new();
    assert_eq!(resolver.resolve_name(&file, "V"), Some(Value::Str("one".into())));

    std::fs::write(&file, "V = 'two'\n").unwrap();
    assert_eq!(resolver.resolve_name(&file, "V"), Some(Value::Str("one".into())));

    resolver.clear_caches();
    assert_eq!(resolver.cached_modules(), 0);
    assert_eq!(resolver.resolve_name(&file, "V"), Some(Value::Str("two".into())));
}
