use nodescout_census::{CensusError, NodeCensus, NodeClassifier};
use nodescout_core::{NodeClass, NodeScoutConfig};
use std::path::Path;
use tempfile::TempDir;

fn write(root: &Path, rel: &str, body: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, body).unwrap();
}

fn installation() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "nodes.py",
        "class CLIPTextEncode:\n    pass\n\nclass KSampler:\n    pass\n",
    );
    write(
        dir.path(),
        "comfy_extras/nodes_mask.py",
        "class SolidMask:\n    pass\n",
    );
    std::fs::create_dir_all(dir.path().join("custom_nodes")).unwrap();
    dir
}

fn config(cache: &TempDir) -> NodeScoutConfig {
    let mut config = NodeScoutConfig::default();
    config.census.cache_dir = Some(cache.path().to_path_buf());
    config.census.scan_workers = 2;
    config
}

#[test]
fn empty_custom_nodes_yields_builtins_only() {
    let root = installation();
    let cache = TempDir::new().unwrap();
    let census = NodeCensus::new(&config(&cache));

    let report = census.scan(root.path(), false).unwrap();
    assert!(!report.from_cache);
    assert!(report.snapshot.custom.is_empty());
    for name in ["CLIPTextEncode", "KSampler", "SolidMask", "PrimitiveNode", "Reroute", "Note"] {
        assert!(report.snapshot.builtin.contains(name), "missing {}", name);
    }
}

#[test]
fn invalid_root_is_rejected() {
    let dir = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let census = NodeCensus::new(&config(&cache));

    let err = census.scan(dir.path(), false).unwrap_err();
    assert!(matches!(err, CensusError::InvalidInstallationRoot { .. }));

    let err = census.scan(&dir.path().join("missing"), false).unwrap_err();
    assert!(matches!(err, CensusError::InvalidInstallationRoot { .. }));
}

#[test]
fn packages_contribute_literal_computed_and_class_names() {
    let root = installation();
    let nodes = root.path().join("custom_nodes");
    write(
        &nodes,
        "literal-pack/__init__.py",
        "from .nodes import Blend\nNODE_CLASS_MAPPINGS = {'Image Blend': Blend}\n",
    );
    write(&nodes, "literal-pack/nodes.py", "class Blend:\n    pass\n\nclass Helper:\n    pass\n");
    write(
        &nodes,
        "rgthree-comfy/py/constants.py",
        "NAMESPACE = 'rgthree'\n\ndef get_name(name):\n    return '{} ({})'.format(name, NAMESPACE)\n",
    );
    write(
        &nodes,
        "rgthree-comfy/py/seed.py",
        "from .constants import get_name\n\nclass RgthreeSeed:\n    NAME = get_name('Seed')\n",
    );
    write(
        &nodes,
        "rgthree-comfy/__init__.py",
        "from .py.seed import RgthreeSeed\nNODE_CLASS_MAPPINGS = {RgthreeSeed.NAME: RgthreeSeed}\n",
    );
    std::fs::create_dir_all(nodes.join(".disabled")).unwrap();
    write(&nodes, ".disabled/__init__.py", "class Hidden:\n    pass\n");

    let cache = TempDir::new().unwrap();
    let census = NodeCensus::new(&config(&cache));
    let report = census.scan(root.path(), false).unwrap();
    let custom = &report.snapshot.custom;

    assert_eq!(custom["Image Blend"], "literal-pack");
    assert_eq!(custom["Blend"], "literal-pack");
    assert_eq!(custom["Helper"], "literal-pack");
    assert_eq!(custom["Seed (rgthree)"], "rgthree-comfy");
    assert_eq!(custom["RgthreeSeed"], "rgthree-comfy");
    assert!(!custom.contains_key("Hidden"));
    assert_eq!(report.snapshot.summary().total_repos, 2);
    assert!(report.skipped_packages.is_empty());
}

#[test]
fn duplicate_class_names_go_to_last_package_by_name() {
    let root = installation();
    let nodes = root.path().join("custom_nodes");
    write(&nodes, "aaa-pack/nodes.py", "class Shared:\n    pass\n");
    write(&nodes, "zzz-pack/nodes.py", "class Shared:\n    pass\n");

    let cache = TempDir::new().unwrap();
    let census = NodeCensus::new(&config(&cache));
    let report = census.scan(root.path(), false).unwrap();
    assert_eq!(report.snapshot.custom["Shared"], "zzz-pack");
}

#[test]
fn cached_census_is_reused_until_packages_change() {
    let root = installation();
    let nodes = root.path().join("custom_nodes");
    write(&nodes, "first/nodes.py", "class First:\n    pass\n");

    let cache = TempDir::new().unwrap();
    let census = NodeCensus::new(&config(&cache));

    let fresh = census.scan(root.path(), false).unwrap();
    assert!(!fresh.from_cache);
    assert!(census.cache_for(root.path()).exists());

    // Content edits inside a known package do not invalidate the record.
    write(&nodes, "first/more.py", "class Later:\n    pass\n");
    let cached = census.scan(root.path(), false).unwrap();
    assert!(cached.from_cache);
    assert_eq!(cached.snapshot.custom, fresh.snapshot.custom);
    assert!(!cached.snapshot.custom.contains_key("Later"));

    let forced = census.scan(root.path(), true).unwrap();
    assert!(!forced.from_cache);
    assert!(forced.snapshot.custom.contains_key("Later"));

    write(&nodes, "second/nodes.py", "class Second:\n    pass\n");
    let rescanned = census.scan(root.path(), false).unwrap();
    assert!(!rescanned.from_cache);
    assert_eq!(rescanned.snapshot.custom["Second"], "second");
}

#[test]
fn unreadable_cache_forces_rescan() {
    let root = installation();
    write(&root.path().join("custom_nodes"), "pack/nodes.py", "class Node:\n    pass\n");

    let cache = TempDir::new().unwrap();
    let census = NodeCensus::new(&config(&cache));
    census.scan(root.path(), false).unwrap();

    let dir = census.cache_for(root.path()).dir().to_path_buf();
    std::fs::write(dir.join("builtin_nodes.bin"), [0xff, 0xff, 0xff]).unwrap();

    let report = census.scan(root.path(), false).unwrap();
    assert!(!report.from_cache);
    assert_eq!(report.snapshot.custom["Node"], "pack");
}

#[test]
fn disabled_cache_never_writes() {
    let root = installation();
    let cache = TempDir::new().unwrap();
    let mut config = config(&cache);
    config.census.use_cache = false;
    let census = NodeCensus::new(&config);

    census.scan(root.path(), false).unwrap();
    assert!(!census.cache_for(root.path()).exists());
    assert!(!census.scan(root.path(), false).unwrap().from_cache);
}

#[test]
fn classifier_over_scanned_census() {
    let root = installation();
    write(
        &root.path().join("custom_nodes"),
        "was-node-suite/nodes.py",
        "class Image_Blend_by_Mask:\n    pass\n",
    );
    let cache = TempDir::new().unwrap();
    let census = NodeCensus::new(&config(&cache));
    let report = census.scan(root.path(), false).unwrap();

    let classifier = NodeClassifier::new(&report.snapshot);
    assert_eq!(classifier.classify("KSampler"), NodeClass::Builtin);
    assert_eq!(
        classifier.classify("Image Blend by Mask (was-node-suite)"),
        NodeClass::Custom {
            package: "was-node-suite".into()
        }
    );
    assert_eq!(classifier.classify("NotInstalled"), NodeClass::Unknown);
}
