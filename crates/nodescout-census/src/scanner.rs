// ABOUTME: Walks an installation and inventories builtin and custom node class names.
// ABOUTME: Packages scan in parallel; results merge in package-name order.
use crate::cache::CensusCache;
use crate::error::{CensusError, Result};
use crate::snapshot::CensusSnapshot;
use dashmap::DashMap;
use nodescout_core::NodeScoutConfig;
use nodescout_parser::{collect_python_files, literal_mapping, lower_file, SymbolicResolver};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Core source files scanned for builtin node classes, relative to the root.
pub const BUILTIN_FILES: &[&str] = &[
    "nodes.py",
    "comfy_extras/nodes_custom_sampler.py",
    "comfy_extras/nodes_post_processing.py",
    "comfy_extras/nodes_upscale_model.py",
    "comfy_extras/nodes_mask.py",
    "comfy_extras/nodes_compositing.py",
    "comfy_extras/nodes_rebatch.py",
    "comfy_extras/nodes_model_advanced.py",
    "comfy_extras/nodes_model_merging.py",
    "comfy_extras/nodes_images.py",
    "comfy_extras/nodes_audio.py",
    "comfy_extras/nodes_video_model.py",
    "comfy_extras/nodes_cond.py",
    "comfy_extras/nodes_freelunch.py",
    "comfy_extras/nodes_flux.py",
    "comfy_extras/nodes_differential_diffusion.py",
    "comfy_extras/nodes_align_your_steps.py",
    "comfy_extras/nodes_hydit.py",
    "comfy_extras/nodes_hunyuan.py",
    "comfy_extras/nodes_sd3.py",
    "comfy_extras/nodes_clip_sdxl.py",
    "comfy_extras/nodes_photomaker.py",
    "comfy_extras/nodes_stable_cascade.py",
    "comfy_extras/nodes_sag.py",
    "comfy_extras/nodes_perpneg.py",
    "comfy_extras/nodes_tomesd.py",
    "comfy_extras/nodes_model_downscale.py",
];

/// Frontend-only types that never appear as Python classes.
pub const KNOWN_BUILTINS: &[&str] = &["PrimitiveNode", "Reroute", "Note"];

const ENTRY_FILE: &str = "__init__.py";

/// A package left out of the census because it could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPackage {
    pub package: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct CensusReport {
    pub snapshot: CensusSnapshot,
    pub from_cache: bool,
    /// `None` when the custom nodes directory is absent.
    pub fingerprint: Option<String>,
    pub skipped_packages: Vec<SkippedPackage>,
}

/// Builds the inventory of node types available in an installation.
///
/// Scans of one root are serialized; scans of different roots may run
/// concurrently and share the resolver's parse caches.
pub struct NodeCensus {
    resolver: Arc<SymbolicResolver>,
    workers: usize,
    mapping_variable: String,
    custom_nodes_dir: String,
    cache_root: PathBuf,
    use_cache: bool,
    scan_locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl NodeCensus {
    pub fn new(config: &NodeScoutConfig) -> Self {
        Self::with_resolver(config, Arc::new(SymbolicResolver::new()))
    }

    pub fn with_resolver(config: &NodeScoutConfig, resolver: Arc<SymbolicResolver>) -> Self {
        Self {
            resolver,
            workers: config.census.scan_workers.max(1),
            mapping_variable: config.census.mapping_variable.clone(),
            custom_nodes_dir: config.installation.custom_nodes_dir.clone(),
            cache_root: config.cache_dir(),
            use_cache: config.census.use_cache,
            scan_locks: DashMap::new(),
        }
    }

    pub fn resolver(&self) -> &Arc<SymbolicResolver> {
        &self.resolver
    }

    pub fn cache_for(&self, root: &Path) -> CensusCache {
        CensusCache::for_root(&self.cache_root, root)
    }

    pub fn custom_nodes_path(&self, root: &Path) -> PathBuf {
        root.join(&self.custom_nodes_dir)
    }

    /// Accepts a root holding `nodes.py` or a `comfy/` directory.
    pub fn validate_root(root: &Path) -> Result<()> {
        if !root.is_dir() {
            return Err(CensusError::InvalidInstallationRoot {
                path: root.to_path_buf(),
                reason: "not a directory".to_string(),
            });
        }
        if root.join("nodes.py").is_file() || root.join("comfy").is_dir() {
            return Ok(());
        }
        Err(CensusError::InvalidInstallationRoot {
            path: root.to_path_buf(),
            reason: "neither nodes.py nor comfy/ found".to_string(),
        })
    }

    /// Census of `root`, reusing the persisted record unless `force` is set
    /// or the package directory fingerprint changed.
    pub fn scan(&self, root: &Path, force: bool) -> Result<CensusReport> {
        Self::validate_root(root)?;

        let lock = self
            .scan_locks
            .entry(root.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock();

        let custom_dir = self.custom_nodes_path(root);
        let fingerprint = CensusCache::fingerprint(&custom_dir);
        let cache = self.cache_for(root);

        if self.use_cache && !force {
            if let Some(fp) = &fingerprint {
                match cache.load(root, fp) {
                    Ok(Some(snapshot)) => {
                        let summary = snapshot.summary();
                        info!(
                            "Loaded census from cache: {} builtin, {} custom nodes from {} packages",
                            summary.total_builtin, summary.total_custom, summary.total_repos
                        );
                        return Ok(CensusReport {
                            snapshot,
                            from_cache: true,
                            fingerprint,
                            skipped_packages: Vec::new(),
                        });
                    }
                    Ok(None) => {}
                    Err(e) => warn!("{}; rescanning", e),
                }
            }
        }

        let started = Instant::now();
        self.resolver.clear_caches();

        let mut snapshot = CensusSnapshot::new(root);
        snapshot.builtin = self.scan_builtin(root);

        let packages = list_packages(&custom_dir);
        let skipped_packages = self.scan_packages(&packages, &mut snapshot)?;

        let summary = snapshot.summary();
        info!(
            "Census of {}: {} builtin, {} custom nodes from {} packages in {:?}",
            root.display(),
            summary.total_builtin,
            summary.total_custom,
            summary.total_repos,
            started.elapsed()
        );

        if self.use_cache {
            if let Some(fp) = &fingerprint {
                if let Err(e) = cache.save(&snapshot, fp) {
                    warn!("Failed to persist census: {}", e);
                }
            }
        }

        Ok(CensusReport {
            snapshot,
            from_cache: false,
            fingerprint,
            skipped_packages,
        })
    }

    /// Top-level classes of the core source files plus `KNOWN_BUILTINS`.
    pub fn scan_builtin(&self, root: &Path) -> BTreeSet<String> {
        let mut builtin: BTreeSet<String> =
            KNOWN_BUILTINS.iter().map(|s| s.to_string()).collect();
        for rel in BUILTIN_FILES {
            let path = root.join(rel);
            if !path.is_file() {
                continue;
            }
            match lower_file(&path) {
                Ok(module) => builtin.extend(module.class_names()),
                Err(e) => warn!("Skipping core file {}: {}", path.display(), e),
            }
        }
        debug!("Found {} builtin node classes", builtin.len());
        builtin
    }

    /// Scans packages on a bounded pool, then merges in package-name order.
    /// A name declared by several packages belongs to the last one merged.
    fn scan_packages(
        &self,
        packages: &[PathBuf],
        snapshot: &mut CensusSnapshot,
    ) -> Result<Vec<SkippedPackage>> {
        if packages.is_empty() {
            return Ok(Vec::new());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| CensusError::WorkerPool(e.to_string()))?;

        let results: Vec<(String, Result<Vec<String>>)> = pool.install(|| {
            packages
                .par_iter()
                .map(|dir| (package_name(dir), self.scan_package(dir)))
                .collect()
        });

        let mut skipped = Vec::new();
        for (package, result) in results {
            match result {
                Ok(names) => {
                    for name in names {
                        if let Some(previous) = snapshot.custom.insert(name.clone(), package.clone())
                        {
                            if previous != package {
                                debug!("'{}' declared by {} and {}", name, previous, package);
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!("{}", e);
                    skipped.push(SkippedPackage {
                        package,
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(skipped)
    }

    /// Node names declared by one package, in discovery order.
    pub fn scan_package(&self, dir: &Path) -> Result<Vec<String>> {
        let package = package_name(dir);
        let scan_error = |source: nodescout_parser::ParseError| CensusError::PackageScan {
            package: package.clone(),
            source,
        };

        let mut names = Vec::new();
        let entry = dir.join(ENTRY_FILE);
        if entry.is_file() {
            let module = lower_file(&entry).map_err(scan_error)?;
            let mut mapping = literal_mapping(&module, &self.mapping_variable);
            if mapping.is_empty() {
                mapping = self.resolver.resolve_mapping(&entry, &self.mapping_variable);
                if !mapping.is_empty() {
                    debug!(
                        "Resolved {} computed mapping entries in {}",
                        mapping.len(),
                        package
                    );
                }
            }
            for (display, class) in mapping {
                names.push(display);
                names.push(class);
            }
        }

        let files = collect_python_files(dir).map_err(scan_error)?;
        for file in files {
            let module = match lower_file(&file) {
                Ok(module) => module,
                Err(e) => {
                    debug!("Skipping {}: {}", file.display(), e);
                    continue;
                }
            };
            names.extend(module.class_names());
            for (display, class) in literal_mapping(&module, &self.mapping_variable) {
                names.push(display);
                names.push(class);
            }
        }

        debug!("Package {}: {} names", package, names.len());
        Ok(names)
    }
}

/// Immediate subdirectories of `custom_dir`, sorted, excluding hidden ones
/// and `__pycache__`.
pub fn list_packages(custom_dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(custom_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Custom nodes directory {} unreadable: {}", custom_dir.display(), e);
            return Vec::new();
        }
    };
    let mut packages: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter(|e| {
            let name = e.file_name();
            let name = name.to_string_lossy();
            !name.starts_with('.') && name != "__pycache__"
        })
        .map(|e| e.path())
        .collect();
    packages.sort();
    packages
}

fn package_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
