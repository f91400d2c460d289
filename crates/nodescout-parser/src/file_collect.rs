use crate::error::{ParseError, Result};
use crate::language::is_python_file;
use ignore::{overrides::OverrideBuilder, WalkBuilder};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Python sources under a package directory, sorted by path.
///
/// Dunder files other than `__init__.py` are skipped, as are caches and VCS
/// metadata. Ignore files are not honoured: an installed package's
/// `.gitignore` says nothing about what the host loads.
pub fn collect_python_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut ovr = OverrideBuilder::new(dir);
    let default_excludes = [
        "!**/.git/**",
        "!**/__pycache__/**",
        "!**/.pytest_cache/**",
        "!**/node_modules/**",
        "!**/.venv/**",
        "!**/venv/**",
    ];
    for exclude in default_excludes {
        if let Err(e) = ovr.add(exclude) {
            debug!("Ignoring bad exclude pattern {}: {}", exclude, e);
        }
    }
    let overrides = ovr.build().map_err(|e| ParseError::Walk(e.to_string()))?;

    let walker = WalkBuilder::new(dir)
        .hidden(false)
        .git_ignore(false)
        .git_exclude(false)
        .git_global(false)
        .ignore(false)
        .parents(false)
        .overrides(overrides)
        .build();

    let mut paths = Vec::new();
    for dent in walker {
        let dent = match dent {
            Ok(d) => d,
            Err(e) => {
                warn!("Walker error in {}: {}", dir.display(), e);
                continue;
            }
        };
        let path = dent.path();
        if !dent.file_type().map(|t| t.is_file()).unwrap_or(false) || !is_python_file(path) {
            continue;
        }
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if name.starts_with("__") && name != "__init__.py" {
            continue;
        }
        paths.push(path.to_path_buf());
    }
    paths.sort();

    debug!("Collected {} Python files under {}", paths.len(), dir.display());
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn skips_dunder_files_and_caches() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("sub")).unwrap();
        std::fs::create_dir_all(root.join("__pycache__")).unwrap();
        std::fs::write(root.join("__init__.py"), "").unwrap();
        std::fs::write(root.join("__version__.py"), "").unwrap();
        std::fs::write(root.join("nodes.py"), "").unwrap();
        std::fs::write(root.join("readme.md"), "").unwrap();
        std::fs::write(root.join("sub").join("more.py"), "").unwrap();
        std::fs::write(root.join("__pycache__").join("cached.py"), "").unwrap();

        let files = collect_python_files(root).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(names, vec!["__init__.py", "nodes.py", "sub/more.py"]);
    }
}
