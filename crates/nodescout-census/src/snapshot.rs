use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Inventory of known node type names for one installation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CensusSnapshot {
    pub root: PathBuf,
    /// Names shipped with the host application.
    pub builtin: BTreeSet<String>,
    /// Node type name -> owning package directory.
    pub custom: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CensusSummary {
    pub total_builtin: usize,
    pub total_custom: usize,
    pub total_repos: usize,
}

impl CensusSnapshot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    pub fn summary(&self) -> CensusSummary {
        let repos: BTreeSet<&str> = self.custom.values().map(String::as_str).collect();
        CensusSummary {
            total_builtin: self.builtin.len(),
            total_custom: self.custom.len(),
            total_repos: repos.len(),
        }
    }

    /// Names grouped by package, for reporting.
    pub fn packages(&self) -> BTreeMap<&str, Vec<&str>> {
        let mut grouped: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (name, package) in &self.custom {
            grouped.entry(package).or_default().push(name);
        }
        grouped
    }

    pub fn to_json(&self) -> serde_json::Value {
        let summary = self.summary();
        serde_json::json!({
            "comfyui_path": self.root.display().to_string(),
            "builtin_nodes": self.builtin,
            "custom_nodes": self.custom,
            "summary": {
                "total_builtin": summary.total_builtin,
                "total_custom": summary.total_custom,
                "total_repos": summary.total_repos,
            }
        })
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(&self.to_json())?;
        std::fs::write(path, text)?;
        Ok(())
    }
}
