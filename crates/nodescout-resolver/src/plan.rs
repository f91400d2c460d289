use crate::installer::InstallItem;
use crate::resolver::Resolution;
use nodescout_core::PackageRef;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// One package to install and the node names it provides.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedPackage {
    pub package: PackageRef,
    pub repo_name: String,
    pub description: String,
    pub stars: u64,
    pub nodes: Vec<String>,
}

/// Located packages grouped so each is scheduled once.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InstallPlan {
    pub packages: Vec<PlannedPackage>,
}

impl InstallPlan {
    /// Groups `Found` resolutions by package URL; other outcomes are ignored.
    pub fn from_resolutions<'a, I>(resolutions: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a Resolution)>,
    {
        let mut grouped: BTreeMap<PackageRef, PlannedPackage> = BTreeMap::new();
        for (name, resolution) in resolutions {
            let Some(located) = resolution.located() else {
                continue;
            };
            let entry = grouped
                .entry(located.package.clone())
                .or_insert_with(|| PlannedPackage {
                    package: located.package.clone(),
                    repo_name: located.repo_name.clone(),
                    description: located.description.clone(),
                    stars: located.stars,
                    nodes: Vec::new(),
                });
            if !entry.nodes.contains(name) {
                entry.nodes.push(name.clone());
            }
        }
        Self {
            packages: grouped.into_values().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Destinations are `<custom_nodes_dir>/<last URL segment>`.
    pub fn install_items(&self, custom_nodes_dir: &Path) -> Vec<InstallItem> {
        self.packages
            .iter()
            .map(|planned| InstallItem {
                package: planned.package.clone(),
                destination: custom_nodes_dir.join(planned.package.name()),
            })
            .collect()
    }
}
