use git2::build::RepoBuilder;
use nodescout_core::PackageRef;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstallError {
    #[error("Failed to clone {package}: {message}")]
    Clone { package: String, message: String },

    #[error("Destination already exists: {0}")]
    DestinationExists(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallItem {
    pub package: PackageRef,
    pub destination: PathBuf,
}

#[derive(Debug, Clone)]
pub struct InstallOutcome {
    pub package: PackageRef,
    pub destination: PathBuf,
    pub result: std::result::Result<(), InstallError>,
}

impl InstallOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Materializes packages locally, reporting each item separately.
pub trait Installer: Send + Sync {
    fn install(&self, items: &[InstallItem]) -> Vec<InstallOutcome>;
}

/// Clones each package repository with libgit2.
#[derive(Debug, Default, Clone)]
pub struct GitInstaller;

impl GitInstaller {
    pub fn new() -> Self {
        Self
    }

    fn clone_one(&self, package: &PackageRef, destination: &Path) -> Result<(), InstallError> {
        if destination.exists() {
            return Err(InstallError::DestinationExists(destination.to_path_buf()));
        }
        info!("Cloning {} into {}", package, destination.display());
        RepoBuilder::new()
            .clone(package.url(), destination)
            .map(|_| ())
            .map_err(|e| InstallError::Clone {
                package: package.url().to_string(),
                message: e.message().to_string(),
            })
    }
}

impl Installer for GitInstaller {
    fn install(&self, items: &[InstallItem]) -> Vec<InstallOutcome> {
        items
            .iter()
            .map(|item| {
                let result = self.clone_one(&item.package, &item.destination);
                if let Err(e) = &result {
                    warn!("{}", e);
                }
                InstallOutcome {
                    package: item.package.clone(),
                    destination: item.destination.clone(),
                    result,
                }
            })
            .collect()
    }
}
