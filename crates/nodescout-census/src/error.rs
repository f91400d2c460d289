use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CensusError {
    #[error("Invalid installation root {path}: {reason}")]
    InvalidInstallationRoot { path: PathBuf, reason: String },

    #[error("Failed to scan package {package}: {source}")]
    PackageScan {
        package: String,
        #[source]
        source: nodescout_parser::ParseError,
    },

    #[error("Census cache unreadable: {0}")]
    CacheUnreadable(String),

    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CensusError>;
