//! Persisted census records, invalidated by a package-directory fingerprint.
//!
//! The fingerprint only covers the names of the package directories, so edits
//! inside an already-known package do not invalidate the record.

use crate::error::{CensusError, Result};
use crate::snapshot::CensusSnapshot;
use chrono::{DateTime, Utc};
use nodescout_core::path_digest;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const HASH_FILE: &str = "custom_nodes_hash.txt";
const BUILTIN_FILE: &str = "builtin_nodes.bin";
const CUSTOM_FILE: &str = "custom_nodes.bin";
const METADATA_FILE: &str = "scan_metadata.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub comfyui_path: String,
    pub builtin_count: usize,
    pub custom_count: usize,
    pub total_repos: usize,
    pub scanned_at: DateTime<Utc>,
}

/// Cache files for one installation root.
#[derive(Debug, Clone)]
pub struct CensusCache {
    dir: PathBuf,
}

impl CensusCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Per-root subdirectory of `cache_root`.
    pub fn for_root(cache_root: &Path, installation_root: &Path) -> Self {
        let key = installation_root
            .canonicalize()
            .unwrap_or_else(|_| installation_root.to_path_buf());
        Self::new(cache_root.join(path_digest(&key.to_string_lossy())))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Hex digest of the sorted package directory names; `None` when the
    /// directory is missing, which always forces a rescan.
    pub fn fingerprint(custom_nodes_dir: &Path) -> Option<String> {
        let entries = std::fs::read_dir(custom_nodes_dir).ok()?;
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| !name.starts_with('.') && name != "__pycache__")
            .collect();
        names.sort();
        let digest = Sha256::digest(names.join("|").as_bytes());
        Some(digest.iter().map(|b| format!("{:02x}", b)).collect())
    }

    /// True when every required file is present.
    pub fn exists(&self) -> bool {
        [HASH_FILE, BUILTIN_FILE, CUSTOM_FILE]
            .iter()
            .all(|name| self.dir.join(name).is_file())
    }

    pub fn stored_fingerprint(&self) -> Option<String> {
        std::fs::read_to_string(self.dir.join(HASH_FILE))
            .ok()
            .map(|s| s.trim().to_string())
    }

    /// `Ok(None)` on a miss (absent files or fingerprint mismatch);
    /// `Err(CacheUnreadable)` when files exist but cannot be decoded.
    pub fn load(&self, root: &Path, fingerprint: &str) -> Result<Option<CensusSnapshot>> {
        if !self.exists() {
            debug!("No census cache at {}", self.dir.display());
            return Ok(None);
        }
        match self.stored_fingerprint() {
            Some(stored) if stored == fingerprint => {}
            _ => {
                info!("Package directory changed, census cache is stale");
                return Ok(None);
            }
        }

        let builtin: BTreeSet<String> = decode(&self.dir.join(BUILTIN_FILE))?;
        let custom: BTreeMap<String, String> = decode(&self.dir.join(CUSTOM_FILE))?;
        Ok(Some(CensusSnapshot {
            root: root.to_path_buf(),
            builtin,
            custom,
        }))
    }

    pub fn save(&self, snapshot: &CensusSnapshot, fingerprint: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;

        // The previous fingerprint must not outlive the payload it described.
        match std::fs::remove_file(self.dir.join(HASH_FILE)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let builtin = encode(&snapshot.builtin)?;
        let custom = encode(&snapshot.custom)?;
        std::fs::write(self.dir.join(BUILTIN_FILE), builtin)?;
        std::fs::write(self.dir.join(CUSTOM_FILE), custom)?;

        let summary = snapshot.summary();
        let metadata = CacheMetadata {
            comfyui_path: snapshot.root.display().to_string(),
            builtin_count: summary.total_builtin,
            custom_count: summary.total_custom,
            total_repos: summary.total_repos,
            scanned_at: Utc::now(),
        };
        std::fs::write(
            self.dir.join(METADATA_FILE),
            serde_json::to_string_pretty(&metadata)?,
        )?;

        // Written last: a record is only valid once its payload is complete.
        std::fs::write(self.dir.join(HASH_FILE), fingerprint)?;
        debug!("Census cache written to {}", self.dir.display());
        Ok(())
    }

    pub fn metadata(&self) -> Option<CacheMetadata> {
        let text = std::fs::read_to_string(self.dir.join(METADATA_FILE)).ok()?;
        match serde_json::from_str(&text) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                warn!("Ignoring unreadable cache metadata: {}", e);
                None
            }
        }
    }

    /// Remove every cache file; missing files are not an error.
    pub fn clear(&self) -> Result<()> {
        for name in [HASH_FILE, BUILTIN_FILE, CUSTOM_FILE, METADATA_FILE] {
            match std::fs::remove_file(self.dir.join(name)) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        info!("Census cache cleared: {}", self.dir.display());
        Ok(())
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e: bincode::error::EncodeError| CensusError::CacheUnreadable(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path)
        .map_err(|e| CensusError::CacheUnreadable(format!("{}: {}", path.display(), e)))?;
    let (value, _): (T, usize) = bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
        .map_err(|e: bincode::error::DecodeError| {
            CensusError::CacheUnreadable(format!("{}: {}", path.display(), e))
        })?;
    Ok(value)
}
