//! Community registry: class name -> package URL, plus name patterns for
//! packages that compose their display names at load time.

use crate::error::{ResolverError, Result};
use async_trait::async_trait;
use nodescout_core::PackageRef;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Where the registry document comes from.
#[async_trait]
pub trait RegistrySource: Send + Sync {
    async fn fetch(&self) -> Result<Value>;

    fn describe(&self) -> String;
}

pub struct HttpRegistrySource {
    client: Client,
    url: String,
}

impl HttpRegistrySource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ResolverError::Configuration(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl RegistrySource for HttpRegistrySource {
    async fn fetch(&self) -> Result<Value> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| ResolverError::Registry(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ResolverError::Registry(format!(
                "HTTP {} from {}",
                response.status(),
                self.url
            )));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| ResolverError::Registry(e.to_string()))
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// A registry document on disk.
pub struct FileRegistrySource {
    path: PathBuf,
}

impl FileRegistrySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RegistrySource for FileRegistrySource {
    async fn fetch(&self) -> Result<Value> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| ResolverError::Registry(format!("{}: {}", self.path.display(), e)))?;
        serde_json::from_str(&text)
            .map_err(|e| ResolverError::Registry(format!("{}: {}", self.path.display(), e)))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// An in-memory registry document.
pub struct StaticRegistrySource {
    doc: Value,
}

impl StaticRegistrySource {
    pub fn new(doc: Value) -> Self {
        Self { doc }
    }
}

#[async_trait]
impl RegistrySource for StaticRegistrySource {
    async fn fetch(&self) -> Result<Value> {
        Ok(self.doc.clone())
    }

    fn describe(&self) -> String {
        "in-memory document".to_string()
    }
}

/// Lookup tables built from one registry document.
#[derive(Debug, Default)]
pub struct RegistryIndex {
    exact: HashMap<String, PackageRef>,
    patterns: Vec<(Regex, PackageRef)>,
}

impl RegistryIndex {
    /// Builds the index from `{ url: [[class, ...], {"nodename_pattern": ...}] }`.
    /// Entries that do not have this shape are skipped.
    pub fn from_document(doc: &Value) -> Self {
        let mut index = Self::default();
        let Some(entries) = doc.as_object() else {
            warn!("Registry document is not an object; ignoring it");
            return index;
        };

        for (url, entry) in entries {
            let Some(parts) = entry.as_array() else {
                debug!("Skipping malformed registry entry for {}", url);
                continue;
            };
            let package = PackageRef::new(url.as_str());

            if let Some(pattern) = parts
                .get(1)
                .and_then(|meta| meta.get("nodename_pattern"))
                .and_then(Value::as_str)
                .filter(|p| !p.is_empty())
            {
                match Regex::new(pattern) {
                    Ok(regex) => index.patterns.push((regex, package.clone())),
                    Err(e) => debug!("Skipping pattern for {}: {}", url, e),
                }
            }

            if let Some(classes) = parts.first().and_then(Value::as_array) {
                for class in classes.iter().filter_map(Value::as_str) {
                    index.exact.insert(class.to_string(), package.clone());
                }
            }
        }
        index
    }

    pub fn exact(&self, name: &str) -> Option<&PackageRef> {
        self.exact.get(name)
    }

    /// First package whose pattern matches anywhere in `name`.
    pub fn pattern(&self, name: &str) -> Option<&PackageRef> {
        self.patterns
            .iter()
            .find(|(regex, _)| regex.is_match(name))
            .map(|(_, package)| package)
    }

    pub fn class_count(&self) -> usize {
        self.exact.len()
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }
}

/// Registry service: fetches its document once and keeps the index until
/// [`NodeRegistry::reset`].
pub struct NodeRegistry {
    source: Arc<dyn RegistrySource>,
    index: RwLock<Option<Arc<RegistryIndex>>>,
}

impl NodeRegistry {
    pub fn new(source: Arc<dyn RegistrySource>) -> Self {
        Self {
            source,
            index: RwLock::new(None),
        }
    }

    /// The loaded index. A failed fetch is logged and yields an empty index
    /// that stays in place until the next reset.
    pub async fn index(&self) -> Arc<RegistryIndex> {
        if let Some(index) = self.index.read().await.as_ref() {
            return Arc::clone(index);
        }

        let mut slot = self.index.write().await;
        if let Some(index) = slot.as_ref() {
            return Arc::clone(index);
        }

        let index = match self.source.fetch().await {
            Ok(doc) => {
                let index = RegistryIndex::from_document(&doc);
                info!(
                    "Loaded registry from {}: {} classes, {} patterns",
                    self.source.describe(),
                    index.class_count(),
                    index.pattern_count()
                );
                index
            }
            Err(e) => {
                warn!("Registry unavailable ({}); continuing without it", e);
                RegistryIndex::default()
            }
        };
        let index = Arc::new(index);
        *slot = Some(Arc::clone(&index));
        index
    }

    pub async fn is_loaded(&self) -> bool {
        self.index.read().await.is_some()
    }

    /// Drops the loaded index; the next lookup fetches again.
    pub async fn reset(&self) {
        *self.index.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn document() -> Value {
        json!({
            "https://github.com/rgthree/rgthree-comfy": [
                ["Context (rgthree)"],
                {"title_aux": "rgthree", "nodename_pattern": " \\(rgthree\\)$"}
            ],
            "https://github.com/WASasquatch/was-node-suite-comfyui/": [
                ["Image Blend", "Text Concatenate"],
                {"title_aux": "WAS"}
            ],
            "https://github.com/broken/entry": "not a list",
            "https://github.com/bad/pattern": [[], {"nodename_pattern": "(unclosed"}]
        })
    }

    #[test]
    fn builds_exact_and_pattern_tables() {
        let index = RegistryIndex::from_document(&document());
        assert_eq!(index.class_count(), 3);
        assert_eq!(index.pattern_count(), 1);
        assert_eq!(
            index.exact("Image Blend").map(PackageRef::url),
            Some("https://github.com/WASasquatch/was-node-suite-comfyui")
        );
        assert_eq!(
            index.pattern("Seed (rgthree)").map(PackageRef::name),
            Some("rgthree-comfy")
        );
        assert!(index.pattern("Seed").is_none());
        assert!(index.exact("Seed (rgthree)").is_none());
    }

    struct CountingSource(AtomicUsize);

    #[async_trait]
    impl RegistrySource for CountingSource {
        async fn fetch(&self) -> Result<Value> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(document())
        }

        fn describe(&self) -> String {
            "counting".into()
        }
    }

    #[tokio::test]
    async fn fetches_once_until_reset() {
        let source = Arc::new(CountingSource(AtomicUsize::new(0)));
        let registry = NodeRegistry::new(source.clone());
        assert!(!registry.is_loaded().await);

        registry.index().await;
        registry.index().await;
        assert_eq!(source.0.load(Ordering::SeqCst), 1);

        registry.reset().await;
        assert!(!registry.is_loaded().await);
        assert_eq!(registry.index().await.class_count(), 3);
        assert_eq!(source.0.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_fetch_yields_empty_index() {
        let registry = NodeRegistry::new(Arc::new(FileRegistrySource::new("/nonexistent/map.json")));
        let index = registry.index().await;
        assert_eq!(index.class_count(), 0);
        assert!(registry.is_loaded().await);
    }
}
