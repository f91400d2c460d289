//! Tiered lookup from node type names to the packages that provide them.
//!
//! Tiers are tried in order and the first hit wins: the registry's exact
//! class map, its name patterns, then live code search. Live searches run
//! one at a time with a minimum spacing; a rate-limited reply is waited out
//! once and retried once.

use crate::error::{ResolverError, Result};
use crate::registry::NodeRegistry;
use crate::search::{clean_query_name, CodeSearchItem, SearchReply, SearchTransport};
use dashmap::DashMap;
use nodescout_core::{NodeClass, PackageRef, ResolverConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionTier {
    Local,
    StaticMap,
    PatternMap,
    LiveSearch,
}

impl ResolutionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionTier::Local => "local",
            ResolutionTier::StaticMap => "static-map",
            ResolutionTier::PatternMap => "pattern-map",
            ResolutionTier::LiveSearch => "live-search",
        }
    }
}

impl std::fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A package located outside the installation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocatedPackage {
    pub class_name: String,
    pub package: PackageRef,
    pub repo_name: String,
    pub author: Option<String>,
    pub description: String,
    pub stars: u64,
    pub file_path: Option<String>,
    pub file_url: Option<String>,
    pub tier: ResolutionTier,
}

impl LocatedPackage {
    fn from_registry(class_name: &str, package: &PackageRef, tier: ResolutionTier) -> Self {
        let description = match tier {
            ResolutionTier::PatternMap => "Found in the community registry (pattern match)",
            _ => "Found in the community registry",
        };
        Self {
            class_name: class_name.to_string(),
            package: package.clone(),
            repo_name: package.name().to_string(),
            author: package.author().map(str::to_string),
            description: description.to_string(),
            stars: 0,
            file_path: None,
            file_url: None,
            tier,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Resolution {
    /// Shipped with the host application.
    Builtin,
    /// Provided by an installed package.
    Local { package: String },
    Found(LocatedPackage),
    NotFound,
}

impl Resolution {
    pub fn tier(&self) -> Option<ResolutionTier> {
        match self {
            Resolution::Local { .. } => Some(ResolutionTier::Local),
            Resolution::Found(located) => Some(located.tier),
            Resolution::Builtin | Resolution::NotFound => None,
        }
    }

    pub fn located(&self) -> Option<&LocatedPackage> {
        match self {
            Resolution::Found(located) => Some(located),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    /// Results are kept only if the repository name or description contains it.
    pub ecosystem_marker: String,
    /// Appended to the primary query.
    pub query_marker: String,
    pub source_language: String,
    pub per_page: u32,
    /// Minimum spacing between consecutive live searches.
    pub search_delay: Duration,
    pub rate_limit_buffer: Duration,
    /// Longer reset windows are not waited out.
    pub max_rate_limit_wait: Duration,
}

impl ResolverSettings {
    pub fn from_config(config: &ResolverConfig) -> Self {
        Self {
            ecosystem_marker: config.ecosystem_marker.to_lowercase(),
            query_marker: config.query_marker.clone(),
            source_language: config.source_language.clone(),
            per_page: config.per_page,
            search_delay: Duration::from_millis(config.search_delay_ms),
            rate_limit_buffer: Duration::from_secs(config.rate_limit_buffer_secs),
            max_rate_limit_wait: Duration::from_secs(config.max_rate_limit_wait_secs),
        }
    }
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self::from_config(&ResolverConfig::default())
    }
}

/// Results of one batch, keyed by node type name.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchResolution {
    pub results: BTreeMap<String, Resolution>,
    /// Set when the batch stopped early; unvisited names are absent.
    pub cancelled: bool,
}

impl BatchResolution {
    pub fn count(&self, predicate: impl Fn(&Resolution) -> bool) -> usize {
        self.results.values().filter(|r| predicate(*r)).count()
    }
}

enum SearchOutcome {
    Reply(SearchReply),
    NotFound,
}

pub struct RepositoryResolver {
    registry: Arc<NodeRegistry>,
    search: Option<Arc<dyn SearchTransport>>,
    settings: ResolverSettings,
    cache: DashMap<String, LocatedPackage>,
    last_search: Mutex<Option<Instant>>,
    search_calls: AtomicUsize,
}

impl RepositoryResolver {
    /// `search` is optional; without it the live-search tier is skipped.
    pub fn new(
        registry: Arc<NodeRegistry>,
        search: Option<Arc<dyn SearchTransport>>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            registry,
            search,
            settings,
            cache: DashMap::new(),
            last_search: Mutex::new(None),
            search_calls: AtomicUsize::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn has_live_search(&self) -> bool {
        self.search.is_some()
    }

    /// Live search requests issued so far, retries included.
    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::Relaxed)
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Resolves one name given its census classification. Only a rejected
    /// search credential is an error.
    pub async fn resolve(&self, name: &str, class: &NodeClass) -> Result<Resolution> {
        self.resolve_with(name, class, &CancellationToken::new()).await
    }

    /// Resolves names in order, one at a time. Stops at the first
    /// authentication failure (returned as the error) or when `cancel` fires
    /// (partial results with `cancelled` set).
    pub async fn resolve_batch(
        &self,
        names: &[(String, NodeClass)],
        cancel: &CancellationToken,
    ) -> Result<BatchResolution> {
        let mut batch = BatchResolution::default();
        let pending = names
            .iter()
            .filter(|(_, class)| matches!(class, NodeClass::Unknown))
            .count();
        info!("Resolving {} names ({} unknown)", names.len(), pending);

        for (name, class) in names {
            if cancel.is_cancelled() {
                batch.cancelled = true;
                break;
            }
            match self.resolve_with(name, class, cancel).await {
                Ok(resolution) => {
                    batch.results.insert(name.clone(), resolution);
                }
                Err(ResolverError::Cancelled) => {
                    batch.cancelled = true;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        if batch.cancelled {
            warn!("Resolution cancelled after {} names", batch.results.len());
        }
        Ok(batch)
    }

    async fn resolve_with(
        &self,
        name: &str,
        class: &NodeClass,
        cancel: &CancellationToken,
    ) -> Result<Resolution> {
        match class {
            NodeClass::Builtin => Ok(Resolution::Builtin),
            NodeClass::Custom { package } => Ok(Resolution::Local {
                package: package.clone(),
            }),
            NodeClass::Unknown => Ok(match self.locate(name, cancel).await? {
                Some(located) => Resolution::Found(located),
                None => Resolution::NotFound,
            }),
        }
    }

    /// Tiers for a name the census does not know.
    pub async fn locate(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<LocatedPackage>> {
        if let Some(hit) = self.cache.get(name) {
            debug!("Cache hit for {}", name);
            return Ok(Some(hit.clone()));
        }

        let index = self.registry.index().await;
        let located = if let Some(package) = index.exact(name) {
            Some(LocatedPackage::from_registry(
                name,
                package,
                ResolutionTier::StaticMap,
            ))
        } else if let Some(package) = index.pattern(name) {
            Some(LocatedPackage::from_registry(
                name,
                package,
                ResolutionTier::PatternMap,
            ))
        } else {
            self.live_search(name, cancel).await?
        };

        match &located {
            Some(hit) => {
                info!("{} -> {} ({})", name, hit.package, hit.tier);
                self.cache.insert(name.to_string(), hit.clone());
            }
            None => info!("{} not found", name),
        }
        Ok(located)
    }

    async fn live_search(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<LocatedPackage>> {
        let Some(transport) = self.search.as_ref() else {
            debug!("Live search disabled; {} left unresolved", name);
            return Ok(None);
        };

        let clean = clean_query_name(name);
        let primary = format!("{} {}", clean, self.settings.query_marker);
        let reply = match self.search_once(transport.as_ref(), &primary, cancel).await? {
            SearchOutcome::Reply(reply) => reply,
            SearchOutcome::NotFound => return Ok(None),
        };
        let results = match reply.results() {
            Ok(results) => results,
            Err(e) => {
                warn!("{}: {}", name, e);
                return Ok(None);
            }
        };
        if results.total_count > 0 {
            return Ok(self.first_relevant(name, &results.items));
        }

        let alternate = format!("\"{}\" language:{}", clean, self.settings.source_language);
        debug!("No results for '{}', trying '{}'", primary, alternate);
        let reply = match self.search_once(transport.as_ref(), &alternate, cancel).await? {
            SearchOutcome::Reply(reply) => reply,
            SearchOutcome::NotFound => return Ok(None),
        };
        Ok(reply
            .results()
            .ok()
            .and_then(|results| self.first_relevant(name, &results.items)))
    }

    /// One search with the status policy applied. `Reply` always carries a
    /// 200; every other outcome is `NotFound` or an error.
    async fn search_once(
        &self,
        transport: &dyn SearchTransport,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<SearchOutcome> {
        let reply = match self.paced_call(transport, query).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Search for '{}' failed: {}", query, e);
                return Ok(SearchOutcome::NotFound);
            }
        };

        match self.classify_reply(reply)? {
            Classified::Ok(reply) => Ok(SearchOutcome::Reply(reply)),
            Classified::NotFound => Ok(SearchOutcome::NotFound),
            Classified::RateLimited(wait) => {
                if wait > self.settings.max_rate_limit_wait {
                    warn!(
                        "Rate limit resets in {:?}, longer than the {:?} limit; skipping '{}'",
                        wait, self.settings.max_rate_limit_wait, query
                    );
                    return Ok(SearchOutcome::NotFound);
                }
                warn!("Rate limited; waiting {:?} before retrying '{}'", wait, query);
                tokio::select! {
                    _ = cancel.cancelled() => return Err(ResolverError::Cancelled),
                    _ = tokio::time::sleep(wait) => {}
                }

                let retry = match self.paced_call(transport, query).await {
                    Ok(reply) => reply,
                    Err(e) => {
                        warn!("Retry of '{}' failed: {}", query, e);
                        return Ok(SearchOutcome::NotFound);
                    }
                };
                match self.classify_reply(retry)? {
                    Classified::Ok(reply) => Ok(SearchOutcome::Reply(reply)),
                    Classified::RateLimited(_) => {
                        warn!("Still rate limited after waiting; skipping '{}'", query);
                        Ok(SearchOutcome::NotFound)
                    }
                    Classified::NotFound => Ok(SearchOutcome::NotFound),
                }
            }
        }
    }

    fn classify_reply(&self, reply: SearchReply) -> Result<Classified> {
        match reply.status {
            200 => Ok(Classified::Ok(reply)),
            401 => Err(ResolverError::Auth(
                "the search API rejected the token (HTTP 401)".to_string(),
            )),
            403 if reply.rate_limit.present() => {
                let now = chrono::Utc::now().timestamp();
                Ok(Classified::RateLimited(
                    reply
                        .rate_limit
                        .wait_from(now, self.settings.rate_limit_buffer),
                ))
            }
            403 => {
                warn!("Search forbidden (HTTP 403); check token permissions");
                Ok(Classified::NotFound)
            }
            status => {
                warn!("Search API returned HTTP {}", status);
                Ok(Classified::NotFound)
            }
        }
    }

    /// Issues one request no sooner than `search_delay` after the previous one.
    async fn paced_call(
        &self,
        transport: &dyn SearchTransport,
        query: &str,
    ) -> Result<SearchReply> {
        let mut last = self.last_search.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.settings.search_delay;
            if Instant::now() < ready_at {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        self.search_calls.fetch_add(1, Ordering::Relaxed);
        let result = transport.search_code(query, self.settings.per_page).await;
        *last = Some(Instant::now());
        result
    }

    fn first_relevant(&self, name: &str, items: &[CodeSearchItem]) -> Option<LocatedPackage> {
        let marker = &self.settings.ecosystem_marker;
        items.iter().find_map(|item| {
            let repo = item.repository.as_ref()?;
            let full_name = repo.full_name.as_deref().filter(|n| !n.is_empty())?;
            let description = repo.description.clone().unwrap_or_default();
            if !full_name.to_lowercase().contains(marker.as_str())
                && !description.to_lowercase().contains(marker.as_str())
            {
                return None;
            }
            let url = repo
                .html_url
                .clone()
                .unwrap_or_else(|| format!("https://github.com/{}", full_name));
            let package = PackageRef::new(url);
            Some(LocatedPackage {
                class_name: name.to_string(),
                author: package.author().map(str::to_string),
                package,
                repo_name: full_name.to_string(),
                description: if description.is_empty() {
                    "No description".to_string()
                } else {
                    description
                },
                stars: repo.stargazers_count,
                file_path: item.path.clone(),
                file_url: item.html_url.clone(),
                tier: ResolutionTier::LiveSearch,
            })
        })
    }
}

enum Classified {
    Ok(SearchReply),
    RateLimited(Duration),
    NotFound,
}
