// ABOUTME: Code search transport and rate-limit header parsing for live lookups.
use crate::error::{ResolverError, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Rate-limit headers of one search response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitHeaders {
    pub remaining: Option<u64>,
    pub limit: Option<u64>,
    /// Epoch seconds at which the window resets.
    pub reset: Option<i64>,
}

impl RateLimitHeaders {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        fn parse<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
            headers.get(name)?.to_str().ok()?.trim().parse().ok()
        }
        Self {
            remaining: parse(headers, "x-ratelimit-remaining"),
            limit: parse(headers, "x-ratelimit-limit"),
            reset: parse(headers, "x-ratelimit-reset"),
        }
    }

    pub fn present(&self) -> bool {
        self.remaining.is_some()
    }

    /// Time until the window resets plus `buffer`, measured from `now_epoch`.
    /// A reset in the past (or absent) waits only for the buffer.
    pub fn wait_from(&self, now_epoch: i64, buffer: Duration) -> Duration {
        let until_reset = self
            .reset
            .map(|reset| reset.saturating_sub(now_epoch).max(0) as u64)
            .unwrap_or(0);
        Duration::from_secs(until_reset) + buffer
    }
}

/// Raw reply of one code search call.
#[derive(Debug, Clone)]
pub struct SearchReply {
    pub status: u16,
    pub rate_limit: RateLimitHeaders,
    pub body: String,
}

impl SearchReply {
    pub fn results(&self) -> Result<CodeSearchResults> {
        serde_json::from_str(&self.body)
            .map_err(|e| ResolverError::Transient(format!("malformed search response: {}", e)))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CodeSearchResults {
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub items: Vec<CodeSearchItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CodeSearchItem {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub repository: Option<SearchRepository>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRepository {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub stargazers_count: u64,
}

/// One keyed code search request. Network-level failures are
/// [`ResolverError::Transient`]; every HTTP status is returned as a reply.
#[async_trait]
pub trait SearchTransport: Send + Sync {
    async fn search_code(&self, query: &str, per_page: u32) -> Result<SearchReply>;
}

/// GitHub code search over `reqwest`.
pub struct GithubCodeSearch {
    client: Client,
    base_url: String,
    token: SecretString,
}

impl GithubCodeSearch {
    pub fn new(base_url: impl Into<String>, token: SecretString, timeout: Duration) -> Result<Self> {
        if token.expose_secret().trim().is_empty() {
            return Err(ResolverError::Configuration(
                "a search token is required for code search".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ResolverError::Configuration(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }
}

#[async_trait]
impl SearchTransport for GithubCodeSearch {
    async fn search_code(&self, query: &str, per_page: u32) -> Result<SearchReply> {
        debug!("Code search: {}", query);
        let per_page = per_page.to_string();
        let response = self
            .client
            .get(format!("{}/search/code", self.base_url))
            .query(&[("q", query), ("per_page", per_page.as_str())])
            .header(ACCEPT, "application/vnd.github.v3+json")
            .header(USER_AGENT, concat!("nodescout/", env!("CARGO_PKG_VERSION")))
            .header(
                AUTHORIZATION,
                format!("Bearer {}", self.token.expose_secret()),
            )
            .send()
            .await
            .map_err(|e| ResolverError::Transient(e.to_string()))?;

        let status = response.status().as_u16();
        let rate_limit = RateLimitHeaders::from_headers(response.headers());
        let body = response
            .text()
            .await
            .map_err(|e| ResolverError::Transient(e.to_string()))?;
        Ok(SearchReply {
            status,
            rate_limit,
            body,
        })
    }
}

/// Strips the characters that break code search queries.
pub fn clean_query_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '(' | ')' | '[' | ']'))
        .collect()
}
