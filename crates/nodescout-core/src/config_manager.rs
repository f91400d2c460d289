use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// `~/.nodescout/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".nodescout").join("config.toml"))
}

/// Main configuration for NodeScout
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NodeScoutConfig {
    /// Local installation that workflows are checked against
    #[serde(default)]
    pub installation: InstallationConfig,

    /// Census scanning and caching
    #[serde(default)]
    pub census: CensusConfig,

    /// Repository resolution (registry + live search)
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Installation location settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallationConfig {
    /// Installation root (the directory holding `nodes.py` / `comfy/`)
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Directory under the root holding one subdirectory per package
    #[serde(default = "default_custom_nodes_dir")]
    pub custom_nodes_dir: String,
}

impl Default for InstallationConfig {
    fn default() -> Self {
        Self {
            root: None,
            custom_nodes_dir: default_custom_nodes_dir(),
        }
    }
}

/// Census scanning settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CensusConfig {
    /// Reuse a persisted census when the fingerprint matches
    #[serde(default = "default_true")]
    pub use_cache: bool,

    /// Override for the cache directory (defaults to the platform cache dir)
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Worker threads for package scanning
    #[serde(default = "default_scan_workers")]
    pub scan_workers: usize,

    /// Variable holding the display-name -> class mapping in package entry points
    #[serde(default = "default_mapping_variable")]
    pub mapping_variable: String,
}

impl Default for CensusConfig {
    fn default() -> Self {
        Self {
            use_cache: true,
            cache_dir: None,
            scan_workers: default_scan_workers(),
            mapping_variable: default_mapping_variable(),
        }
    }
}

/// Repository resolution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Community registry document (package URL -> [class names, metadata])
    #[serde(default = "default_registry_url")]
    pub registry_url: String,

    /// Base URL of the code search API
    #[serde(default = "default_search_api_base")]
    pub search_api_base: String,

    /// Search credential; only ever read from the environment
    #[serde(skip)]
    pub github_token: Option<SecretString>,

    /// Substring a result's repository name or description must contain
    #[serde(default = "default_ecosystem_marker")]
    pub ecosystem_marker: String,

    /// Keyword appended to the first search query
    #[serde(default = "default_query_marker")]
    pub query_marker: String,

    /// Language qualifier used by the fallback query
    #[serde(default = "default_source_language")]
    pub source_language: String,

    /// Results requested per search
    #[serde(default = "default_per_page")]
    pub per_page: u32,

    /// Minimum delay between consecutive live searches (ms)
    #[serde(default = "default_search_delay_ms")]
    pub search_delay_ms: u64,

    /// Extra seconds slept past a rate-limit reset
    #[serde(default = "default_rate_limit_buffer_secs")]
    pub rate_limit_buffer_secs: u64,

    /// Longest rate-limit wait honoured before giving up on the item
    #[serde(default = "default_max_rate_limit_wait_secs")]
    pub max_rate_limit_wait_secs: u64,

    /// Live search request timeout (seconds)
    #[serde(default = "default_search_timeout_secs")]
    pub search_timeout_secs: u64,

    /// Registry download timeout (seconds)
    #[serde(default = "default_registry_timeout_secs")]
    pub registry_timeout_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            registry_url: default_registry_url(),
            search_api_base: default_search_api_base(),
            github_token: None,
            ecosystem_marker: default_ecosystem_marker(),
            query_marker: default_query_marker(),
            source_language: default_source_language(),
            per_page: default_per_page(),
            search_delay_ms: default_search_delay_ms(),
            rate_limit_buffer_secs: default_rate_limit_buffer_secs(),
            max_rate_limit_wait_secs: default_max_rate_limit_wait_secs(),
            search_timeout_secs: default_search_timeout_secs(),
            registry_timeout_secs: default_registry_timeout_secs(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "pretty", "json", "compact"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}
fn default_custom_nodes_dir() -> String {
    "custom_nodes".to_string()
}
fn default_scan_workers() -> usize {
    num_cpus::get()
}
fn default_mapping_variable() -> String {
    "NODE_CLASS_MAPPINGS".to_string()
}
fn default_registry_url() -> String {
    "https://raw.githubusercontent.com/ltdrdata/ComfyUI-Manager/main/extension-node-map.json"
        .to_string()
}
fn default_search_api_base() -> String {
    "https://api.github.com".to_string()
}
fn default_ecosystem_marker() -> String {
    "comfy".to_string()
}
fn default_query_marker() -> String {
    "comfyui".to_string()
}
fn default_source_language() -> String {
    "python".to_string()
}
fn default_per_page() -> u32 {
    5
}
fn default_search_delay_ms() -> u64 {
    1000
}
fn default_rate_limit_buffer_secs() -> u64 {
    5
}
fn default_max_rate_limit_wait_secs() -> u64 {
    900
}
fn default_search_timeout_secs() -> u64 {
    10
}
fn default_registry_timeout_secs() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

impl NodeScoutConfig {
    /// Directory holding persisted census records
    pub fn cache_dir(&self) -> PathBuf {
        if let Some(dir) = &self.census.cache_dir {
            return dir.clone();
        }
        dirs::cache_dir()
            .map(|d| d.join("nodescout"))
            .unwrap_or_else(|| PathBuf::from(".cache").join("nodescout"))
    }

    /// `custom_nodes` directory of the configured installation, if any
    pub fn custom_nodes_path(&self) -> Option<PathBuf> {
        self.installation
            .root
            .as_ref()
            .map(|root| root.join(&self.installation.custom_nodes_dir))
    }
}

/// Configuration manager with layered loading
pub struct ConfigManager {
    config: NodeScoutConfig,
    config_path: Option<PathBuf>,
    env_file: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with the following precedence:
    /// 1. Environment variables (.env file)
    /// 2. Config file (.nodescout.toml)
    /// 3. Sensible defaults
    ///
    /// Runs before any subscriber exists; call [`ConfigManager::log_summary`]
    /// once tracing is installed.
    pub fn load() -> Result<Self, ConfigError> {
        let env_file = Self::load_dotenv();

        let (config, config_path) = Self::load_config_file()?;
        let config = Self::apply_env_overrides(config);
        Self::validate_config(&config)?;

        Ok(Self {
            config,
            config_path,
            env_file,
        })
    }

    /// Where the configuration came from, one line per source.
    pub fn summary(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(env_file) = &self.env_file {
            lines.push(format!("Env file: {}", env_file.display()));
        }
        lines.push(match &self.config_path {
            Some(path) => format!("Config file: {}", path.display()),
            None => "Config file: none (using defaults)".to_string(),
        });
        lines.push(format!(
            "Installation root: {}",
            self.config
                .installation
                .root
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "not set".to_string())
        ));
        lines.push(format!(
            "Search credential: {}",
            if self.config.resolver.github_token.is_some() {
                "present"
            } else {
                "absent"
            }
        ));
        lines
    }

    pub fn log_summary(&self) {
        for line in self.summary() {
            info!("{}", line);
        }
    }

    /// Build a manager around an explicit config (tests, embedding)
    pub fn from_config(config: NodeScoutConfig) -> Result<Self, ConfigError> {
        Self::validate_config(&config)?;
        Ok(Self {
            config,
            config_path: None,
            env_file: None,
        })
    }

    /// Load .env file if it exists; returns the file that was applied.
    /// A malformed file is reported on stderr since no subscriber exists yet.
    fn load_dotenv() -> Option<PathBuf> {
        let candidate = if Path::new(".env").exists() {
            PathBuf::from(".env")
        } else {
            dirs::home_dir()
                .map(|home| home.join(".nodescout.env"))
                .filter(|path| path.exists())?
        };

        match dotenv::from_path(&candidate) {
            Ok(()) => Some(candidate),
            Err(e) => {
                eprintln!("Failed to load {}: {}", candidate.display(), e);
                None
            }
        }
    }

    /// Find and load config file
    /// Search order:
    /// 1. ./.nodescout.toml (current directory)
    /// 2. ~/.nodescout/config.toml (user config)
    /// 3. Use defaults
    fn load_config_file() -> Result<(NodeScoutConfig, Option<PathBuf>), ConfigError> {
        let local_config = Path::new(".nodescout.toml");
        if local_config.exists() {
            let config = Self::read_toml_file(local_config)?;
            return Ok((config, Some(local_config.to_path_buf())));
        }

        if let Some(user_config) = default_config_path() {
            if user_config.exists() {
                let config = Self::read_toml_file(&user_config)?;
                return Ok((config, Some(user_config)));
            }
        }

        Ok((NodeScoutConfig::default(), None))
    }

    /// Read TOML config file
    pub fn read_toml_file(path: &Path) -> Result<NodeScoutConfig, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(mut config: NodeScoutConfig) -> NodeScoutConfig {
        if let Ok(location) = std::env::var("COMFYUI_LOCATION") {
            let trimmed = location.trim();
            if !trimmed.is_empty() {
                config.installation.root = Some(PathBuf::from(trimmed));
            }
        }
        if let Ok(token) = std::env::var("GITHUB_TOKEN") {
            let trimmed = token.trim();
            if !trimmed.is_empty() {
                config.resolver.github_token = Some(SecretString::from(trimmed.to_string()));
            }
        }
        if let Ok(dir) = std::env::var("NODESCOUT_CACHE_DIR") {
            config.census.cache_dir = Some(PathBuf::from(dir));
        }
        if let Ok(workers) = std::env::var("NODESCOUT_SCAN_WORKERS") {
            if let Ok(n) = workers.parse() {
                config.census.scan_workers = n;
            }
        }
        if let Ok(delay) = std::env::var("NODESCOUT_SEARCH_DELAY_MS") {
            if let Ok(ms) = delay.parse() {
                config.resolver.search_delay_ms = ms;
            }
        }
        if let Ok(url) = std::env::var("NODESCOUT_REGISTRY_URL") {
            config.resolver.registry_url = url;
        }

        // RUST_LOG is a full filter directive; the subscriber reads it directly.
        config
    }

    /// Validate configuration
    fn validate_config(config: &NodeScoutConfig) -> Result<(), ConfigError> {
        match config.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    other
                )))
            }
        }

        match config.logging.format.as_str() {
            "pretty" | "json" | "compact" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {}. Must be one of: pretty, json, compact",
                    other
                )))
            }
        }

        if config.census.scan_workers == 0 {
            return Err(ConfigError::ValidationError(
                "census.scan_workers must be at least 1".to_string(),
            ));
        }

        if config.resolver.ecosystem_marker.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "resolver.ecosystem_marker must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &NodeScoutConfig {
        &self.config
    }

    /// Mutable access for command-line overrides
    pub fn config_mut(&mut self) -> &mut NodeScoutConfig {
        &mut self.config
    }

    /// Get the path to the config file that was loaded, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Create a default config file
    pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        let config = NodeScoutConfig::default();
        let toml_str =
            toml::to_string_pretty(&config).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::ReadError(e.to_string()))?;
            }
        }

        std::fs::write(path, toml_str).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = NodeScoutConfig::default();
        assert_eq!(config.installation.custom_nodes_dir, "custom_nodes");
        assert_eq!(config.census.mapping_variable, "NODE_CLASS_MAPPINGS");
        assert_eq!(config.resolver.ecosystem_marker, "comfy");
        assert_eq!(config.resolver.search_delay_ms, 1000);
        assert!(config.resolver.github_token.is_none());
    }

    #[test]
    fn test_config_validation() {
        let config = NodeScoutConfig::default();
        assert!(ConfigManager::validate_config(&config).is_ok());

        let mut bad_level = config.clone();
        bad_level.logging.level = "loud".to_string();
        assert!(ConfigManager::validate_config(&bad_level).is_err());

        let mut no_workers = config.clone();
        no_workers.census.scan_workers = 0;
        assert!(ConfigManager::validate_config(&no_workers).is_err());

        let mut no_marker = config;
        no_marker.resolver.ecosystem_marker = "  ".to_string();
        assert!(ConfigManager::validate_config(&no_marker).is_err());
    }

    #[test]
    fn test_default_config_file_round_trips() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        ConfigManager::create_default_config(&path).unwrap();
        let loaded = ConfigManager::read_toml_file(&path).unwrap();

        assert_eq!(loaded.resolver.per_page, 5);
        assert_eq!(loaded.logging.format, "pretty");
        assert!(loaded.resolver.github_token.is_none());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[installation]\nroot = \"/opt/comfy\"\n\n[resolver]\nsearch_delay_ms = 250\n",
        )
        .unwrap();

        let config = ConfigManager::read_toml_file(&path).unwrap();
        assert_eq!(config.installation.root, Some(PathBuf::from("/opt/comfy")));
        assert_eq!(config.installation.custom_nodes_dir, "custom_nodes");
        assert_eq!(config.resolver.search_delay_ms, 250);
        assert_eq!(
            config.custom_nodes_path(),
            Some(PathBuf::from("/opt/comfy").join("custom_nodes"))
        );
    }

    #[test]
    fn test_rust_log_directives_do_not_fail_validation() {
        std::env::set_var("RUST_LOG", "nodescout=debug,reqwest=warn");

        let config = ConfigManager::apply_env_overrides(NodeScoutConfig::default());
        assert_eq!(config.logging.level, "info");
        assert!(ConfigManager::validate_config(&config).is_ok());
        assert!(ConfigManager::load().is_ok());

        std::env::remove_var("RUST_LOG");
    }

    #[test]
    fn test_summary_reports_sources_without_secrets() {
        let mut config = NodeScoutConfig::default();
        config.installation.root = Some(PathBuf::from("/opt/comfy"));
        let manager = ConfigManager::from_config(config.clone()).unwrap();
        let summary = manager.summary();
        assert!(summary.contains(&"Config file: none (using defaults)".to_string()));
        assert!(summary.contains(&"Installation root: /opt/comfy".to_string()));
        assert!(summary.contains(&"Search credential: absent".to_string()));

        config.resolver.github_token = Some(SecretString::from("ghp_secret".to_string()));
        let summary = ConfigManager::from_config(config).unwrap().summary();
        assert!(summary.contains(&"Search credential: present".to_string()));
        assert!(summary.iter().all(|line| !line.contains("ghp_secret")));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let result = ConfigManager::read_toml_file(&temp_dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }
}
