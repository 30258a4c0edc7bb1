//! Configuration for the context autopilot
//!
//! Values come from built-in defaults, an optional config file, a `.env` file
//! and `AUTOPILOT__*` environment variables, in increasing precedence.

use crate::context::TokenBudget;
use crate::error::{ContextError, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Autopilot configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AutopilotConfig {
    /// Workspace root that is watched, polled and scanned for coverage gaps
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,

    /// Minimum relevance score (0-100) an item needs to be returned
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f64,

    /// Token budget for the selected context
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,

    /// Compress the selected context to the token budget
    #[serde(default = "default_true")]
    pub auto_compress: bool,

    /// Watch the workspace for file changes while running
    #[serde(default = "default_true")]
    pub watch_enabled: bool,

    /// Files larger than this are never handed to the extractor
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    #[serde(default)]
    pub vcs: VcsConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub watcher: WatcherConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    /// Text-to-vector provider
    #[serde(default = "default_embedding_provider")]
    pub embedding: ProviderConfig,

    /// Prompt-completion provider used for summaries
    #[serde(default = "default_summarizer_provider")]
    pub summarizer: ProviderConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_relevance_threshold() -> f64 {
    40.0
}

fn default_token_budget() -> usize {
    4000
}

fn default_true() -> bool {
    true
}

fn default_max_file_bytes() -> u64 {
    1024 * 1024
}

fn default_embedding_provider() -> ProviderConfig {
    ProviderConfig {
        endpoint: "https://api.openai.com/v1/embeddings".to_string(),
        model: "text-embedding-3-small".to_string(),
        ..ProviderConfig::default()
    }
}

fn default_summarizer_provider() -> ProviderConfig {
    ProviderConfig::default()
}

impl Default for AutopilotConfig {
    fn default() -> Self {
        Self {
            workspace_root: default_workspace_root(),
            relevance_threshold: default_relevance_threshold(),
            token_budget: default_token_budget(),
            auto_compress: true,
            watch_enabled: true,
            max_file_bytes: default_max_file_bytes(),
            vcs: VcsConfig::default(),
            health: HealthConfig::default(),
            watcher: WatcherConfig::default(),
            cache: CacheConfig::default(),
            embedding: default_embedding_provider(),
            summarizer: default_summarizer_provider(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Version-control polling configuration
#[derive(Debug, Clone, Deserialize)]
pub struct VcsConfig {
    #[serde(default = "default_true")]
    pub polling_enabled: bool,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_poll_interval() -> u64 {
    5
}

impl Default for VcsConfig {
    fn default() -> Self {
        Self {
            polling_enabled: true,
            poll_interval_secs: default_poll_interval(),
        }
    }
}

/// Periodic health check configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_check_interval")]
    pub check_interval_mins: u64,

    /// Health scores below this emit a warning event
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: f64,

    #[serde(default = "default_stale_after_days")]
    pub stale_after_days: i64,
}

fn default_check_interval() -> u64 {
    60
}

fn default_warning_threshold() -> f64 {
    70.0
}

fn default_stale_after_days() -> i64 {
    30
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval_mins: default_check_interval(),
            warning_threshold: default_warning_threshold(),
            stale_after_days: default_stale_after_days(),
        }
    }
}

/// File watcher configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WatcherConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_debounce_ms() -> u64 {
    300
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

/// Bounds for the embedding and summary caches
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: u64,

    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

fn default_cache_capacity() -> u64 {
    1000
}

fn default_cache_ttl() -> u64 {
    3600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            ttl_secs: default_cache_ttl(),
        }
    }
}

/// Optional AI provider endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_endpoint")]
    pub endpoint: String,

    /// No key means the provider is not configured and the local fallback is used
    #[serde(default)]
    pub api_key: Option<SecretString>,

    #[serde(default = "default_provider_model")]
    pub model: String,

    #[serde(default = "default_provider_timeout")]
    pub timeout_ms: u64,

    #[serde(default = "default_provider_retries")]
    pub max_retries: usize,
}

fn default_provider_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_provider_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_provider_timeout() -> u64 {
    30_000
}

fn default_provider_retries() -> usize {
    3
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: default_provider_endpoint(),
            api_key: None,
            model: default_provider_model(),
            timeout_ms: default_provider_timeout(),
            max_retries: default_provider_retries(),
        }
    }
}

impl ProviderConfig {
    /// Whether credentials are present
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AutopilotConfig {
    /// Load configuration from an optional file plus `AUTOPILOT__*` variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix("AUTOPILOT")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        Ok(config.from_env())
    }

    /// Apply well-known environment variables on top of this configuration
    pub fn from_env(mut self) -> Self {
        if let Ok(val) = std::env::var("AUTOPILOT_WORKSPACE") {
            self.workspace_root = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("AUTOPILOT_TOKEN_BUDGET") {
            if let Ok(budget) = val.parse() {
                self.token_budget = budget;
            }
        }

        if let Ok(val) = std::env::var("AUTOPILOT_RELEVANCE_THRESHOLD") {
            if let Ok(threshold) = val.parse() {
                self.relevance_threshold = threshold;
            }
        }

        if let Ok(val) = std::env::var("AUTOPILOT_AUTO_COMPRESS") {
            self.auto_compress = val.to_lowercase() == "true" || val == "1";
        }

        if self.embedding.api_key.is_none() {
            if let Ok(key) = std::env::var("OPENAI_API_KEY") {
                self.embedding.api_key = Some(SecretString::new(key));
            }
        }

        if self.summarizer.api_key.is_none() {
            if let Ok(key) = std::env::var("OPENAI_API_KEY") {
                self.summarizer.api_key = Some(SecretString::new(key));
            }
        }

        self
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.relevance_threshold) {
            return Err(ContextError::Configuration(format!(
                "relevance_threshold must be within 0-100, got {}",
                self.relevance_threshold
            )));
        }
        TokenBudget::new(self.token_budget)
            .map_err(|e| ContextError::Configuration(e.to_string()))?;
        if self.vcs.poll_interval_secs == 0 || self.health.check_interval_mins == 0 {
            return Err(ContextError::Configuration(
                "poll and health intervals must be greater than zero".to_string(),
            ));
        }
        if self.watcher.debounce_ms == 0 {
            return Err(ContextError::Configuration(
                "watcher debounce_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.vcs.poll_interval_secs)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health.check_interval_mins * 60)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.watcher.debounce_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AutopilotConfig::default();
        assert_eq!(config.relevance_threshold, 40.0);
        assert!(config.auto_compress);
        assert_eq!(config.max_file_bytes, 1024 * 1024);
        assert_eq!(config.vcs.poll_interval_secs, 5);
        assert_eq!(config.health.check_interval_mins, 60);
        assert_eq!(config.watcher.debounce_ms, 300);
        assert!(!config.embedding.is_configured());
    }

    #[test]
    fn test_validate() {
        assert!(AutopilotConfig::default().validate().is_ok());

        let config = AutopilotConfig {
            token_budget: 0,
            ..AutopilotConfig::default()
        };
        assert!(matches!(config.validate(), Err(ContextError::Configuration(_))));

        let config = AutopilotConfig {
            relevance_threshold: 140.0,
            ..AutopilotConfig::default()
        };
        assert!(config.validate().is_err());

        let mut config = AutopilotConfig::default();
        config.watcher.debounce_ms = 0;
        assert!(matches!(config.validate(), Err(ContextError::Configuration(_))));
    }

    #[test]
    fn test_duration_conversions() {
        let config = AutopilotConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.health_interval(), Duration::from_secs(3600));
        assert_eq!(config.debounce(), Duration::from_millis(300));
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            token_budget = 2000
            relevance_threshold = 55.0

            [health]
            check_interval_mins = 5

            [summarizer]
            api_key = "sk-test"
            model = "local-model"
            "#
        )
        .unwrap();

        let config = AutopilotConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.token_budget, 2000);
        assert_eq!(config.relevance_threshold, 55.0);
        assert_eq!(config.health.check_interval_mins, 5);
        assert_eq!(config.health.warning_threshold, 70.0);
        assert!(config.summarizer.is_configured());
        assert_eq!(config.summarizer.model, "local-model");
    }
}
