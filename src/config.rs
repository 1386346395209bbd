//! Router configuration with sensible defaults.
//!
//! [`RouterConfig`] controls provider credentials, the fallback engine,
//! admission control, history bookkeeping and caching. All values are static
//! for the lifetime of a [`Router`](crate::Router); nothing reloads at runtime.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RouterError};

/// Top-level configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub tools: ToolsConfig,
    pub engine: EngineConfig,
    pub rate_limit: RateLimitConfig,
    pub memory: MemoryConfig,
    pub cache: CacheConfig,
}

/// Provider credentials and endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Tavily API key. Tavily is unavailable without one.
    pub tavily_api_key: Option<String>,
    pub tavily_base_url: String,
    /// Jina API key. Optional: Jina answers anonymous requests with lower limits.
    pub jina_api_key: Option<String>,
    pub jina_base_url: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            tavily_api_key: None,
            tavily_base_url: "https://api.tavily.com".to_owned(),
            jina_api_key: None,
            jina_base_url: "https://s.jina.ai".to_owned(),
        }
    }
}

/// Fallback engine behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Per-tool invocation deadline in seconds.
    pub timeout_seconds: u64,
    /// Minimum confidence for a result to be accepted.
    pub min_confidence: f64,
    /// Default number of hits requested from each provider.
    pub max_results: usize,
    /// Tavily search depth: `"basic"` or `"advanced"`.
    pub search_depth: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            min_confidence: 0.5,
            max_results: 5,
            search_depth: "basic".to_owned(),
        }
    }
}

/// Per-client rate limits and global concurrency.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_requests_per_minute: usize,
    pub max_requests_per_hour: usize,
    /// Capacity of the concurrency gate.
    pub max_concurrent_requests: usize,
    /// Maximum requests per client in any 10-second window.
    pub burst_limit: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests_per_minute: 60,
            max_requests_per_hour: 1000,
            max_concurrent_requests: 100,
            burst_limit: 10,
        }
    }
}

/// History bookkeeping and request-size limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Maximum number of execution history entries kept.
    pub max_execution_history: usize,
    /// Maximum serialized request size in bytes.
    pub max_request_size_bytes: usize,
    /// Seconds between maintenance passes (ledger compaction, limiter sweep).
    pub cleanup_interval_seconds: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_execution_history: 1000,
            max_request_size_bytes: 10 * 1024 * 1024,
            cleanup_interval_seconds: 300,
        }
    }
}

/// Result cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Set to false to disable caching entirely.
    pub enabled: bool,
    /// Base URL of a Redis-over-HTTP endpoint. When `None`, only the
    /// in-memory cache is used.
    pub remote_url: Option<String>,
    /// Bearer token for the remote endpoint.
    pub remote_token: Option<String>,
    /// Prefix applied to every remote key.
    pub key_prefix: String,
    pub default_ttl_seconds: u64,
    /// Capacity of the in-memory cache.
    pub max_entries: u64,
    /// Upper bound for a single remote cache operation.
    pub io_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            remote_url: None,
            remote_token: None,
            key_prefix: "sr:".to_owned(),
            default_ttl_seconds: 3600,
            max_entries: 1000,
            io_timeout_ms: 2000,
        }
    }
}

impl RouterConfig {
    /// Validates this configuration, returning an error naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        let engine = &self.engine;
        if engine.timeout_seconds == 0 {
            return Err(RouterError::Config(
                "timeout_seconds must be greater than 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&engine.min_confidence) {
            return Err(RouterError::Config(
                "min_confidence must be between 0.0 and 1.0".into(),
            ));
        }
        if engine.max_results == 0 {
            return Err(RouterError::Config(
                "max_results must be greater than 0".into(),
            ));
        }
        if !matches!(engine.search_depth.as_str(), "basic" | "advanced") {
            return Err(RouterError::Config(
                "search_depth must be \"basic\" or \"advanced\"".into(),
            ));
        }

        let limits = &self.rate_limit;
        if limits.burst_limit == 0
            || limits.max_requests_per_minute == 0
            || limits.max_requests_per_hour == 0
        {
            return Err(RouterError::Config(
                "rate limits must be greater than 0".into(),
            ));
        }
        if limits.burst_limit > limits.max_requests_per_minute
            || limits.max_requests_per_minute > limits.max_requests_per_hour
        {
            return Err(RouterError::Config(
                "rate limits must satisfy burst_limit <= per_minute <= per_hour".into(),
            ));
        }
        if limits.max_concurrent_requests == 0 {
            return Err(RouterError::Config(
                "max_concurrent_requests must be greater than 0".into(),
            ));
        }

        if self.memory.max_execution_history == 0 {
            return Err(RouterError::Config(
                "max_execution_history must be greater than 0".into(),
            ));
        }
        if self.memory.max_request_size_bytes == 0 {
            return Err(RouterError::Config(
                "max_request_size_bytes must be greater than 0".into(),
            ));
        }
        if self.memory.cleanup_interval_seconds == 0 {
            return Err(RouterError::Config(
                "cleanup_interval_seconds must be greater than 0".into(),
            ));
        }

        if self.cache.max_entries == 0 {
            return Err(RouterError::Config(
                "cache max_entries must be greater than 0".into(),
            ));
        }
        if self.cache.io_timeout_ms == 0 {
            return Err(RouterError::Config(
                "cache io_timeout_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| RouterError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| RouterError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
