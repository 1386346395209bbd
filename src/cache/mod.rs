//! Result cache with a remote tier and an in-memory fallback.
//!
//! [`TieredCache`] routes every operation to the remote backend when one is
//! configured and reachable, otherwise to the in-memory LRU. Cache faults
//! are logged and counted but never fail a request: a broken cache behaves
//! like an empty one.

pub mod key;
pub mod memory;
pub mod remote;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use key::CacheKey;
pub use memory::MemoryCache;
pub use remote::RemoteCache;

use crate::config::CacheConfig;
use crate::error::Result;
use crate::types::{SearchParams, SearchPayload};

/// A cached search payload plus what is needed to invalidate it by pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedEntry {
    pub payload: SearchPayload,
    pub cached_at: DateTime<Utc>,
    /// Query as submitted, before normalisation.
    pub query: String,
    pub params: SearchParams,
}

impl CachedEntry {
    pub fn new(query: &str, params: &SearchParams, payload: SearchPayload) -> Self {
        Self {
            payload,
            cached_at: Utc::now(),
            query: query.to_owned(),
            params: params.clone(),
        }
    }
}

/// Storage backend for cached results.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Short label used in logs and statistics.
    fn name(&self) -> &'static str;

    async fn get(&self, key: &CacheKey) -> Result<Option<CachedEntry>>;

    async fn set(&self, key: &CacheKey, entry: CachedEntry, ttl: Duration) -> Result<()>;

    /// Remove entries whose original query contains `pattern`
    /// (case-insensitive), or every entry when `pattern` is `None`.
    ///
    /// Returns the number of entries removed.
    async fn invalidate(&self, pattern: Option<&str>) -> Result<usize>;

    async fn entry_count(&self) -> Result<u64>;

    async fn is_available(&self) -> bool;
}

/// Snapshot of cache activity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub backend: &'static str,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub errors: u64,
    pub entries: u64,
}

/// Remote-first cache with in-memory fallback.
pub struct TieredCache {
    enabled: bool,
    default_ttl: Duration,
    remote: Option<RemoteCache>,
    memory: MemoryCache,
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

impl TieredCache {
    /// Build the cache described by `config`, reusing `client` for the
    /// remote tier.
    pub fn from_config(config: &CacheConfig, client: reqwest::Client) -> Self {
        let remote = config.remote_url.as_ref().map(|url| {
            RemoteCache::new(
                client,
                url.clone(),
                config.remote_token.clone(),
                config.key_prefix.clone(),
                Duration::from_millis(config.io_timeout_ms),
            )
        });
        Self {
            enabled: config.enabled,
            default_ttl: Duration::from_secs(config.default_ttl_seconds),
            remote,
            memory: MemoryCache::new(config.max_entries),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    /// In-memory only cache.
    pub fn in_memory(max_entries: u64, default_ttl: Duration) -> Self {
        Self {
            enabled: true,
            default_ttl,
            remote: None,
            memory: MemoryCache::new(max_entries),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    /// The backend serving requests right now.
    async fn active(&self) -> &dyn CacheBackend {
        match &self.remote {
            Some(remote) if remote.is_available().await => remote as &dyn CacheBackend,
            _ => &self.memory as &dyn CacheBackend,
        }
    }

    fn record_error(&self, backend: &str, op: &str, err: &crate::error::RouterError) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(backend, op, error = %err, "cache operation failed");
    }

    /// Look up a cached payload. Misses, expiry and outages all yield `None`.
    pub async fn get(&self, query: &str, params: &SearchParams) -> Option<SearchPayload> {
        if !self.enabled {
            return None;
        }
        let backend = self.active().await;
        match backend.get(&CacheKey::new(query, params)).await {
            Ok(Some(entry)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(backend = backend.name(), "cache hit");
                Some(entry.payload)
            }
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(err) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.record_error(backend.name(), "get", &err);
                None
            }
        }
    }

    /// Store a payload. `ttl` defaults to the configured TTL.
    ///
    /// Returns whether the payload was stored.
    pub async fn set(
        &self,
        query: &str,
        params: &SearchParams,
        payload: &SearchPayload,
        ttl: Option<Duration>,
    ) -> bool {
        self.store(query, query, params, payload, ttl).await
    }

    /// Store a payload keyed on `query`, remembering `submitted` as the
    /// query to match invalidation patterns against.
    ///
    /// Returns whether the payload was stored.
    pub async fn store(
        &self,
        query: &str,
        submitted: &str,
        params: &SearchParams,
        payload: &SearchPayload,
        ttl: Option<Duration>,
    ) -> bool {
        if !self.enabled {
            return false;
        }
        let backend = self.active().await;
        let entry = CachedEntry::new(submitted, params, payload.clone());
        let ttl = ttl.unwrap_or(self.default_ttl);
        match backend.set(&CacheKey::new(query, params), entry, ttl).await {
            Ok(()) => {
                tracing::debug!(backend = backend.name(), ttl_secs = ttl.as_secs(), "cached result");
                true
            }
            Err(err) => {
                self.record_error(backend.name(), "set", &err);
                false
            }
        }
    }

    /// Remove matching entries; `None` clears the cache. Returns the count removed.
    pub async fn invalidate(&self, pattern: Option<&str>) -> usize {
        let backend = self.active().await;
        match backend.invalidate(pattern).await {
            Ok(count) => {
                tracing::info!(backend = backend.name(), pattern, count, "cache invalidated");
                count
            }
            Err(err) => {
                self.record_error(backend.name(), "invalidate", &err);
                0
            }
        }
    }

    /// Whether caching is switched on in the configuration.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the cache can serve requests at all.
    pub async fn is_available(&self) -> bool {
        self.enabled && self.active().await.is_available().await
    }

    /// Counters plus the active backend's entry count.
    pub async fn stats(&self) -> CacheStats {
        let backend = self.active().await;
        let entries = backend.entry_count().await.unwrap_or_else(|err| {
            self.record_error(backend.name(), "count", &err);
            0
        });
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            enabled: self.enabled,
            backend: backend.name(),
            hits,
            misses,
            hit_rate: if lookups > 0 {
                hits as f64 / lookups as f64
            } else {
                0.0
            },
            errors: self.errors.load(Ordering::Relaxed),
            entries,
        }
    }
}

impl std::fmt::Debug for TieredCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCache")
            .field("enabled", &self.enabled)
            .field("remote", &self.remote.is_some())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn payload(answer: &str) -> SearchPayload {
        SearchPayload {
            query: "q".into(),
            answer: answer.into(),
            results: vec![],
        }
    }

    fn client() -> reqwest::Client {
        crate::http::build_client(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn memory_round_trip_counts_hits_and_misses() {
        let cache = TieredCache::in_memory(100, Duration::from_secs(60));
        let params = SearchParams::new();
        assert!(cache.get("rust", &params).await.is_none());
        assert!(cache.set("rust", &params, &payload("yes"), None).await);
        assert_eq!(cache.get("RUST ", &params).await.unwrap().answer, "yes");

        let stats = cache.stats().await;
        assert_eq!(stats.backend, "memory");
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn explicit_ttl_expires_entry() {
        let cache = TieredCache::in_memory(100, Duration::from_secs(3600));
        let params = SearchParams::new();
        cache
            .set("brief", &params, &payload("x"), Some(Duration::from_millis(50)))
            .await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(cache.get("brief", &params).await.is_none());
    }

    #[tokio::test]
    async fn disabled_cache_stores_nothing() {
        let config = CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        };
        let cache = TieredCache::from_config(&config, client());
        let params = SearchParams::new();
        assert!(!cache.set("q", &params, &payload("x"), None).await);
        assert!(cache.get("q", &params).await.is_none());
        assert!(!cache.is_available().await);
    }

    #[tokio::test]
    async fn unreachable_remote_falls_back_to_memory() {
        let config = CacheConfig {
            remote_url: Some("http://127.0.0.1:9".into()),
            io_timeout_ms: 200,
            ..CacheConfig::default()
        };
        let cache = TieredCache::from_config(&config, client());
        let params = SearchParams::new();

        assert!(cache.set("q", &params, &payload("kept"), None).await);
        assert_eq!(cache.get("q", &params).await.unwrap().answer, "kept");
        assert_eq!(cache.stats().await.backend, "memory");
    }

    #[tokio::test]
    async fn reachable_remote_is_preferred() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("PING"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "PONG"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("\"SET\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "OK"})))
            .expect(1)
            .mount(&server)
            .await;

        let config = CacheConfig {
            remote_url: Some(server.uri()),
            ..CacheConfig::default()
        };
        let cache = TieredCache::from_config(&config, client());
        assert!(cache.set("q", &SearchParams::new(), &payload("x"), None).await);
    }

    #[tokio::test]
    async fn remote_errors_are_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("PING"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "PONG"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("\"GET\""))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let config = CacheConfig {
            remote_url: Some(server.uri()),
            ..CacheConfig::default()
        };
        let cache = TieredCache::from_config(&config, client());
        assert!(cache.get("q", &SearchParams::new()).await.is_none());
        assert_eq!(cache.errors.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn stored_entries_match_patterns_on_the_submitted_query() {
        let cache = TieredCache::in_memory(100, Duration::from_secs(60));
        let params = SearchParams::new();
        assert!(
            cache
                .store("rust", "Tell me about Rust", &params, &payload("x"), None)
                .await
        );

        assert!(cache.get("rust", &params).await.is_some());
        assert_eq!(cache.invalidate(Some("tell me about")).await, 1);
        assert!(cache.get("rust", &params).await.is_none());
    }
}
