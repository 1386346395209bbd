//! In-process LRU cache backed by [`moka`].
//!
//! Capacity is bounded and eviction is least-recently-used. Each entry
//! carries its own TTL through an [`Expiry`] policy, so results cached with
//! different TTLs expire independently. Expired entries read as absent.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;
use moka::policy::EvictionPolicy;

use super::key::{CacheKey, matches_pattern};
use super::{CacheBackend, CachedEntry};
use crate::error::Result;

#[derive(Debug)]
struct Stored {
    entry: CachedEntry,
    ttl: Duration,
}

/// Expires every entry after its own TTL, restarting on overwrite.
struct PerEntryTtl;

impl Expiry<String, Arc<Stored>> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Arc<Stored>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Arc<Stored>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Bounded in-memory result cache.
pub struct MemoryCache {
    cache: Cache<String, Arc<Stored>>,
}

impl MemoryCache {
    /// Create a cache holding at most `max_entries` results.
    pub fn new(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries.max(1))
            .eviction_policy(EvictionPolicy::lru())
            .expire_after(PerEntryTtl)
            .build();
        Self { cache }
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<CachedEntry>> {
        Ok(self
            .cache
            .get(key.fingerprint())
            .await
            .map(|stored| stored.entry.clone()))
    }

    async fn set(&self, key: &CacheKey, entry: CachedEntry, ttl: Duration) -> Result<()> {
        self.cache
            .insert(key.fingerprint().to_owned(), Arc::new(Stored { entry, ttl }))
            .await;
        // Apply pending evictions so capacity and counts are exact afterwards.
        self.cache.run_pending_tasks().await;
        Ok(())
    }

    async fn invalidate(&self, pattern: Option<&str>) -> Result<usize> {
        let doomed: Vec<Arc<String>> = self
            .cache
            .iter()
            .filter(|(_, stored)| pattern.is_none_or(|p| matches_pattern(&stored.entry.query, p)))
            .map(|(key, _)| key)
            .collect();

        for key in &doomed {
            self.cache.invalidate(key.as_str()).await;
        }
        self.cache.run_pending_tasks().await;
        Ok(doomed.len())
    }

    async fn entry_count(&self) -> Result<u64> {
        self.cache.run_pending_tasks().await;
        Ok(self.cache.entry_count())
    }

    async fn is_available(&self) -> bool {
        true
    }
}
