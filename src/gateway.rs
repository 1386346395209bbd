//! Production gateway: admission control, caching and maintenance around
//! the fallback engine.
//!
//! # Request pipeline
//!
//! 1. Rate limit the client
//! 2. Validate the serialized request size
//! 3. Acquire a concurrency slot (may wait)
//! 4. Preprocess the query
//! 5. Serve from cache, or run the fallback engine
//! 6. Cache accepted results
//!
//! A request whose params carry `"use_cache": false` neither reads nor writes
//! the cache. The flag is removed before the params reach the cache key or
//! any provider.
//! 7. Release the slot and run maintenance if it is due
//!
//! Steps 1 and 2 reject before any provider is called or slot is taken.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::cache::{CacheStats, TieredCache};
use crate::config::RouterConfig;
use crate::error::Result;
use crate::events::FallbackEvent;
use crate::gate::{ConcurrencyGate, validate_request_size};
use crate::http::build_client;
use crate::ledger::ExecutionRecord;
use crate::orchestrator::{FallbackEngine, rejection_error};
use crate::orchestrator::query::{feedback, preprocess_query};
use crate::rate_limit::{RateLimiter, RateLimiterStats};
use crate::registry::ToolRegistry;
use crate::scoring::calculate_confidence;
use crate::tool::validate_result;
use crate::tools::build_default_registry;
use crate::types::{SearchParams, SearchPayload};

/// Fraction of a capacity above which a health check turns to warning.
const HEALTH_HEADROOM: f64 = 0.9;

/// Success rate (percent) at or below which the engine check warns.
const MIN_HEALTHY_SUCCESS_RATE: f64 = 80.0;

/// Request param that turns the cache off for one request. Defaults to true.
pub const USE_CACHE_PARAM: &str = "use_cache";

/// Outcome of one admitted request.
#[derive(Debug, Clone, Serialize)]
pub struct RouterResponse {
    pub request_id: Uuid,
    pub client_id: String,
    pub success: bool,
    /// The query actually searched, after preprocessing.
    pub query: String,
    pub payload: Option<SearchPayload>,
    pub error: Option<String>,
    pub confidence: f64,
    pub duration_ms: u64,
    pub source_tool: Option<String>,
    pub cached: bool,
    pub fell_back: bool,
    pub feedback: String,
    /// Tool attempts made for this request, oldest first. Empty on cache hits.
    pub execution_log: Vec<ExecutionRecord>,
}

/// Aggregate counters and component snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    pub total_requests: u64,
    pub successful_requests: u64,
    /// Percentage of admitted requests that succeeded.
    pub success_rate: f64,
    pub fallback_count: u64,
    /// Percentage of admitted requests answered by a fallback tool.
    pub fallback_rate: f64,
    pub cache_hits: u64,
    pub rejected_requests: u64,
    pub available_tools: usize,
    pub registered_tools: usize,
    pub tool_availability: BTreeMap<String, bool>,
    pub active_requests: usize,
    pub max_concurrent: usize,
    pub ledger_size: usize,
    pub max_history: usize,
    pub rate_limiter: RateLimiterStats,
    pub cache: CacheStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Healthy,
    Warning,
    Failing,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthMetrics {
    pub active_requests: usize,
    pub ledger_size: usize,
    pub success_rate: f64,
}

/// Health report for monitoring.
#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub checks: BTreeMap<&'static str, CheckStatus>,
    pub metrics: HealthMetrics,
}

/// What a maintenance pass cleaned up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub history_dropped: usize,
    pub clients_swept: usize,
}

/// The search router.
///
/// Share it behind an `Arc`; every method takes `&self`.
pub struct Router {
    engine: FallbackEngine,
    limiter: RateLimiter,
    gate: ConcurrencyGate,
    cache: TieredCache,
    min_confidence: f64,
    max_request_bytes: usize,
    max_history: usize,
    cleanup_interval: Duration,
    last_cleanup: Mutex<Instant>,
    total: AtomicU64,
    successes: AtomicU64,
    fallbacks: AtomicU64,
    cache_hits: AtomicU64,
    rejected: AtomicU64,
}

impl Router {
    /// Build a router with the shipped providers.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn from_config(config: RouterConfig) -> Result<Self> {
        config.validate()?;
        let registry = build_default_registry(&config)?;
        Self::new(config, registry)
    }

    /// Build a router over a custom registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: RouterConfig, registry: ToolRegistry) -> Result<Self> {
        config.validate()?;
        let cache_client = build_client(Duration::from_millis(config.cache.io_timeout_ms))?;
        let cache = TieredCache::from_config(&config.cache, cache_client);
        Ok(Self::with_cache(config, registry, cache))
    }

    /// Build a router over a custom registry and cache.
    ///
    /// The configuration is assumed valid.
    pub fn with_cache(config: RouterConfig, registry: ToolRegistry, cache: TieredCache) -> Self {
        let engine = FallbackEngine::new(
            Arc::new(registry),
            config.memory.max_execution_history,
            Duration::from_secs(config.engine.timeout_seconds),
        );
        tracing::info!(
            tools = ?engine.registry().list_tools(),
            max_concurrent = config.rate_limit.max_concurrent_requests,
            "search router initialised"
        );
        Self {
            engine,
            limiter: RateLimiter::new(config.rate_limit.clone()),
            gate: ConcurrencyGate::new(config.rate_limit.max_concurrent_requests),
            cache,
            min_confidence: config.engine.min_confidence,
            max_request_bytes: config.memory.max_request_size_bytes,
            max_history: config.memory.max_execution_history,
            cleanup_interval: Duration::from_secs(config.memory.cleanup_interval_seconds),
            last_cleanup: Mutex::new(Instant::now()),
            total: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            fallbacks: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// The fallback engine, for its ledger and registry.
    #[must_use]
    pub fn engine(&self) -> &FallbackEngine {
        &self.engine
    }

    /// Subscribe to fallback transitions across all requests.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<FallbackEvent> {
        self.engine.subscribe()
    }

    /// Process one search request.
    ///
    /// Provider failures never surface as errors: they are reported through
    /// `success == false` in the response.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::RateLimited`](crate::RouterError::RateLimited)
    /// or [`RouterError::RequestTooLarge`](crate::RouterError::RequestTooLarge)
    /// if the request is rejected at admission.
    pub async fn process_request(
        &self,
        input: &str,
        client_id: &str,
        params: &SearchParams,
    ) -> Result<RouterResponse> {
        let started = Instant::now();

        if let Err(err) = self.admit(input, client_id, params) {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(err);
        }

        let permit = self.gate.acquire(client_id, input).await?;
        let request_id = permit.request_id();
        self.total.fetch_add(1, Ordering::Relaxed);

        let span = tracing::info_span!("request", %request_id, client = client_id);
        let response = self
            .handle(request_id, input, client_id, params, started)
            .instrument(span)
            .await;
        drop(permit);

        self.maintain_if_due();
        Ok(response)
    }

    fn admit(&self, input: &str, client_id: &str, params: &SearchParams) -> Result<()> {
        self.limiter.check(client_id)?;
        validate_request_size(input, params, self.max_request_bytes)?;
        Ok(())
    }

    async fn handle(
        &self,
        request_id: Uuid,
        input: &str,
        client_id: &str,
        params: &SearchParams,
        started: Instant,
    ) -> RouterResponse {
        let query = preprocess_query(input);
        let (params, use_cache) = split_cache_flag(params);
        let params = &params;
        tracing::debug!(query = %query, use_cache, "processing request");

        let cached = if use_cache {
            self.cache.get(&query, params).await
        } else {
            None
        };
        if let Some(payload) = cached {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            self.successes.fetch_add(1, Ordering::Relaxed);
            let response = RouterResponse {
                request_id,
                client_id: client_id.to_owned(),
                success: true,
                confidence: calculate_confidence(&payload, 1.0),
                payload: Some(payload),
                query,
                error: None,
                duration_ms: elapsed_ms(started),
                source_tool: None,
                cached: true,
                fell_back: false,
                feedback: "Results served from cache.".to_owned(),
                execution_log: Vec::new(),
            };
            tracing::info!(duration_ms = response.duration_ms, "request served from cache");
            return response;
        }

        let outcome = self.engine.run(&query, self.min_confidence, params).await;
        let result = outcome.result;
        let (error, feedback) = match validate_result(&result, self.min_confidence) {
            Ok(()) => (None, feedback(&result, outcome.fell_back)),
            Err(rejection) => {
                let err = rejection_error(&result, rejection);
                tracing::error!(
                    attempts = outcome.attempts.len(),
                    duration_ms = elapsed_ms(started),
                    error = %err,
                    "request failed"
                );
                let reason = result
                    .error
                    .clone()
                    .unwrap_or_else(|| rejection.reason().to_owned());
                let feedback = if result.is_success() {
                    format!("Unable to retrieve results. {reason}")
                } else {
                    feedback(&result, false)
                };
                (Some(reason), feedback)
            }
        };
        let success = error.is_none();

        if success {
            self.successes.fetch_add(1, Ordering::Relaxed);
            if outcome.fell_back {
                self.fallbacks.fetch_add(1, Ordering::Relaxed);
            }
            if let Some(payload) = result.payload.as_ref().filter(|_| use_cache) {
                self.cache.store(&query, input, params, payload, None).await;
            }
        }

        let response = RouterResponse {
            request_id,
            client_id: client_id.to_owned(),
            success,
            query,
            confidence: result.confidence,
            source_tool: result.source().map(str::to_owned),
            payload: result.payload,
            error,
            duration_ms: elapsed_ms(started),
            cached: false,
            fell_back: outcome.fell_back,
            feedback,
            execution_log: outcome.attempts,
        };

        if response.success {
            tracing::info!(
                source = response.source_tool.as_deref().unwrap_or("unknown"),
                fell_back = response.fell_back,
                duration_ms = response.duration_ms,
                "request complete"
            );
        }
        response
    }

    /// Compact the ledger and sweep idle rate-limit clients.
    ///
    /// The ledger already drops its oldest record once it holds
    /// `max_execution_history` entries, so compaction only reports drops if
    /// that bound was bypassed; the sweep does the real work.
    pub fn maintain(&self) -> MaintenanceReport {
        let report = MaintenanceReport {
            history_dropped: self.engine.ledger().compact(self.max_history),
            clients_swept: self.limiter.sweep(),
        };
        *self.last_cleanup.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
        tracing::info!(
            history_dropped = report.history_dropped,
            clients_swept = report.clients_swept,
            "maintenance completed"
        );
        report
    }

    /// Run [`maintain`](Self::maintain) if the cleanup interval has elapsed.
    fn maintain_if_due(&self) {
        let due = self
            .last_cleanup
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .elapsed()
            >= self.cleanup_interval;
        if due {
            self.maintain();
        }
    }

    /// Run maintenance every cleanup interval until `shutdown` is cancelled.
    pub fn spawn_maintenance(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let router = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(router.cleanup_interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        tracing::debug!("maintenance task stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        router.maintain();
                    }
                }
            }
        })
    }

    /// Remove cached results whose query contains `pattern`, or all of them.
    pub async fn invalidate_cache(&self, pattern: Option<&str>) -> usize {
        self.cache.invalidate(pattern).await
    }

    /// Request counters plus snapshots of the limiter, gate, ledger and cache.
    pub async fn statistics(&self) -> Statistics {
        let total = self.total.load(Ordering::Relaxed);
        let successes = self.successes.load(Ordering::Relaxed);
        let fallbacks = self.fallbacks.load(Ordering::Relaxed);
        let registry = self.engine.registry();

        Statistics {
            total_requests: total,
            successful_requests: successes,
            success_rate: percent(successes, total),
            fallback_count: fallbacks,
            fallback_rate: percent(fallbacks, total),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            rejected_requests: self.rejected.load(Ordering::Relaxed),
            available_tools: registry.available_tools().len(),
            registered_tools: registry.len(),
            tool_availability: registry.availability().into_iter().collect(),
            active_requests: self.gate.active_count(),
            max_concurrent: self.gate.capacity(),
            ledger_size: self.engine.ledger().len(),
            max_history: self.max_history,
            rate_limiter: self.limiter.stats(),
            cache: self.cache.stats().await,
        }
    }

    /// Health report.
    ///
    /// `unhealthy` when no tool is available; `degraded` when any other
    /// check warns. Before the first request the success check passes.
    pub async fn health(&self) -> Health {
        let total = self.total.load(Ordering::Relaxed);
        let success_rate = percent(self.successes.load(Ordering::Relaxed), total);
        let ledger_size = self.engine.ledger().len();
        let active = self.gate.active_count();

        let warn_if = |bad: bool| {
            if bad {
                CheckStatus::Warning
            } else {
                CheckStatus::Healthy
            }
        };

        let mut checks = BTreeMap::new();
        checks.insert(
            "memory",
            warn_if(ledger_size as f64 >= self.max_history as f64 * HEALTH_HEADROOM),
        );
        checks.insert(
            "concurrency",
            warn_if(active as f64 >= self.gate.capacity() as f64 * HEALTH_HEADROOM),
        );
        checks.insert(
            "success_rate",
            warn_if(total > 0 && success_rate <= MIN_HEALTHY_SUCCESS_RATE),
        );
        checks.insert(
            "cache",
            warn_if(self.cache.is_enabled() && !self.cache.is_available().await),
        );
        checks.insert(
            "tools",
            if self.engine.registry().available_tools().is_empty() {
                CheckStatus::Failing
            } else {
                CheckStatus::Healthy
            },
        );

        let status = if checks.values().any(|c| *c == CheckStatus::Failing) {
            HealthStatus::Unhealthy
        } else if checks.values().any(|c| *c == CheckStatus::Warning) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        Health {
            status,
            timestamp: Utc::now(),
            checks,
            metrics: HealthMetrics {
                active_requests: active,
                ledger_size,
                success_rate,
            },
        }
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("engine", &self.engine)
            .field("gate", &self.gate.stats())
            .field("cache", &self.cache)
            .finish()
    }
}

/// Remove the per-request cache switch from `params`.
fn split_cache_flag(params: &SearchParams) -> (SearchParams, bool) {
    let mut params = params.clone();
    let use_cache = params
        .remove(USE_CACHE_PARAM)
        .and_then(|v| v.as_bool())
        .unwrap_or(true);
    (params, use_cache)
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
