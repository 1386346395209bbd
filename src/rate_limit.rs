//! Per-client sliding-window rate limiting.
//!
//! Each client has three independent windows: burst (10 s), minute and hour.
//! Every check first purges admissions that left a window, then tests
//! burst → minute → hour and rejects on the first violated limit. Accepted
//! requests are recorded in all three windows.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::error::{Result, RouterError};

const BURST_WINDOW: Duration = Duration::from_secs(10);
const MINUTE_WINDOW: Duration = Duration::from_secs(60);
const HOUR_WINDOW: Duration = Duration::from_secs(3600);

/// Sliding window of admission instants.
#[derive(Debug)]
struct Window {
    span: Duration,
    limit: usize,
    hits: VecDeque<Instant>,
}

impl Window {
    fn new(span: Duration, limit: usize) -> Self {
        Self {
            span,
            limit,
            hits: VecDeque::new(),
        }
    }

    /// Drop admissions at least `span` old.
    fn purge(&mut self, now: Instant) {
        while let Some(&oldest) = self.hits.front() {
            if now.duration_since(oldest) >= self.span {
                self.hits.pop_front();
            } else {
                break;
            }
        }
    }

    fn is_full(&self) -> bool {
        self.hits.len() >= self.limit
    }

    /// Whole seconds until the oldest admission leaves the window.
    fn retry_after_secs(&self, now: Instant) -> u64 {
        self.hits.front().map_or(0, |&oldest| {
            self.span
                .saturating_sub(now.duration_since(oldest))
                .as_secs()
                .saturating_add(1)
        })
    }
}

#[derive(Debug)]
struct ClientWindows {
    burst: Window,
    minute: Window,
    hour: Window,
}

impl ClientWindows {
    fn new(config: &RateLimitConfig) -> Self {
        Self {
            burst: Window::new(BURST_WINDOW, config.burst_limit),
            minute: Window::new(MINUTE_WINDOW, config.max_requests_per_minute),
            hour: Window::new(HOUR_WINDOW, config.max_requests_per_hour),
        }
    }

    fn purge(&mut self, now: Instant) {
        self.burst.purge(now);
        self.minute.purge(now);
        self.hour.purge(now);
    }

    fn is_idle(&self) -> bool {
        self.burst.hits.is_empty() && self.minute.hits.is_empty() && self.hour.hits.is_empty()
    }

    fn check(&self, now: Instant) -> std::result::Result<(), String> {
        if self.burst.is_full() {
            return Err(format!(
                "burst limit exceeded: {} requests in last 10 seconds; retry after {}s",
                self.burst.hits.len(),
                self.burst.retry_after_secs(now)
            ));
        }
        if self.minute.is_full() {
            return Err(format!(
                "{} requests per minute; retry after {}s",
                self.minute.hits.len(),
                self.minute.retry_after_secs(now)
            ));
        }
        if self.hour.is_full() {
            return Err(format!(
                "{} requests per hour; retry after {}s",
                self.hour.hits.len(),
                self.hour.retry_after_secs(now)
            ));
        }
        Ok(())
    }

    fn record(&mut self, now: Instant) {
        self.burst.hits.push_back(now);
        self.minute.hits.push_back(now);
        self.hour.hits.push_back(now);
    }
}

/// Snapshot of limiter state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RateLimiterStats {
    pub unique_clients: usize,
    pub requests_last_burst: usize,
    pub requests_last_minute: usize,
    pub requests_last_hour: usize,
}

/// Rate limiter shared by all requests.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    clients: Mutex<HashMap<String, ClientWindows>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Admit or reject one request from `client_id`.
    ///
    /// Purge, check and record happen under one lock, so concurrent checks
    /// from the same client cannot both take the last slot.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::RateLimited`] naming the violated window.
    pub fn check(&self, client_id: &str) -> Result<()> {
        let now = Instant::now();
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        let windows = clients
            .entry(client_id.to_owned())
            .or_insert_with(|| ClientWindows::new(&self.config));

        windows.purge(now);
        if let Err(reason) = windows.check(now) {
            tracing::warn!(client = client_id, %reason, "request rate limited");
            return Err(RouterError::RateLimited(reason));
        }
        windows.record(now);
        Ok(())
    }

    /// Purge every client and forget those with no recent admissions.
    ///
    /// Returns the number of clients removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        let before = clients.len();
        clients.retain(|_, windows| {
            windows.purge(now);
            !windows.is_idle()
        });
        let removed = before - clients.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = clients.len(), "swept idle rate-limit clients");
        }
        removed
    }

    pub fn stats(&self) -> RateLimiterStats {
        let now = Instant::now();
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        let mut stats = RateLimiterStats {
            unique_clients: clients.len(),
            ..RateLimiterStats::default()
        };
        for windows in clients.values_mut() {
            windows.purge(now);
            stats.requests_last_burst += windows.burst.hits.len();
            stats.requests_last_minute += windows.minute.hits.len();
            stats.requests_last_hour += windows.hour.hits.len();
        }
        stats
    }
}
