//! Remote cache over a Redis-compatible HTTP endpoint.
//!
//! Commands are sent as a JSON array (`["SET", key, value, "EX", ttl]`) in a
//! `POST` to the endpoint, which replies `{"result": ...}` or
//! `{"error": "..."}`. Keys are `prefix + sha256 fingerprint`; values are
//! JSON-encoded [`CachedEntry`]s.
//!
//! The backend pings lazily on first use. Any transport failure or timeout
//! marks it down for the rest of the process so the tiered cache switches to
//! memory.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use super::key::{CacheKey, matches_pattern};
use super::{CacheBackend, CachedEntry};
use crate::error::{Result, RouterError};

const STATE_UNKNOWN: u8 = 0;
const STATE_UP: u8 = 1;
const STATE_DOWN: u8 = 2;

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

/// Redis-over-HTTP cache client.
pub struct RemoteCache {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
    prefix: String,
    io_timeout: Duration,
    state: AtomicU8,
}

impl RemoteCache {
    pub fn new(
        client: reqwest::Client,
        url: impl Into<String>,
        token: Option<String>,
        prefix: impl Into<String>,
        io_timeout: Duration,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            token,
            prefix: prefix.into(),
            io_timeout,
            state: AtomicU8::new(STATE_UNKNOWN),
        }
    }

    fn mark_down(&self, reason: &str) {
        if self.state.swap(STATE_DOWN, Ordering::AcqRel) != STATE_DOWN {
            tracing::warn!(reason, "remote cache unavailable, using in-memory cache");
        }
    }

    /// Send one command and return its `result` field.
    async fn command(&self, args: Value) -> Result<Value> {
        let mut request = self.client.post(&self.url).json(&args);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let reply = response.json::<Reply>().await;
            Ok::<_, reqwest::Error>((status, reply))
        };

        let (status, reply) = match tokio::time::timeout(self.io_timeout, exchange).await {
            Err(_) => {
                self.mark_down("timeout");
                return Err(RouterError::CacheUnavailable(format!(
                    "no reply within {}ms",
                    self.io_timeout.as_millis()
                )));
            }
            Ok(Err(err)) => {
                self.mark_down("connection failure");
                return Err(RouterError::CacheUnavailable(err.to_string()));
            }
            Ok(Ok(parts)) => parts,
        };

        if !status.is_success() {
            return Err(RouterError::CacheUnavailable(format!(
                "remote cache returned {}",
                status.as_u16()
            )));
        }
        let reply = reply.map_err(|e| RouterError::Parse(format!("remote cache reply: {e}")))?;
        match reply.error {
            Some(err) => Err(RouterError::CacheUnavailable(err)),
            None => Ok(reply.result),
        }
    }

    async fn fetch(&self, raw_key: &str) -> Result<Option<CachedEntry>> {
        match self.command(json!(["GET", raw_key])).await? {
            Value::String(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| RouterError::Parse(format!("cached entry {raw_key}: {e}"))),
            _ => Ok(None),
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let result = self
            .command(json!(["KEYS", format!("{}*", self.prefix)]))
            .await?;
        Ok(result
            .as_array()
            .map(|keys| {
                keys.iter()
                    .filter_map(|k| k.as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl CacheBackend for RemoteCache {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<CachedEntry>> {
        self.fetch(&key.prefixed(&self.prefix)).await
    }

    async fn set(&self, key: &CacheKey, entry: CachedEntry, ttl: Duration) -> Result<()> {
        let value = serde_json::to_string(&entry)
            .map_err(|e| RouterError::Parse(format!("cannot encode cache entry: {e}")))?;
        self.command(json!([
            "SET",
            key.prefixed(&self.prefix),
            value,
            "EX",
            ttl.as_secs().max(1)
        ]))
        .await?;
        Ok(())
    }

    async fn invalidate(&self, pattern: Option<&str>) -> Result<usize> {
        let mut doomed = Vec::new();
        for raw_key in self.keys().await? {
            let matched = match pattern {
                None => true,
                Some(p) => self
                    .fetch(&raw_key)
                    .await?
                    .is_some_and(|entry| matches_pattern(&entry.query, p)),
            };
            if matched {
                doomed.push(raw_key);
            }
        }
        if doomed.is_empty() {
            return Ok(0);
        }

        let mut args = vec![json!("DEL")];
        args.extend(doomed.into_iter().map(Value::String));
        let deleted = self.command(Value::Array(args)).await?;
        Ok(deleted
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(0))
    }

    async fn entry_count(&self) -> Result<u64> {
        Ok(self.keys().await?.len() as u64)
    }

    async fn is_available(&self) -> bool {
        match self.state.load(Ordering::Acquire) {
            STATE_UP => true,
            STATE_DOWN => false,
            _ => match self.command(json!(["PING"])).await {
                Ok(reply) if reply == "PONG" => {
                    self.state.store(STATE_UP, Ordering::Release);
                    tracing::info!("remote cache connected");
                    true
                }
                Ok(_) => {
                    self.mark_down("unexpected ping reply");
                    false
                }
                Err(err) => {
                    self.mark_down(&err.to_string());
                    false
                }
            },
        }
    }
}
