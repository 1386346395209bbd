//! # search-router
//!
//! Priority-ordered routing of search queries across external providers.
//!
//! A query is tried against the available providers one at a time, in
//! ascending priority. The first result that succeeds with enough
//! confidence and a non-empty payload is returned; anything else makes the
//! router fall back to the next provider. Around that engine sits a
//! production gateway with per-client rate limiting, request-size
//! validation, a concurrency gate and a result cache.
//!
//! ## Design
//!
//! - Providers implement [`SearchTool`] and live in a [`ToolRegistry`]
//! - [`FallbackEngine`] walks the registry, records every attempt in a
//!   bounded ledger and publishes [`FallbackEvent`]s
//! - [`Router`] adds admission control, caching and periodic maintenance
//! - The cache prefers a Redis-compatible HTTP backend and falls back to an
//!   in-process LRU when it is missing or unreachable
//!
//! ## Security
//!
//! - API keys never appear in errors or logs
//! - Queries are logged at debug level or below
//!
//! # Examples
//!
//! ```no_run
//! # async fn example() -> search_router::Result<()> {
//! let router = search_router::Router::from_config(search_router::RouterConfig::default())?;
//! let response = router
//!     .process_request("tell me about rust async", "cli", &Default::default())
//!     .await?;
//! println!("{}", response.feedback);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod gate;
pub mod gateway;
pub mod http;
pub mod ledger;
pub mod orchestrator;
pub mod rate_limit;
pub mod registry;
pub mod scoring;
pub mod tool;
pub mod tools;
pub mod types;

pub use cache::TieredCache;
pub use config::RouterConfig;
pub use error::{Result, RouterError};
pub use events::FallbackEvent;
pub use gateway::{Health, HealthStatus, Router, RouterResponse, Statistics};
pub use ledger::{ExecutionLedger, ExecutionRecord};
pub use orchestrator::{FallbackEngine, FallbackOutcome};
pub use registry::ToolRegistry;
pub use tool::SearchTool;
pub use types::{SearchHit, SearchParams, SearchPayload, ToolKind, ToolResult, ToolStatus};
