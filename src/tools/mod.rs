//! Provider implementations of [`SearchTool`](crate::tool::SearchTool).
//!
//! | Tool   | Priority | Available when      | Confidence scale |
//! |--------|----------|---------------------|------------------|
//! | Tavily | 0        | API key configured  | 1.0              |
//! | Jina   | 1        | always              | 0.9              |

pub mod jina;
pub mod tavily;

use std::sync::Arc;
use std::time::Duration;

pub use jina::JinaTool;
pub use tavily::TavilyTool;

use crate::config::RouterConfig;
use crate::error::Result;
use crate::http::build_client;
use crate::registry::ToolRegistry;
use crate::types::SearchParams;

/// Build a registry holding every shipped provider, sharing one HTTP client.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built.
pub fn build_default_registry(config: &RouterConfig) -> Result<ToolRegistry> {
    let client = build_client(Duration::from_secs(config.engine.timeout_seconds))?;
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(TavilyTool::new(
        &config.tools,
        &config.engine,
        client.clone(),
    )));
    registry.register(Arc::new(JinaTool::new(&config.tools, &config.engine, client)));
    Ok(registry)
}

/// Read an unsigned integer parameter, ignoring values of the wrong type.
pub(crate) fn param_usize(params: &SearchParams, key: &str) -> Option<usize> {
    params
        .get(key)
        .and_then(|v| v.as_u64())
        .and_then(|n| usize::try_from(n).ok())
}

pub(crate) fn param_str<'a>(params: &'a SearchParams, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

/// Read a list of strings. A single string is treated as a one-element list.
pub(crate) fn param_str_list(params: &SearchParams, key: &str) -> Vec<String> {
    match params.get(key) {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_owned))
            .collect(),
        Some(serde_json::Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}
