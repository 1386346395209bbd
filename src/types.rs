//! Core types for tool results, search payloads and provider identification.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Extra request parameters forwarded to tools (`max_results`, `search_depth`, ...).
///
/// A `BTreeMap` keeps keys sorted, so cache fingerprints do not depend on
/// insertion order.
pub type SearchParams = BTreeMap<String, serde_json::Value>;

/// Outcome classification of a single tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    /// The provider answered.
    Success,
    /// The provider or the transport reported an error.
    Failure,
    /// The provider did not answer before the deadline.
    Timeout,
    /// The requested tool does not exist, or no tool is available.
    NotFound,
}

impl ToolStatus {
    /// Returns the stable lowercase label used in logs and history.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Timeout => "timeout",
            Self::NotFound => "not_found",
        }
    }
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single hit returned by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Title of the page.
    pub title: String,
    /// URL of the page.
    pub url: String,
    /// Extracted text content or snippet.
    pub content: String,
    /// Provider-reported relevance in `[0.0, 1.0]`.
    pub score: f64,
}

/// Structured payload produced by a successful tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPayload {
    /// The query the provider actually received.
    pub query: String,
    /// Synthesised answer, empty when the provider gave none.
    #[serde(default)]
    pub answer: String,
    /// Individual hits in provider order.
    #[serde(default)]
    pub results: Vec<SearchHit>,
}

impl SearchPayload {
    /// A payload is empty when it carries neither hits nor an answer.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty() && self.answer.trim().is_empty()
    }
}

/// Result of one tool invocation.
///
/// `status == Success` is necessary but not sufficient for the result to be
/// accepted by the fallback engine: the confidence must also reach the
/// threshold and the payload must be non-empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub status: ToolStatus,
    pub payload: Option<SearchPayload>,
    pub error: Option<String>,
    /// Wall time spent in the tool, in milliseconds.
    pub duration_ms: u64,
    /// Quality estimate in `[0.0, 1.0]`.
    pub confidence: f64,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ToolResult {
    /// Build a successful result attributed to `source`.
    pub fn success(payload: SearchPayload, confidence: f64, source: &str) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("source".to_owned(), serde_json::json!(source));
        metadata.insert(
            "result_count".to_owned(),
            serde_json::json!(payload.results.len()),
        );
        Self {
            status: ToolStatus::Success,
            payload: Some(payload),
            error: None,
            duration_ms: 0,
            confidence: confidence.clamp(0.0, 1.0),
            metadata,
        }
    }

    /// Build a result with the given non-success status.
    pub fn error(status: ToolStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            payload: None,
            error: Some(message.into()),
            duration_ms: 0,
            confidence: 0.0,
            metadata: BTreeMap::new(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::error(ToolStatus::Failure, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::error(ToolStatus::Timeout, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::error(ToolStatus::NotFound, message)
    }

    /// Set the measured duration.
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Attach one metadata entry.
    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_owned(), value);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }

    /// True when a payload is present and not empty.
    pub fn has_payload(&self) -> bool {
        self.payload.as_ref().is_some_and(|p| !p.is_empty())
    }

    /// Name of the tool that produced this result, if recorded.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(|v| v.as_str())
    }
}

/// Provider kinds shipped with the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolKind {
    /// Tavily search API: structured results plus a synthesised answer.
    Tavily,
    /// Jina search API: works without credentials, rate limited.
    Jina,
}

impl ToolKind {
    /// Returns the human-readable tool name, also used as registry key.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Tavily => "Tavily",
            Self::Jina => "Jina",
        }
    }

    /// Returns the default priority. Lower is tried first.
    pub fn default_priority(&self) -> u32 {
        match self {
            Self::Tavily => 0,
            Self::Jina => 1,
        }
    }

    /// Returns all shipped provider kinds in priority order.
    pub fn all() -> &'static [ToolKind] {
        &[Self::Tavily, Self::Jina]
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
