//! Trait definition for pluggable search providers.
//!
//! Each provider (Tavily, Jina, or a test double) implements [`SearchTool`]
//! to give the fallback engine a uniform interface for availability checks
//! and query execution.

use async_trait::async_trait;

use crate::error::RouterError;
use crate::types::{SearchParams, ToolResult};

/// A pluggable search provider.
///
/// Implementors talk to one external service and turn its answer into a
/// [`ToolResult`] with a confidence score. Expected provider faults (HTTP
/// status, malformed body) should be reported as a `Failure`/`Timeout`
/// result or as an `Err`; the engine converts both, and also any panic, into
/// a result without letting them escape.
///
/// All implementations must be `Send + Sync`: the registry shares them
/// across concurrent requests.
#[async_trait]
pub trait SearchTool: Send + Sync {
    /// Unique name, used as registry key and in history entries.
    fn name(&self) -> &str;

    /// Priority in the fallback order. Lower is tried first.
    fn priority(&self) -> u32;

    /// Whether the tool is configured well enough to be tried.
    ///
    /// Must be a pure function of configuration.
    fn is_available(&self) -> bool;

    /// Run `query` against the provider.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError`] if the request cannot be completed. The engine
    /// maps [`RouterError::ProviderTimeout`] to a `Timeout` result and
    /// everything else to `Failure`.
    async fn execute(
        &self,
        query: &str,
        params: &SearchParams,
    ) -> Result<ToolResult, RouterError>;
}

/// Why a result was not accepted by [`validate_result`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The status was not `Success`.
    NotSuccessful,
    /// Confidence below the threshold.
    LowConfidence,
    /// No payload, or an empty one.
    EmptyPayload,
}

/// Reason reported for any rejection that carries no provider message.
pub const INVALID_RESULT_REASON: &str = "low confidence or invalid result";

impl Rejection {
    /// Reason text used when no provider error message is available.
    ///
    /// Every kind maps to [`INVALID_RESULT_REASON`]; the kind itself is only
    /// logged.
    pub fn reason(&self) -> &'static str {
        INVALID_RESULT_REASON
    }
}

/// Check a result against the acceptance gate.
///
/// Accepted iff `status == Success`, `confidence >= min_confidence` and the
/// payload is present and non-empty.
pub fn validate_result(result: &ToolResult, min_confidence: f64) -> Result<(), Rejection> {
    if !result.is_success() {
        return Err(Rejection::NotSuccessful);
    }
    if result.confidence < min_confidence {
        return Err(Rejection::LowConfidence);
    }
    if !result.has_payload() {
        return Err(Rejection::EmptyPayload);
    }
    Ok(())
}
