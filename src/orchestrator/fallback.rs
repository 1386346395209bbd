//! Core fallback engine: sequential priority walk, validate, record, fall back.
//!
//! Tools are tried strictly one after another, never raced. The first result
//! that passes [`validate_result`] wins; rejected attempts only contribute to
//! the execution ledger and to [`FallbackEvent`]s.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::error::{Result, RouterError};
use crate::events::{FallbackEvent, FallbackEvents};
use crate::ledger::{ExecutionLedger, ExecutionRecord};
use crate::registry::ToolRegistry;
use crate::tool::{Rejection, SearchTool, validate_result};
use crate::types::{SearchParams, ToolResult, ToolStatus};

/// What happened during one call to [`FallbackEngine::run`].
#[derive(Debug, Clone)]
pub struct FallbackOutcome {
    /// The accepted result, or the last attempted one if none was accepted.
    pub result: ToolResult,
    /// Ledger records of the attempts made during this call, in order.
    pub attempts: Vec<ExecutionRecord>,
    /// Whether the call was answered by a tool other than the first one tried.
    pub fell_back: bool,
}

impl FallbackOutcome {
    /// The accepted result, or the error describing why none was accepted.
    ///
    /// # Errors
    ///
    /// See [`rejection_error`].
    pub fn into_result(self, min_confidence: f64) -> Result<ToolResult> {
        match validate_result(&self.result, min_confidence) {
            Ok(()) => Ok(self.result),
            Err(rejection) => Err(rejection_error(&self.result, rejection)),
        }
    }
}

/// Typed error for a result the acceptance gate rejected.
///
/// `NotFound` maps to [`RouterError::NoAvailableTools`], `Timeout` to
/// [`RouterError::ProviderTimeout`], a successful but under-confident result
/// to [`RouterError::LowConfidence`] and everything else to
/// [`RouterError::ProviderFailure`]. The message is the provider's error, or
/// the rejection reason when there is none.
pub fn rejection_error(result: &ToolResult, rejection: Rejection) -> RouterError {
    let message = result
        .error
        .clone()
        .unwrap_or_else(|| rejection.reason().to_owned());
    match (result.status, rejection) {
        (ToolStatus::NotFound, _) => RouterError::NoAvailableTools(message),
        (ToolStatus::Timeout, _) => RouterError::ProviderTimeout(message),
        (ToolStatus::Success, Rejection::LowConfidence) => RouterError::LowConfidence(message),
        _ => RouterError::ProviderFailure(message),
    }
}

/// Walks the registry's available tools until one produces an acceptable result.
pub struct FallbackEngine {
    registry: Arc<ToolRegistry>,
    ledger: ExecutionLedger,
    events: FallbackEvents,
    deadline: Duration,
}

impl FallbackEngine {
    /// Create an engine over `registry` with a history of `history_capacity`
    /// records and a per-tool `deadline`.
    pub fn new(registry: Arc<ToolRegistry>, history_capacity: usize, deadline: Duration) -> Self {
        Self {
            registry,
            ledger: ExecutionLedger::new(history_capacity),
            events: FallbackEvents::new(),
            deadline,
        }
    }

    /// Tools this engine walks.
    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// History of every attempt made by this engine.
    #[must_use]
    pub fn ledger(&self) -> &ExecutionLedger {
        &self.ledger
    }

    /// Subscribe to fallback transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<FallbackEvent> {
        self.events.subscribe()
    }

    /// Execute `query` with automatic fallback and return the final result.
    ///
    /// Equivalent to [`run`](Self::run) without the attempt bookkeeping.
    pub async fn execute_with_fallback(
        &self,
        query: &str,
        min_confidence: f64,
        params: &SearchParams,
    ) -> ToolResult {
        self.run(query, min_confidence, params).await.result
    }

    /// Execute `query` with automatic fallback, failing unless a result is accepted.
    ///
    /// # Errors
    ///
    /// Returns the error for the last attempted result, as classified by
    /// [`rejection_error`], or [`RouterError::NoAvailableTools`] when nothing
    /// could be tried.
    pub async fn search(
        &self,
        query: &str,
        min_confidence: f64,
        params: &SearchParams,
    ) -> Result<ToolResult> {
        self.run(query, min_confidence, params)
            .await
            .into_result(min_confidence)
    }

    /// Execute `query` with automatic fallback.
    ///
    /// # Pipeline
    ///
    /// 1. Fetch available tools; none → `NotFound`, ledger untouched
    /// 2. Invoke each tool in priority order under the deadline
    /// 3. Append a ledger record for every attempt
    /// 4. Return the first result passing the confidence gate
    /// 5. Otherwise publish a [`FallbackEvent`] and continue
    /// 6. If every tool is rejected, return the last result
    pub async fn run(
        &self,
        query: &str,
        min_confidence: f64,
        params: &SearchParams,
    ) -> FallbackOutcome {
        let tools = self.registry.available_tools();
        if tools.is_empty() {
            tracing::error!("no available tools found");
            return FallbackOutcome {
                result: ToolResult::not_found("no available tools found"),
                attempts: Vec::new(),
                fell_back: false,
            };
        }

        tracing::debug!(count = tools.len(), "executing query with available tools");

        let mut attempts = Vec::with_capacity(tools.len());
        let mut last = None;

        for (index, tool) in tools.iter().enumerate() {
            tracing::debug!(tool = tool.name(), priority = tool.priority(), "attempting tool");

            let (result, record) = self.invoke(tool, query, params).await;
            attempts.push(record);

            match validate_result(&result, min_confidence) {
                Ok(()) => {
                    tracing::info!(
                        tool = tool.name(),
                        confidence = result.confidence,
                        attempts = attempts.len(),
                        "tool result accepted"
                    );
                    return FallbackOutcome {
                        result,
                        fell_back: index > 0,
                        attempts,
                    };
                }
                Err(rejection) => {
                    tracing::debug!(
                        tool = tool.name(),
                        status = %result.status,
                        confidence = result.confidence,
                        ?rejection,
                        "tool result rejected"
                    );
                    if let Some(next) = tools.get(index + 1) {
                        let reason = result
                            .error
                            .clone()
                            .unwrap_or_else(|| rejection.reason().to_owned());
                        self.events.publish(FallbackEvent {
                            from_tool: tool.name().to_owned(),
                            to_tool: next.name().to_owned(),
                            reason,
                            query: query.to_owned(),
                        });
                    }
                    last = Some(result);
                }
            }
        }

        tracing::error!(attempts = attempts.len(), "all tools failed or returned invalid results");
        FallbackOutcome {
            result: last.unwrap_or_else(|| ToolResult::failure("all tools failed")),
            attempts,
            fell_back: false,
        }
    }

    /// Execute a single named tool, without fallback.
    ///
    /// Unknown tools yield `NotFound` and unavailable ones `Failure`; neither
    /// is recorded in the ledger because no provider call was made.
    pub async fn execute_tool(&self, name: &str, query: &str, params: &SearchParams) -> ToolResult {
        let tool = match self.registry.get(name) {
            Ok(tool) => tool,
            Err(err) => {
                tracing::error!(tool = name, "tool not found");
                return ToolResult::not_found(err.to_string());
            }
        };
        if !tool.is_available() {
            tracing::warn!(tool = name, "tool not available");
            return ToolResult::failure(format!("tool not available: {name}"));
        }
        self.invoke(&tool, query, params).await.0
    }

    /// Invoke one tool under the deadline, converting every fault into a result.
    async fn invoke(
        &self,
        tool: &Arc<dyn SearchTool>,
        query: &str,
        params: &SearchParams,
    ) -> (ToolResult, ExecutionRecord) {
        let name = tool.name();
        let started = Instant::now();
        let recorder = AttemptRecorder {
            ledger: &self.ledger,
            tool: name,
            query,
            started,
            finished: false,
        };

        tracing::trace!(tool = name, query, "invoking tool");
        let call = AssertUnwindSafe(tool.execute(query, params)).catch_unwind();
        let result = match tokio::time::timeout(self.deadline, call).await {
            Err(_) => ToolResult::timeout(format!(
                "{name} timed out after {}ms",
                self.deadline.as_millis()
            )),
            Ok(Err(_)) => ToolResult::failure(format!("{name} panicked during execution")),
            Ok(Ok(Err(RouterError::ProviderTimeout(msg)))) => ToolResult::timeout(msg),
            Ok(Ok(Err(err))) => ToolResult::failure(format!("{name} execution failed: {err}")),
            Ok(Ok(Ok(result))) => result,
        };

        let duration_ms = elapsed_ms(started);
        let mut result = result.with_duration_ms(duration_ms);
        if result.source().is_none() {
            result = result.with_metadata("source", serde_json::json!(name));
        }
        let record = recorder.finish(result.status, duration_ms);
        (result, record)
    }
}

impl std::fmt::Debug for FallbackEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackEngine")
            .field("registry", &self.registry)
            .field("history", &self.ledger.len())
            .field("deadline", &self.deadline)
            .finish()
    }
}

/// Appends exactly one ledger record per attempt, even if the attempt's
/// future is dropped before completion.
struct AttemptRecorder<'a> {
    ledger: &'a ExecutionLedger,
    tool: &'a str,
    query: &'a str,
    started: Instant,
    finished: bool,
}

impl AttemptRecorder<'_> {
    fn finish(mut self, status: ToolStatus, duration_ms: u64) -> ExecutionRecord {
        self.finished = true;
        let record = ExecutionRecord::now(self.tool, self.query, status, duration_ms);
        self.ledger.append(record.clone());
        record
    }
}

impl Drop for AttemptRecorder<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(tool = self.tool, "tool invocation cancelled");
            self.ledger.append(ExecutionRecord::now(
                self.tool,
                self.query,
                ToolStatus::Failure,
                elapsed_ms(self.started),
            ));
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::types::{SearchHit, SearchPayload};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behaviour {
        Answer(f64),
        Fail(&'static str),
        Silent,
        Error,
        Hang,
        Panic,
    }

    struct ScriptedTool {
        name: &'static str,
        priority: u32,
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    impl ScriptedTool {
        fn new(name: &'static str, priority: u32, behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                name,
                priority,
                behaviour,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SearchTool for ScriptedTool {
        fn name(&self) -> &str {
            self.name
        }
        fn priority(&self) -> u32 {
            self.priority
        }
        fn is_available(&self) -> bool {
            true
        }
        async fn execute(
            &self,
            query: &str,
            _params: &SearchParams,
        ) -> std::result::Result<ToolResult, RouterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Answer(confidence) => Ok(ToolResult::success(
                    SearchPayload {
                        query: query.to_owned(),
                        answer: format!("answer from {}", self.name),
                        results: vec![SearchHit {
                            title: self.name.to_owned(),
                            url: "https://example.com".into(),
                            content: String::new(),
                            score: confidence,
                        }],
                    },
                    confidence,
                    self.name,
                )),
                Behaviour::Fail(msg) => Ok(ToolResult::failure(msg)),
                Behaviour::Silent => Ok(ToolResult {
                    error: None,
                    ..ToolResult::failure("")
                }),
                Behaviour::Error => Err(RouterError::Http("connection refused".into())),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(ToolResult::failure("unreachable"))
                }
                Behaviour::Panic => panic!("provider bug"),
            }
        }
    }

    fn engine(tools: Vec<Arc<ScriptedTool>>) -> FallbackEngine {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool);
        }
        FallbackEngine::new(Arc::new(registry), 100, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn first_acceptable_tool_wins() {
        let primary = ScriptedTool::new("primary", 0, Behaviour::Answer(0.9));
        let backup = ScriptedTool::new("backup", 1, Behaviour::Answer(0.9));
        let engine = engine(vec![Arc::clone(&primary), Arc::clone(&backup)]);

        let outcome = engine.run("q", 0.5, &SearchParams::new()).await;
        assert!(outcome.result.is_success());
        assert_eq!(outcome.result.source(), Some("primary"));
        assert!(!outcome.fell_back);
        assert_eq!(backup.calls.load(Ordering::SeqCst), 0);
        assert_eq!(engine.ledger().len(), 1);
    }

    #[tokio::test]
    async fn low_confidence_falls_back() {
        let engine = engine(vec![
            ScriptedTool::new("zero", 0, Behaviour::Answer(0.3)),
            ScriptedTool::new("one", 1, Behaviour::Answer(0.8)),
        ]);
        let mut events = engine.subscribe();

        let outcome = engine.run("q", 0.5, &SearchParams::new()).await;
        assert_eq!(outcome.result.source(), Some("one"));
        assert!((outcome.result.confidence - 0.8).abs() < f64::EPSILON);
        assert!(outcome.fell_back);
        let tried: Vec<&str> = outcome.attempts.iter().map(|r| r.tool.as_str()).collect();
        assert_eq!(tried, vec!["zero", "one"]);
        assert_eq!(outcome.attempts[0].status, ToolStatus::Success);
        assert_eq!(engine.ledger().len(), 2);

        let event = events.try_recv().expect("fallback event");
        assert_eq!(event.from_tool, "zero");
        assert_eq!(event.to_tool, "one");
        assert!(event.reason.contains("low confidence"));
    }

    #[tokio::test]
    async fn provider_error_message_becomes_fallback_reason() {
        let engine = engine(vec![
            ScriptedTool::new("broken", 0, Behaviour::Fail("Tavily API error: 500")),
            ScriptedTool::new("ok", 1, Behaviour::Answer(0.9)),
        ]);
        let mut events = engine.subscribe();

        let result = engine
            .execute_with_fallback("q", 0.5, &SearchParams::new())
            .await;
        assert_eq!(result.source(), Some("ok"));
        assert_eq!(events.try_recv().expect("event").reason, "Tavily API error: 500");
    }

    #[tokio::test]
    async fn exhausted_tools_return_last_result() {
        let engine = engine(vec![
            ScriptedTool::new("a", 0, Behaviour::Fail("first failure")),
            ScriptedTool::new("b", 1, Behaviour::Fail("second failure")),
        ]);
        let mut events = engine.subscribe();

        let outcome = engine.run("q", 0.5, &SearchParams::new()).await;
        assert_eq!(outcome.result.status, ToolStatus::Failure);
        assert_eq!(outcome.result.error.as_deref(), Some("second failure"));
        assert!(!outcome.fell_back);
        assert_eq!(engine.ledger().len(), 2);
        // Only one transition: a → b. None after the last tool.
        assert!(events.try_recv().is_ok());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn no_tools_returns_not_found_without_history() {
        let engine = engine(vec![]);
        let result = engine
            .execute_with_fallback("q", 0.5, &SearchParams::new())
            .await;
        assert_eq!(result.status, ToolStatus::NotFound);
        assert!(result.error.as_deref().is_some_and(|e| !e.is_empty()));
        assert!(engine.ledger().is_empty());
    }

    #[tokio::test]
    async fn errors_become_failures() {
        let engine = engine(vec![ScriptedTool::new("err", 0, Behaviour::Error)]);
        let result = engine
            .execute_with_fallback("q", 0.5, &SearchParams::new())
            .await;
        assert_eq!(result.status, ToolStatus::Failure);
        assert!(result.error.as_deref().is_some_and(|e| e.contains("connection refused")));
        assert_eq!(result.source(), Some("err"));
    }

    #[tokio::test]
    async fn panics_become_failures() {
        let engine = engine(vec![
            ScriptedTool::new("panicky", 0, Behaviour::Panic),
            ScriptedTool::new("steady", 1, Behaviour::Answer(0.9)),
        ]);
        let outcome = engine.run("q", 0.5, &SearchParams::new()).await;
        assert_eq!(outcome.result.source(), Some("steady"));
        let history = engine.ledger().snapshot();
        assert_eq!(history[0].status, ToolStatus::Failure);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expiry_becomes_timeout() {
        let engine = engine(vec![
            ScriptedTool::new("slow", 0, Behaviour::Hang),
            ScriptedTool::new("fast", 1, Behaviour::Answer(0.9)),
        ]);
        let outcome = engine.run("q", 0.5, &SearchParams::new()).await;
        assert_eq!(outcome.result.source(), Some("fast"));
        let history = engine.ledger().snapshot();
        assert_eq!(history[0].status, ToolStatus::Timeout);
        assert_eq!(history[0].tool, "slow");
        assert!(history[0].duration_ms >= 5000);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_attempt_is_still_recorded() {
        let engine = engine(vec![ScriptedTool::new("slow", 0, Behaviour::Hang)]);
        let params = SearchParams::new();
        let run = engine.run("q", 0.5, &params);
        let abandoned = tokio::time::timeout(Duration::from_millis(100), run).await;
        assert!(abandoned.is_err());

        let history = engine.ledger().snapshot();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, ToolStatus::Failure);
    }

    #[tokio::test]
    async fn execute_tool_by_name() {
        let engine = engine(vec![ScriptedTool::new("named", 0, Behaviour::Answer(0.6))]);
        let result = engine.execute_tool("named", "q", &SearchParams::new()).await;
        assert!(result.is_success());
        assert_eq!(engine.ledger().len(), 1);

        let missing = engine.execute_tool("other", "q", &SearchParams::new()).await;
        assert_eq!(missing.status, ToolStatus::NotFound);
        assert_eq!(engine.ledger().len(), 1);
    }

    #[tokio::test]
    async fn earlier_tools_are_not_retried() {
        let first = ScriptedTool::new("first", 0, Behaviour::Answer(0.1));
        let second = ScriptedTool::new("second", 1, Behaviour::Answer(0.2));
        let engine = engine(vec![Arc::clone(&first), Arc::clone(&second)]);

        let _ = engine.run("q", 0.5, &SearchParams::new()).await;
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_without_message_reports_invalid_result() {
        let engine = engine(vec![
            ScriptedTool::new("quiet", 0, Behaviour::Silent),
            ScriptedTool::new("ok", 1, Behaviour::Answer(0.9)),
        ]);
        let mut events = engine.subscribe();

        let result = engine
            .execute_with_fallback("q", 0.5, &SearchParams::new())
            .await;
        assert_eq!(result.source(), Some("ok"));
        let event = events.try_recv().expect("fallback event");
        assert_eq!(event.from_tool, "quiet");
        assert_eq!(event.reason, "low confidence or invalid result");
    }

    #[tokio::test]
    async fn search_returns_accepted_result() {
        let engine = engine(vec![ScriptedTool::new("ok", 0, Behaviour::Answer(0.9))]);
        let result = engine.search("q", 0.5, &SearchParams::new()).await.unwrap();
        assert_eq!(result.source(), Some("ok"));
    }

    #[tokio::test]
    async fn search_classifies_exhausted_walks() {
        let params = SearchParams::new();

        let err = engine(vec![]).search("q", 0.5, &params).await.unwrap_err();
        assert!(matches!(err, RouterError::NoAvailableTools(_)));

        let weak = engine(vec![ScriptedTool::new("weak", 0, Behaviour::Answer(0.2))]);
        let err = weak.search("q", 0.5, &params).await.unwrap_err();
        assert!(
            matches!(err, RouterError::LowConfidence(ref m) if m == "low confidence or invalid result")
        );

        let down = engine(vec![ScriptedTool::new(
            "down",
            0,
            Behaviour::Fail("Jina API error: 503"),
        )]);
        let err = down.search("q", 0.5, &params).await.unwrap_err();
        assert!(matches!(err, RouterError::ProviderFailure(ref m) if m == "Jina API error: 503"));
    }

    #[tokio::test(start_paused = true)]
    async fn search_reports_deadline_as_timeout() {
        let engine = engine(vec![ScriptedTool::new("slow", 0, Behaviour::Hang)]);
        let err = engine
            .search("q", 0.5, &SearchParams::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::ProviderTimeout(_)));
    }
}
