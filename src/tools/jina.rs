//! Jina search API: the fallback provider.
//!
//! Jina works without credentials (rate limited upstream), so the tool is
//! always available. Results carry no synthesised answer; one is built from
//! the top hits' content instead.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::{EngineConfig, ToolsConfig};
use crate::error::RouterError;
use crate::http::classify_error;
use crate::scoring::calculate_confidence;
use crate::tool::SearchTool;
use crate::tools::param_usize;
use crate::types::{SearchHit, SearchParams, SearchPayload, ToolKind, ToolResult};

/// Jina results are discounted against Tavily's.
const CONFIDENCE_SCALE: f64 = 0.9;

/// Relevance assumed for hits without a score.
const DEFAULT_HIT_SCORE: f64 = 0.8;

/// Hits combined into the synthesised answer.
const ANSWER_SOURCES: usize = 3;

/// Maximum answer length in characters, before the ellipsis.
const MAX_ANSWER_CHARS: usize = 500;

#[derive(Debug, Deserialize)]
struct JinaResponse {
    #[serde(default)]
    data: Vec<JinaHit>,
}

#[derive(Debug, Deserialize)]
struct JinaHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    score: Option<f64>,
}

/// Jina search client.
///
/// Priority 1: used when Tavily is unavailable or rejected.
pub struct JinaTool {
    api_key: Option<String>,
    base_url: String,
    max_results: usize,
    client: reqwest::Client,
}

impl JinaTool {
    pub fn new(tools: &ToolsConfig, engine: &EngineConfig, client: reqwest::Client) -> Self {
        Self {
            api_key: tools.jina_api_key.clone().filter(|k| !k.trim().is_empty()),
            base_url: tools.jina_base_url.clone(),
            max_results: engine.max_results,
            client,
        }
    }

    /// `{base}/{query}` with spaces as `+`.
    fn search_url(&self, query: &str) -> Result<url::Url, RouterError> {
        let mut url = url::Url::parse(&self.base_url)
            .map_err(|e| RouterError::Config(format!("invalid Jina base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| RouterError::Config("Jina base URL cannot be a base".into()))?
            .pop_if_empty()
            .push(&query.replace(' ', "+"));
        Ok(url)
    }
}

#[async_trait]
impl SearchTool for JinaTool {
    fn name(&self) -> &str {
        ToolKind::Jina.name()
    }

    fn priority(&self) -> u32 {
        ToolKind::Jina.default_priority()
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        query: &str,
        params: &SearchParams,
    ) -> Result<ToolResult, RouterError> {
        let max_results = param_usize(params, "max_results").unwrap_or(self.max_results);

        let mut request = self
            .client
            .get(self.search_url(query)?)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&[("n", max_results)]);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        tracing::debug!(max_results, authenticated = self.api_key.is_some(), "querying Jina");

        let response = request.send().await.map_err(|e| classify_error("Jina", e))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Jina returned an error status");
            return Ok(ToolResult::failure(format!(
                "Jina API error: {}",
                status.as_u16()
            )));
        }

        let body: JinaResponse = response
            .json()
            .await
            .map_err(|e| RouterError::Parse(format!("Jina response: {e}")))?;

        let results: Vec<SearchHit> = body
            .data
            .into_iter()
            .take(max_results)
            .map(|hit| SearchHit {
                title: hit.title,
                url: hit.url,
                content: hit.content.or(hit.description).unwrap_or_default(),
                score: hit.score.unwrap_or(DEFAULT_HIT_SCORE),
            })
            .collect();

        if results.is_empty() {
            return Ok(ToolResult::failure("Jina search returned no results"));
        }

        let payload = SearchPayload {
            query: query.to_owned(),
            answer: summarize(&results),
            results,
        };
        let confidence = calculate_confidence(&payload, CONFIDENCE_SCALE);

        tracing::debug!(
            results = payload.results.len(),
            confidence,
            "Jina search complete"
        );

        Ok(ToolResult::success(payload, confidence, self.name()))
    }
}

/// Join the top hits' content into a short answer.
fn summarize(results: &[SearchHit]) -> String {
    let joined = results
        .iter()
        .take(ANSWER_SOURCES)
        .map(|hit| hit.content.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    if joined.chars().count() > MAX_ANSWER_CHARS {
        let mut truncated: String = joined.chars().take(MAX_ANSWER_CHARS).collect();
        truncated.push_str("...");
        truncated
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::types::ToolStatus;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tool(server: &MockServer, key: Option<&str>) -> JinaTool {
        let tools = ToolsConfig {
            jina_api_key: key.map(str::to_owned),
            jina_base_url: server.uri(),
            ..ToolsConfig::default()
        };
        JinaTool::new(
            &tools,
            &EngineConfig::default(),
            crate::http::build_client(Duration::from_secs(5)).unwrap(),
        )
    }

    fn hit(content: &str) -> SearchHit {
        SearchHit {
            title: String::new(),
            url: String::new(),
            content: content.into(),
            score: 0.8,
        }
    }

    #[tokio::test]
    async fn always_available() {
        let server = MockServer::start().await;
        assert!(tool(&server, None).is_available());
        assert_eq!(tool(&server, None).priority(), 1);
    }

    #[tokio::test]
    async fn search_uses_path_query_and_count() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rust+async"))
            .and(query_param("n", "5"))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"title": "A", "url": "https://a.example", "content": "first", "score": 1.0},
                    {"title": "B", "url": "https://b.example", "description": "second"},
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = tool(&server, None)
            .execute("rust async", &SearchParams::new())
            .await
            .unwrap();

        assert_eq!(result.status, ToolStatus::Success);
        assert_eq!(result.source(), Some("Jina"));
        let payload = result.payload.as_ref().unwrap();
        assert_eq!(payload.results[1].content, "second");
        assert!((payload.results[1].score - 0.8).abs() < f64::EPSILON);
        assert_eq!(payload.answer, "first second");
        // (0.4 * 2/5 + 0.4 * 0.9 + 0.2) * 0.9
        assert!((result.confidence - 0.648).abs() < 1e-9);
    }

    #[tokio::test]
    async fn api_key_is_sent_as_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("authorization", "Bearer jina-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"title": "A", "url": "https://a.example", "content": "x"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = tool(&server, Some("jina-key"))
            .execute("q", &SearchParams::new())
            .await
            .unwrap();
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn empty_results_are_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(&server)
            .await;

        let result = tool(&server, None)
            .execute("q", &SearchParams::new())
            .await
            .unwrap();
        assert_eq!(result.status, ToolStatus::Failure);
        assert_eq!(result.error.as_deref(), Some("Jina search returned no results"));
    }

    #[tokio::test]
    async fn results_are_capped_at_max_results() {
        let server = MockServer::start().await;
        let data: Vec<_> = (0..8)
            .map(|i| json!({"title": format!("t{i}"), "url": "u", "content": "c"}))
            .collect();
        Mock::given(method("GET"))
            .and(query_param("n", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": data})))
            .mount(&server)
            .await;

        let mut params = SearchParams::new();
        params.insert("max_results".into(), json!(3));
        let result = tool(&server, None).execute("q", &params).await.unwrap();
        assert_eq!(result.payload.unwrap().results.len(), 3);
    }

    #[tokio::test]
    async fn error_status_becomes_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let result = tool(&server, None)
            .execute("q", &SearchParams::new())
            .await
            .unwrap();
        assert_eq!(result.status, ToolStatus::Failure);
        assert_eq!(result.error.as_deref(), Some("Jina API error: 429"));
    }

    #[test]
    fn summary_joins_top_three() {
        let hits = vec![hit("a"), hit("b"), hit("c"), hit("d")];
        assert_eq!(summarize(&hits), "a b c");
    }

    #[test]
    fn summary_is_truncated() {
        let long = "x".repeat(400);
        let hits = vec![hit(&long), hit(&long)];
        let summary = summarize(&hits);
        assert_eq!(summary.chars().count(), MAX_ANSWER_CHARS + 3);
        assert!(summary.ends_with("..."));
    }
}
