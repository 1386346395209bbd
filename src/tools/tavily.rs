//! Tavily search API: the primary provider.
//!
//! Tavily returns structured results plus a synthesised answer. It needs an
//! API key; without one the tool reports itself unavailable and the engine
//! skips it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, ToolsConfig};
use crate::error::RouterError;
use crate::http::classify_error;
use crate::scoring::calculate_confidence;
use crate::tool::SearchTool;
use crate::tools::{param_str, param_str_list, param_usize};
use crate::types::{SearchHit, SearchParams, SearchPayload, ToolKind, ToolResult};

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    search_depth: &'a str,
    max_results: usize,
    include_answer: bool,
    include_raw_content: bool,
    include_images: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    include_domains: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    exclude_domains: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    results: Vec<TavilyHit>,
}

#[derive(Debug, Deserialize)]
struct TavilyHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: f64,
}

/// Tavily API client.
///
/// Priority 0: tried first whenever a key is configured.
pub struct TavilyTool {
    api_key: Option<String>,
    base_url: String,
    search_depth: String,
    max_results: usize,
    client: reqwest::Client,
}

impl TavilyTool {
    pub fn new(tools: &ToolsConfig, engine: &EngineConfig, client: reqwest::Client) -> Self {
        Self {
            api_key: tools.tavily_api_key.clone().filter(|k| !k.trim().is_empty()),
            base_url: tools.tavily_base_url.trim_end_matches('/').to_owned(),
            search_depth: engine.search_depth.clone(),
            max_results: engine.max_results,
            client,
        }
    }
}

#[async_trait]
impl SearchTool for TavilyTool {
    fn name(&self) -> &str {
        ToolKind::Tavily.name()
    }

    fn priority(&self) -> u32 {
        ToolKind::Tavily.default_priority()
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn execute(
        &self,
        query: &str,
        params: &SearchParams,
    ) -> Result<ToolResult, RouterError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Ok(ToolResult::failure("Tavily API key not configured"));
        };

        let search_depth = param_str(params, "search_depth").unwrap_or(&self.search_depth);
        let max_results = param_usize(params, "max_results").unwrap_or(self.max_results);
        let request = TavilyRequest {
            api_key,
            query,
            search_depth,
            max_results,
            include_answer: true,
            include_raw_content: false,
            include_images: false,
            include_domains: param_str_list(params, "include_domains"),
            exclude_domains: param_str_list(params, "exclude_domains"),
        };

        tracing::debug!(search_depth, max_results, "querying Tavily");

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_error("Tavily", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "Tavily returned an error status");
            return Ok(ToolResult::failure(format!(
                "Tavily API error: {} - {body}",
                status.as_u16()
            )));
        }

        let body: TavilyResponse = response
            .json()
            .await
            .map_err(|e| RouterError::Parse(format!("Tavily response: {e}")))?;

        let payload = SearchPayload {
            query: query.to_owned(),
            answer: body.answer.unwrap_or_default(),
            results: body
                .results
                .into_iter()
                .map(|hit| SearchHit {
                    title: hit.title,
                    url: hit.url,
                    content: hit.content,
                    score: hit.score,
                })
                .collect(),
        };
        let confidence = calculate_confidence(&payload, 1.0);

        tracing::debug!(
            results = payload.results.len(),
            confidence,
            "Tavily search complete"
        );

        Ok(ToolResult::success(payload, confidence, self.name())
            .with_metadata("search_depth", serde_json::json!(search_depth)))
    }
}
