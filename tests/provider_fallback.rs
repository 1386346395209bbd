#![allow(clippy::unwrap_used, clippy::expect_used)]

//! End-to-end routing through the shipped providers against mock HTTP APIs.

use search_router::{Router, RouterConfig, RouterError, SearchParams, ToolStatus};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(tavily: &MockServer, jina: &MockServer, tavily_key: Option<&str>) -> RouterConfig {
    let mut config = RouterConfig::default();
    config.tools.tavily_api_key = tavily_key.map(str::to_owned);
    config.tools.tavily_base_url = tavily.uri();
    config.tools.jina_base_url = jina.uri();
    config.engine.timeout_seconds = 5;
    config
}

async fn mount_jina_ok(jina: &MockServer) {
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"title": "Rust", "url": "https://www.rust-lang.org", "content": "A language empowering everyone.", "score": 0.9},
                {"title": "Book", "url": "https://doc.rust-lang.org/book", "content": "The Rust book.", "score": 0.9},
                {"title": "Docs", "url": "https://docs.rs", "content": "Crate docs.", "score": 0.9},
            ]
        })))
        .mount(jina)
        .await;
}

#[tokio::test]
async fn tavily_answers_when_healthy() {
    let tavily = MockServer::start().await;
    let jina = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "answer": "Rust is a systems language.",
            "results": [
                {"title": "a", "url": "https://a", "content": "x", "score": 0.9},
                {"title": "b", "url": "https://b", "content": "y", "score": 0.9},
                {"title": "c", "url": "https://c", "content": "z", "score": 0.9},
            ]
        })))
        .expect(1)
        .mount(&tavily)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&jina)
        .await;

    let router = Router::from_config(config_for(&tavily, &jina, Some("tvly-key"))).unwrap();
    let response = router
        .process_request("what is rust", "it", &SearchParams::new())
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(response.source_tool.as_deref(), Some("Tavily"));
    assert!(!response.fell_back);
    assert_eq!(response.execution_log.len(), 1);
}

#[tokio::test]
async fn tavily_error_falls_back_to_jina() {
    let tavily = MockServer::start().await;
    let jina = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .mount(&tavily)
        .await;
    mount_jina_ok(&jina).await;

    let router = Router::from_config(config_for(&tavily, &jina, Some("tvly-key"))).unwrap();
    let mut events = router.subscribe();

    let response = router
        .process_request("rust language", "it", &SearchParams::new())
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(response.source_tool.as_deref(), Some("Jina"));
    assert!(response.fell_back);
    assert_eq!(response.execution_log.len(), 2);
    assert_eq!(response.execution_log[0].status, ToolStatus::Failure);
    assert_eq!(response.execution_log[1].status, ToolStatus::Success);

    let event = events.try_recv().expect("fallback event");
    assert_eq!(event.from_tool, "Tavily");
    assert_eq!(event.to_tool, "Jina");
    assert!(event.reason.contains("Tavily API error: 500"));
}

#[tokio::test]
async fn missing_tavily_key_goes_straight_to_jina() {
    let tavily = MockServer::start().await;
    let jina = MockServer::start().await;
    mount_jina_ok(&jina).await;

    let router = Router::from_config(config_for(&tavily, &jina, None)).unwrap();
    let response = router
        .process_request("rust language", "it", &SearchParams::new())
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(response.source_tool.as_deref(), Some("Jina"));
    // Tavily was never tried, so this is not a fallback.
    assert!(!response.fell_back);
    assert!(tavily.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn every_provider_failing_returns_last_error() {
    let tavily = MockServer::start().await;
    let jina = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&tavily)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&jina)
        .await;

    let router = Router::from_config(config_for(&tavily, &jina, Some("k"))).unwrap();
    let response = router
        .process_request("obscure query", "it", &SearchParams::new())
        .await
        .unwrap();

    assert!(!response.success);
    assert_eq!(
        response.error.as_deref(),
        Some("Jina search returned no results")
    );
    assert_eq!(router.engine().ledger().len(), 2);
    assert_eq!(router.statistics().await.successful_requests, 0);
}

#[tokio::test]
async fn second_identical_request_is_served_from_cache() {
    let tavily = MockServer::start().await;
    let jina = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"title": "Rust", "url": "https://www.rust-lang.org", "content": "c", "score": 0.9},
                {"title": "Book", "url": "https://doc.rust-lang.org/book", "content": "c", "score": 0.9},
                {"title": "Docs", "url": "https://docs.rs", "content": "c", "score": 0.9},
            ]
        })))
        .expect(1)
        .mount(&jina)
        .await;

    let router = Router::from_config(config_for(&tavily, &jina, None)).unwrap();
    let params = SearchParams::new();
    let first = router.process_request("search for rust", "it", &params).await.unwrap();
    let second = router.process_request("Rust", "it", &params).await.unwrap();

    assert!(first.success && !first.cached);
    assert!(second.success && second.cached);
    assert_eq!(router.statistics().await.cache_hits, 1);
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let mut config = RouterConfig::default();
    config.engine.min_confidence = 1.5;
    let err = Router::from_config(config).unwrap_err();
    assert!(matches!(err, RouterError::Config(_)));
}
