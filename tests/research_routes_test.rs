use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use cortex_scout::research::config::ResearchConfig;
use cortex_scout::research::routes::router;
use cortex_scout::research::ResearchService;
use tower::ServiceExt;

fn test_service() -> Arc<ResearchService> {
    let config = ResearchConfig::load();
    Arc::new(ResearchService::new(config, reqwest::Client::new()))
}

#[tokio::test]
async fn healthz_is_reachable_without_an_api_key() {
    let app = router(test_service());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/deepsearch/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn run_rejects_an_empty_query_before_touching_the_graph() {
    let app = router(test_service());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/deepsearch/run")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"query": ""}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn run_rejects_out_of_range_max_research_loops() {
    let app = router(test_service());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/deepsearch/run")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"query": "hello", "max_research_loops": 6}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn api_key_gate_rejects_missing_header_when_configured() {
    let mut config = ResearchConfig::load();
    config.api_key_header_value = Some("secret-token".to_string());

    let service = Arc::new(ResearchService::new(config, reqwest::Client::new()));
    let app = router(service);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/deepsearch/run")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"query": "hello"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
