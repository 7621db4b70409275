//! API Integration Tests

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use nera_api::{create_router, create_router_for_testing, state::AppState};
use nera_core::AppConfig;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

/// Helper to create a test request
fn create_json_request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");

    match body {
        Some(json_body) => builder
            .body(Body::from(serde_json::to_string(&json_body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn labelled(entities: &Value) -> Vec<(String, String)> {
    entities
        .as_array()
        .unwrap()
        .iter()
        .map(|e| {
            (
                e["text"].as_str().unwrap().to_string(),
                e["label"].as_str().unwrap().to_string(),
            )
        })
        .collect()
}

// =============================================================================
// Health Check Tests
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let app = create_router_for_testing();
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let (status, json) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn test_readiness_check() {
    let app = create_router_for_testing();
    let request = Request::builder()
        .uri("/ready")
        .body(Body::empty())
        .unwrap();

    let (status, json) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ready"], true);
    assert!(json["checks"]["extractor"].is_string());
    assert_eq!(json["link_cache"]["entries"], 0);
    assert_eq!(json["link_cache"]["hits"], 0);
}

#[tokio::test]
async fn test_draining_server_refuses_work() {
    let state = Arc::new(AppState::new(AppConfig::default()).unwrap());
    state.set_ready(false);

    let ready = Request::builder()
        .uri("/ready")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(create_router(Arc::clone(&state)), ready).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["ready"], false);

    let analyze = create_json_request(
        "POST",
        "/api/v1/analyze",
        Some(json!({ "text": "Apple Inc. was founded by Steve Jobs." })),
    );
    let (status, json) = send(create_router(Arc::clone(&state)), analyze).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["code"], "SERVICE_UNAVAILABLE");

    let batch = create_json_request("POST", "/api/v1/batch", Some(json!({ "texts": ["Acme"] })));
    let (status, _) = send(create_router(state), batch).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_root_points_to_docs() {
    let app = create_router_for_testing();
    let request = Request::builder().uri("/").body(Body::empty()).unwrap();

    let (status, json) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["docs"], "/swagger-ui");
}

// =============================================================================
// Analysis Tests
// =============================================================================

#[tokio::test]
async fn test_analyze_founder_sentence() {
    let app = create_router_for_testing();
    let request = create_json_request(
        "POST",
        "/api/v1/analyze",
        Some(json!({ "text": "Apple Inc. was founded by Steve Jobs." })),
    );

    let (status, json) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["source_id"], "text-000001");
    assert_eq!(
        labelled(&json["entities"]),
        vec![
            ("Apple Inc.".to_string(), "ORG".to_string()),
            ("Steve Jobs".to_string(), "PERSON".to_string()),
        ]
    );
    assert_eq!(json["entities"][0]["start"], 0);
    assert_eq!(json["entities"][0]["end"], 10);
    assert_eq!(
        json["entities"][0]["description"],
        "Companies, agencies, institutions, etc."
    );
    assert!(json["entities"][0]["linked_description"].is_null());
    assert_eq!(json["stats"]["entity_count"], 2);
    assert!(json["processing_time_ms"].is_u64());
}

#[tokio::test]
async fn test_analyze_flags_disable_enrichment() {
    let app = create_router_for_testing();
    let request = create_json_request(
        "POST",
        "/api/v1/analyze",
        Some(json!({
            "text": "This is a great day and the team is happy.",
            "include_sentiment": false,
            "include_language": false
        })),
    );

    let (status, json) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["language"].is_null());
    assert!(json["sentiment"].is_null());
    assert!(json["subjectivity"].is_null());
}

#[tokio::test]
async fn test_analyze_reports_subjectivity() {
    let app = create_router_for_testing();
    let request = create_json_request(
        "POST",
        "/api/v1/analyze",
        Some(json!({ "text": "This is a great day and the team is happy." })),
    );

    let (status, json) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    let sentiment = json["sentiment"].as_f64().unwrap();
    let subjectivity = json["subjectivity"].as_f64().unwrap();
    assert!((sentiment - 0.8).abs() < 1e-9);
    assert!((subjectivity - 0.9).abs() < 1e-9);
}

#[tokio::test]
async fn test_analyze_empty_text() {
    let app = create_router_for_testing();
    let request = create_json_request("POST", "/api/v1/analyze", Some(json!({ "text": "" })));

    let (status, json) = send(app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_analyze_whitespace_text() {
    let app = create_router_for_testing();
    let request = create_json_request("POST", "/api/v1/analyze", Some(json!({ "text": "  \n\t " })));

    let (status, _) = send(app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_analyze_missing_text_field() {
    let app = create_router_for_testing();
    let request = create_json_request("POST", "/api/v1/analyze", Some(json!({ "content": "x" })));

    let response = app.oneshot(request).await.unwrap();

    assert!(response.status().is_client_error());
}

// =============================================================================
// Batch Tests
// =============================================================================

#[tokio::test]
async fn test_batch_reports_per_item_outcome() {
    let app = create_router_for_testing();
    let request = create_json_request(
        "POST",
        "/api/v1/batch",
        Some(json!({ "texts": ["Apple Inc. was founded by Steve Jobs.", ""] })),
    );

    let (status, json) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    let results = json["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);

    assert_eq!(results[0]["batch_index"], 0);
    assert_eq!(results[0]["status"], "success");
    assert_eq!(results[0]["document"]["entities"].as_array().unwrap().len(), 2);

    assert_eq!(results[1]["batch_index"], 1);
    assert_eq!(results[1]["status"], "failure");
    assert_eq!(results[1]["error"]["kind"], "validation");

    let stats = &json["batch_statistics"];
    assert_eq!(stats["total_texts"], 2);
    assert_eq!(stats["successful"], 1);
    assert_eq!(stats["failed"], 1);
    assert_eq!(stats["truncated"], 0);
    assert_eq!(stats["entity_distribution"]["ORG"], 1);
    assert_eq!(stats["entity_distribution"]["PERSON"], 1);
}

#[tokio::test]
async fn test_batch_empty_list() {
    let app = create_router_for_testing();
    let request = create_json_request("POST", "/api/v1/batch", Some(json!({ "texts": [] })));

    let (status, json) = send(app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["message"].as_str().unwrap().contains("empty"));
}

// =============================================================================
// Upload Tests
// =============================================================================

#[tokio::test]
async fn test_upload_text_file() {
    let app = create_router_for_testing();
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/upload?filename=founders.txt")
        .header("Content-Type", "text/plain")
        .body(Body::from("Apple Inc. was founded by Steve Jobs."))
        .unwrap();

    let (status, json) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["source_id"], "founders.txt");
    assert_eq!(json["entities"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_upload_unsupported_file_type() {
    let app = create_router_for_testing();
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/upload?filename=report.pdf")
        .body(Body::from(vec![0x25, 0x50, 0x44, 0x46]))
        .unwrap();

    let (status, json) = send(app, request).await;

    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(json["code"], "UNSUPPORTED_MEDIA_TYPE");
}

#[tokio::test]
async fn test_upload_empty_file() {
    let app = create_router_for_testing();
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/upload?filename=empty.txt")
        .body(Body::empty())
        .unwrap();

    let (status, _) = send(app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Metadata Tests
// =============================================================================

#[tokio::test]
async fn test_entity_types() {
    let app = create_router_for_testing();
    let request = Request::builder()
        .uri("/api/v1/entities/types")
        .body(Body::empty())
        .unwrap();

    let (status, json) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 15);
    let labels: Vec<&str> = json["entity_types"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["label"].as_str().unwrap())
        .collect();
    assert!(labels.contains(&"PERSON"));
    assert!(labels.contains(&"GPE"));
}

#[tokio::test]
async fn test_openapi_document() {
    let app = create_router_for_testing();
    let request = Request::builder()
        .uri("/api-docs/openapi.json")
        .body(Body::empty())
        .unwrap();

    let (status, json) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["paths"]["/api/v1/analyze"].is_object());
    assert!(json["paths"]["/api/v1/batch"].is_object());
}
