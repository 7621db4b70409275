//! NERA API - REST server
//!
//! Exposes single-text analysis, small inline batches and file upload over
//! HTTP, with an OpenAPI document served next to a Swagger UI.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

use axum::{extract::DefaultBodyLimit, http::HeaderValue, routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use handlers::{analyze, health};
use nera_core::config::ServerConfig;
use state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "NERA API",
        description = "Named entity recognition and text analysis"
    ),
    paths(
        // Health
        health::root,
        health::health_check,
        health::readiness_check,
        // Analysis
        analyze::analyze_text,
        analyze::analyze_batch,
        analyze::upload_file,
        analyze::entity_types,
    ),
    components(schemas(
        error::ApiError,
        health::RootResponse,
        health::HealthResponse,
        health::ReadinessResponse,
        health::ReadinessChecks,
        health::LinkCacheResponse,
        analyze::EnrichmentFlags,
        analyze::AnalyzeRequest,
        analyze::BatchRequest,
        analyze::EntityResponse,
        analyze::StatsResponse,
        analyze::DocumentResponse,
        analyze::AnalyzeResponse,
        analyze::FailureResponse,
        analyze::BatchItemResponse,
        analyze::BatchStatisticsResponse,
        analyze::BatchResponse,
        analyze::EntityTypeInfo,
        analyze::EntityTypesResponse,
    )),
    tags(
        (name = "health", description = "Liveness and readiness"),
        (name = "analysis", description = "Entity extraction and enrichment")
    )
)]
pub struct ApiDoc;

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let wildcard = server.cors_origins.is_empty() || server.cors_origins.iter().any(|o| o == "*");
    if wildcard {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = server
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the full application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.server.max_body_size;
    let cors = cors_layer(&state.config.server);

    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .nest("/api/v1", routes::api_routes())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Router over default configuration, for integration tests
#[cfg(any(test, feature = "test-utils"))]
pub fn create_router_for_testing() -> Router {
    let state = AppState::new(nera_core::AppConfig::default())
        .expect("default configuration builds a service");
    create_router(Arc::new(state))
}
