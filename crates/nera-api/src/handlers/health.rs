//! Health check handlers

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use nera_enrich::CacheStatsReport;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

/// Service banner
#[derive(Serialize, ToSchema)]
pub struct RootResponse {
    pub name: String,
    pub version: String,
    pub docs: String,
}

/// Root endpoint
#[utoipa::path(
    get,
    path = "/",
    tag = "health",
    responses(
        (status = 200, description = "Service banner", body = RootResponse)
    )
)]
pub async fn root() -> impl IntoResponse {
    Json(RootResponse {
        name: "NERA Named Entity Recognition API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        docs: "/swagger-ui".to_string(),
    })
}

/// Health check response
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub total_requests: u64,
}

/// Liveness probe - basic health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_secs(),
        total_requests: state.get_request_count(),
    })
}

/// Readiness response
#[derive(Serialize, ToSchema)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub checks: ReadinessChecks,
    /// Entity link cache counters; null when the linker keeps no cache
    pub link_cache: Option<LinkCacheResponse>,
}

/// Entity link cache counters
#[derive(Serialize, ToSchema)]
pub struct LinkCacheResponse {
    pub entries: u64,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    /// Hits over lookups (0.0 - 1.0)
    pub hit_rate: f64,
}

impl From<CacheStatsReport> for LinkCacheResponse {
    fn from(report: CacheStatsReport) -> Self {
        Self {
            entries: report.entries,
            hits: report.hits,
            misses: report.misses,
            writes: report.writes,
            hit_rate: report.hit_rate,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ReadinessChecks {
    /// Name of the loaded extraction backend
    pub extractor: String,
    pub language_detection: bool,
    pub sentiment: bool,
    pub entity_linking: bool,
}

/// Readiness probe - reports loaded capabilities
#[utoipa::path(
    get,
    path = "/ready",
    tag = "health",
    responses(
        (status = 200, description = "Service is ready", body = ReadinessResponse),
        (status = 503, description = "Service not ready", body = ReadinessResponse)
    )
)]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let is_ready = state.is_ready();
    let defaults = state.service.default_options();

    let response = ReadinessResponse {
        ready: is_ready,
        checks: ReadinessChecks {
            extractor: state.service.extractor_name().to_string(),
            language_detection: defaults.language,
            sentiment: defaults.sentiment,
            entity_linking: defaults.linking,
        },
        link_cache: state
            .service
            .link_cache_stats()
            .await
            .map(LinkCacheResponse::from),
    };

    if is_ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}
