//! API route definitions

use crate::handlers::analyze;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Create API v1 routes
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/analyze", post(analyze::analyze_text))
        .route("/batch", post(analyze::analyze_batch))
        .route("/upload", post(analyze::upload_file))
        .route("/entities/types", get(analyze::entity_types))
}
