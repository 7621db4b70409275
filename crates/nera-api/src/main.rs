//! NERA API Server
//!
//! REST API server for named entity analysis.

use nera_api::{create_router, state::AppState};
use nera_core::{AppConfig, LoggingConfig};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset; `nera` covers every workspace crate
fn default_filter(level: &str) -> String {
    format!("nera={level},tower_http=debug")
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(&logging.level)));

    if logging.json_format {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn load_config() -> anyhow::Result<AppConfig> {
    let config = match std::env::var("NERA_CONFIG") {
        Ok(path) => AppConfig::from_file(path)?.with_env_override()?,
        Err(_) => AppConfig::from_env()?,
    };
    Ok(config)
}

async fn shutdown_signal(state: Arc<AppState>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
    // Requests still draining see 503 from /ready and the analysis routes
    state.set_ready(false);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    init_tracing(&config.logging);

    let addr = format!("{}:{}", config.server.host, config.server.port);

    // Create application state
    let state = Arc::new(AppState::new(config)?);
    let service = state.service.clone();

    // Create router
    let app = create_router(Arc::clone(&state));

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("NERA API Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui/", addr);
    tracing::info!("OpenAPI document at http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    service.shutdown().await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Level;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_default_filter_covers_every_crate() {
        let filter = EnvFilter::new(default_filter("warn"));
        let subscriber = tracing_subscriber::registry().with(filter);

        tracing::subscriber::with_default(subscriber, || {
            assert!(tracing::enabled!(target: "nera_api", Level::WARN));
            assert!(tracing::enabled!(target: "nera_enrich", Level::WARN));
            assert!(tracing::enabled!(target: "nera_parser::decode", Level::WARN));
            assert!(tracing::enabled!(target: "nera_extractor", Level::WARN));
            assert!(!tracing::enabled!(target: "nera_enrich", Level::INFO));
            assert!(!tracing::enabled!(target: "hyper", Level::WARN));
        });
    }
}
