//! Application state management

use crate::error::AppError;
use nera_core::{AppConfig, Result};
use nera_pipeline::AnalysisService;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Analysis service (extractors + enricher)
    pub service: Arc<AnalysisService>,
    /// Server start time
    pub start_time: Instant,
    /// Request counter
    pub request_count: AtomicU64,
    /// Ready status
    pub is_ready: AtomicBool,
}

impl AppState {
    /// Build state and the analysis service from config
    pub fn new(config: AppConfig) -> Result<Self> {
        let service = AnalysisService::from_config(&config)?;
        Ok(Self::with_service(config, Arc::new(service)))
    }

    /// Build state around an existing service
    pub fn with_service(config: AppConfig, service: Arc<AnalysisService>) -> Self {
        Self {
            config,
            service,
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
            is_ready: AtomicBool::new(true),
        }
    }

    /// Increment request counter
    pub fn increment_requests(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::SeqCst)
    }

    /// Get total request count
    pub fn get_request_count(&self) -> u64 {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Check if service is ready
    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::SeqCst)
    }

    /// Set ready status
    pub fn set_ready(&self, ready: bool) {
        self.is_ready.store(ready, Ordering::SeqCst);
    }

    /// Reject new analysis work once the server is draining
    pub fn ensure_ready(&self) -> std::result::Result<(), AppError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(AppError::Unavailable("server is shutting down".to_string()))
        }
    }
}
