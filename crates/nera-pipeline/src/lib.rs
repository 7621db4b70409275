//! NERA Pipeline - Batch orchestration
//!
//! Ties the stages together:
//! - [`aggregator`]: assembles documents and batch statistics in input order
//! - [`export`]: deterministic CSV/TSV/JSON/JSON Lines rendering
//! - [`driver`]: bounded, cancellable batch execution
//! - [`service`]: the long-lived service object used by the CLI and API

pub mod aggregator;
pub mod driver;
pub mod export;
pub mod service;

pub use aggregator::{
    Aggregator, BatchEntry, BatchResult, BatchStats, BatchSummary, EntryOutcome, RunningMean,
};
pub use driver::{BatchDriver, BatchLimits, DriverState};
pub use export::{export, render, Destination, ExportFormat, ExportTarget};
pub use service::AnalysisService;

// Re-exported so callers need not depend on tokio-util directly
pub use tokio_util::sync::CancellationToken;
