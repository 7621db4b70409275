//! Analysis service
//!
//! Owns the extraction backends and the enricher for the lifetime of a
//! process. Constructed once at startup, shared behind an `Arc` and torn
//! down with [`AnalysisService::shutdown`].

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::aggregator::{Aggregator, BatchResult};
use crate::driver::BatchDriver;
use nera_core::{AppConfig, Document, Entity, NeraError, PipelineConfig, Result};
use nera_enrich::{CacheStatsReport, Enricher, EnrichmentOptions};
use nera_extractor::{EnsembleExtractor, EntityExtractor, HeuristicNer, RuleBasedNer};
use nera_parser::{adapt, adapt_text, InputSet, RawDocument};

/// Entry point for single-document and batch analysis
pub struct AnalysisService {
    extractor: Arc<dyn EntityExtractor>,
    enricher: Arc<Enricher>,
    pipeline: PipelineConfig,
}

impl AnalysisService {
    pub fn new(
        extractor: Arc<dyn EntityExtractor>,
        enricher: Arc<Enricher>,
        pipeline: PipelineConfig,
    ) -> Self {
        Self {
            extractor,
            enricher,
            pipeline,
        }
    }

    /// Build the default backends from configuration
    ///
    /// Extraction is an ensemble of the rule-based and heuristic taggers.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let ensemble = EnsembleExtractor::new(vec![
            Box::new(RuleBasedNer::new()),
            Box::new(HeuristicNer::new()),
        ])
        .with_min_confidence(config.pipeline.min_confidence);

        let enricher = Enricher::from_config(&config.enrichment)?;

        info!(
            "Analysis service ready (extractors: {}, language: {}, sentiment: {}, linking: {})",
            ensemble.backend_names().join("+"),
            config.enrichment.language,
            config.enrichment.sentiment,
            config.enrichment.linking
        );

        Ok(Self::new(
            Arc::new(ensemble),
            Arc::new(enricher),
            config.pipeline.clone(),
        ))
    }

    pub fn extractor_name(&self) -> &str {
        self.extractor.name()
    }

    /// Enrichment options used when the caller does not choose
    pub fn default_options(&self) -> EnrichmentOptions {
        self.enricher.defaults()
    }

    /// Entity link cache counters, when the linker keeps a cache
    pub async fn link_cache_stats(&self) -> Option<CacheStatsReport> {
        self.enricher.link_cache_stats().await
    }

    pub fn pipeline_config(&self) -> &PipelineConfig {
        &self.pipeline
    }

    /// Analyze one inline text with the default options
    pub async fn analyze_text(&self, text: &str) -> Result<Document> {
        self.analyze_with("text-000001", text, self.default_options())
            .await
    }

    /// Analyze one inline text
    pub async fn analyze_with(
        &self,
        source_id: &str,
        text: &str,
        options: EnrichmentOptions,
    ) -> Result<Document> {
        let raw = adapt_text(source_id, text)?;
        self.analyze_raw(raw, options).await
    }

    /// Analyze uploaded bytes, decoding lossily if needed
    pub async fn analyze_bytes(
        &self,
        source_id: &str,
        bytes: Vec<u8>,
        options: EnrichmentOptions,
    ) -> Result<Document> {
        let raw = adapt(source_id, bytes)?;
        self.analyze_raw(raw, options).await
    }

    async fn analyze_raw(&self, raw: RawDocument, options: EnrichmentOptions) -> Result<Document> {
        let extractor = Arc::clone(&self.extractor);
        let text = raw.text.clone();
        let extracted = tokio::task::spawn_blocking(move || extractor.extract(&text))
            .await
            .map_err(|e| NeraError::Extraction(format!("extractor panicked: {e}")))??;

        let entities: Vec<Entity> = extracted.iter().cloned().map(Entity::from).collect();
        let enrichment = self
            .enricher
            .enrich_with(&raw.text, &entities, options)
            .await;

        Ok(Aggregator::assemble(raw, extracted, enrichment))
    }

    /// A fresh driver configured from the pipeline settings
    pub fn driver(&self) -> BatchDriver {
        BatchDriver::new(Arc::clone(&self.extractor), Arc::clone(&self.enricher))
            .with_pipeline_config(&self.pipeline)
    }

    /// Run a batch with the default options
    pub async fn run_batch(&self, inputs: InputSet, cancel: CancellationToken) -> Result<BatchResult> {
        self.driver().run(inputs, cancel).await
    }

    /// Run a batch with explicit enrichment options
    pub async fn run_batch_with(
        &self,
        inputs: InputSet,
        options: EnrichmentOptions,
        cancel: CancellationToken,
    ) -> Result<BatchResult> {
        self.driver().with_options(options).run(inputs, cancel).await
    }

    /// Release cached state held by the enrichment backends
    pub async fn shutdown(&self) {
        self.enricher.clear_caches().await;
        info!("Analysis service shut down");
    }
}
