//! NERA Enrich - Optional annotations on top of extraction
//!
//! Three independent capabilities, each behind an async trait:
//! - Language detection for the whole document
//! - Sentiment scoring for the whole document
//! - Entity linking against a knowledge graph
//!
//! The [`Enricher`] runs the enabled capabilities under a per-call timeout.
//! A capability that errors or times out leaves its field empty and logs a
//! warning; enrichment never fails a document.

pub mod cache;
pub mod language;
pub mod linker;
pub mod sentiment;

pub use cache::{CacheStats, CacheStatsReport, LinkCache, LinkCacheConfig};
pub use language::StopwordDetector;
pub use linker::WikidataLinker;
pub use sentiment::LexiconSentiment;

use async_trait::async_trait;
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use nera_core::{EnrichmentConfig, Entity, NeraError, Result};

// ============================================================================
// Capability Ports
// ============================================================================

/// Document language detection
#[async_trait]
pub trait LanguageDetector: Send + Sync {
    /// ISO 639-1 code, or `None` when the language is unknown
    async fn detect_language(&self, text: &str) -> Result<Option<String>>;
}

/// Document sentiment scoring
#[async_trait]
pub trait SentimentScorer: Send + Sync {
    /// Polarity in [-1, 1], or `None` when the text carries no opinion
    async fn score_sentiment(&self, text: &str) -> Result<Option<f64>>;

    /// Subjectivity in [0, 1]; scorers without one report `None`
    async fn score_subjectivity(&self, _text: &str) -> Result<Option<f64>> {
        Ok(None)
    }
}

/// A knowledge graph match for one entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityLink {
    /// External identifier, e.g. a Wikidata QID
    pub id: String,
    /// Short description published with the match
    pub description: Option<String>,
}

impl EntityLink {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Entity linking against an external knowledge graph
#[async_trait]
pub trait EntityLinker: Send + Sync {
    /// Knowledge graph match for the entity, if one is found
    async fn link_entity(&self, entity: &Entity) -> Result<Option<EntityLink>>;

    /// Drop any cached lookups
    async fn clear_cache(&self) {}

    /// Lookup cache counters, for linkers that keep a cache
    async fn cache_stats(&self) -> Option<CacheStatsReport> {
        None
    }
}

// ============================================================================
// Enricher
// ============================================================================

/// Which capabilities to run for one document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrichmentOptions {
    pub language: bool,
    pub sentiment: bool,
    pub linking: bool,
}

impl EnrichmentOptions {
    /// Nothing enabled
    pub fn none() -> Self {
        Self {
            language: false,
            sentiment: false,
            linking: false,
        }
    }
}

impl From<&EnrichmentConfig> for EnrichmentOptions {
    fn from(config: &EnrichmentConfig) -> Self {
        Self {
            language: config.language,
            sentiment: config.sentiment,
            linking: config.linking,
        }
    }
}

/// Enrichment output for one document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichmentResult {
    pub language: Option<String>,
    pub sentiment: Option<f64>,
    pub subjectivity: Option<f64>,
    /// One slot per input entity, in input order
    pub links: Vec<Option<EntityLink>>,
    /// Capabilities that errored or timed out
    pub degraded: Vec<String>,
}

impl EnrichmentResult {
    /// Copy resolved links onto `entities`
    pub fn apply_links(&self, entities: &mut [Entity]) {
        for (entity, link) in entities.iter_mut().zip(&self.links) {
            if let Some(link) = link {
                entity.linked_id = Some(link.id.clone());
                entity.linked_description = link.description.clone();
            }
        }
    }
}

/// Outcome of one guarded capability call
enum Guarded<T> {
    Value(Option<T>),
    Degraded(String),
}

/// Runs the enrichment capabilities for a document
#[derive(Clone)]
pub struct Enricher {
    language: Option<Arc<dyn LanguageDetector>>,
    sentiment: Option<Arc<dyn SentimentScorer>>,
    linker: Option<Arc<dyn EntityLinker>>,
    defaults: EnrichmentOptions,
    timeout: Duration,
}

impl Enricher {
    /// Enricher with no capabilities and a 10s timeout
    pub fn new() -> Self {
        Self {
            language: None,
            sentiment: None,
            linker: None,
            defaults: EnrichmentOptions::none(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Build the reference capabilities from configuration
    ///
    /// All three backends are constructed so a request can opt into a
    /// capability the configuration leaves off by default.
    pub fn from_config(config: &EnrichmentConfig) -> Result<Self> {
        Ok(Self::new()
            .with_language_detector(Arc::new(StopwordDetector::new()))
            .with_sentiment_scorer(Arc::new(LexiconSentiment::new()))
            .with_linker(Arc::new(WikidataLinker::from_config(config)?))
            .with_defaults(EnrichmentOptions::from(config))
            .with_timeout(Duration::from_secs(config.timeout_secs)))
    }

    pub fn with_language_detector(mut self, detector: Arc<dyn LanguageDetector>) -> Self {
        self.language = Some(detector);
        self
    }

    pub fn with_sentiment_scorer(mut self, scorer: Arc<dyn SentimentScorer>) -> Self {
        self.sentiment = Some(scorer);
        self
    }

    pub fn with_linker(mut self, linker: Arc<dyn EntityLinker>) -> Self {
        self.linker = Some(linker);
        self
    }

    /// Options used by [`Enricher::enrich`]
    pub fn with_defaults(mut self, defaults: EnrichmentOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// Per-call timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn defaults(&self) -> EnrichmentOptions {
        self.defaults
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Enrich with the default options
    pub async fn enrich(&self, text: &str, entities: &[Entity]) -> EnrichmentResult {
        self.enrich_with(text, entities, self.defaults).await
    }

    /// Enrich with explicit options
    ///
    /// Language, sentiment and every entity link run concurrently.
    pub async fn enrich_with(
        &self,
        text: &str,
        entities: &[Entity],
        options: EnrichmentOptions,
    ) -> EnrichmentResult {
        let language = async {
            match (&self.language, options.language) {
                (Some(detector), true) => {
                    self.guard("language", detector.detect_language(text)).await
                }
                _ => Guarded::Value(None),
            }
        };

        let sentiment = async {
            match (&self.sentiment, options.sentiment) {
                (Some(scorer), true) => {
                    let scores = async {
                        let polarity = scorer.score_sentiment(text).await?;
                        let subjectivity = scorer.score_subjectivity(text).await?;
                        Ok::<_, NeraError>(Some((polarity, subjectivity)))
                    };
                    self.guard("sentiment", scores).await
                }
                _ => Guarded::Value(None),
            }
        };

        let links = async {
            match (&self.linker, options.linking) {
                (Some(linker), true) => {
                    join_all(
                        entities
                            .iter()
                            .map(|entity| self.guard("linking", linker.link_entity(entity))),
                    )
                    .await
                }
                _ => entities.iter().map(|_| Guarded::Value(None)).collect(),
            }
        };

        let (language, sentiment, links) = tokio::join!(language, sentiment, links);

        let mut result = EnrichmentResult::default();
        result.language = result.take(language);
        (result.sentiment, result.subjectivity) = result.take(sentiment).unwrap_or_default();
        let links: Vec<Option<EntityLink>> = links.into_iter().map(|l| result.take(l)).collect();
        result.links = links;
        result.degraded.dedup();
        result
    }

    /// Drop cached knowledge-graph lookups
    pub async fn clear_caches(&self) {
        if let Some(linker) = &self.linker {
            linker.clear_cache().await;
        }
    }

    /// Link cache counters, when the linker keeps a cache
    pub async fn link_cache_stats(&self) -> Option<CacheStatsReport> {
        match &self.linker {
            Some(linker) => linker.cache_stats().await,
            None => None,
        }
    }

    async fn guard<T, F>(&self, capability: &str, call: F) -> Guarded<T>
    where
        F: Future<Output = Result<Option<T>>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Guarded::Value(value),
            Ok(Err(e)) => {
                warn!("Enrichment {} failed: {}", capability, e);
                Guarded::Degraded(capability.to_string())
            }
            Err(_) => {
                let err = NeraError::EnrichmentTimeout {
                    capability: capability.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                };
                warn!("{}", err);
                Guarded::Degraded(capability.to_string())
            }
        }
    }
}

impl EnrichmentResult {
    fn take<T>(&mut self, outcome: Guarded<T>) -> Option<T> {
        match outcome {
            Guarded::Value(value) => value,
            Guarded::Degraded(capability) => {
                self.degraded.push(capability);
                None
            }
        }
    }
}

impl Default for Enricher {
    fn default() -> Self {
        Self::new()
    }
}
