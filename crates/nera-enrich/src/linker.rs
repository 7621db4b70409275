//! Knowledge graph entity linking
//!
//! Resolves entity surface forms to Wikidata item ids and descriptions
//! through the `wbsearchentities` action. Only labels that name a concrete
//! thing (people, organisations, places, events) are looked up.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::cache::{LinkCache, LinkCacheConfig};
use crate::cache::CacheStatsReport;
use crate::{EntityLink, EntityLinker};
use nera_core::{EnrichmentConfig, Entity, NeraError, Result};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    id: String,
    description: Option<String>,
}

impl From<SearchHit> for EntityLink {
    fn from(hit: SearchHit) -> Self {
        Self {
            id: hit.id,
            description: hit.description.filter(|d| !d.is_empty()),
        }
    }
}

/// Wikidata-backed linker with a local cache
pub struct WikidataLinker {
    client: Client,
    base_url: String,
    language: String,
    cache: LinkCache,
}

impl WikidataLinker {
    /// Create a linker against `base_url` with an HTTP timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("nera/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| NeraError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            language: "en".to_string(),
            cache: LinkCache::new(),
        })
    }

    /// Create from enrichment configuration
    pub fn from_config(config: &EnrichmentConfig) -> Result<Self> {
        let cache = LinkCache::with_config(&LinkCacheConfig {
            max_capacity: config.cache_capacity,
            ttl_seconds: config.cache_ttl_secs,
        });

        Ok(
            Self::new(&config.knowledge_graph_url, Duration::from_secs(config.timeout_secs))?
                .with_language(&config.link_language)
                .with_cache(cache),
        )
    }

    /// Language used for the search
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_cache(mut self, cache: LinkCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &LinkCache {
        &self.cache
    }

    async fn search(&self, text: &str) -> Result<Option<EntityLink>> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("action", "wbsearchentities"),
                ("search", text),
                ("language", self.language.as_str()),
                ("format", "json"),
                ("limit", "1"),
            ])
            .send()
            .await
            .map_err(|e| NeraError::Enrichment(format!("Link request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(NeraError::Enrichment(format!(
                "Knowledge graph returned {}",
                response.status()
            )));
        }

        let result: SearchResponse = response
            .json()
            .await
            .map_err(|e| NeraError::Enrichment(format!("Failed to parse link response: {e}")))?;

        Ok(result.search.into_iter().next().map(EntityLink::from))
    }
}

#[async_trait]
impl EntityLinker for WikidataLinker {
    async fn link_entity(&self, entity: &Entity) -> Result<Option<EntityLink>> {
        if !entity.known_label().is_some_and(|l| l.is_linkable()) {
            return Ok(None);
        }

        if let Some(cached) = self.cache.get(&entity.text).await {
            return Ok(cached);
        }

        let linked = self.search(&entity.text).await?;
        debug!("Linked {:?} -> {:?}", entity.text, linked);
        self.cache.put(&entity.text, linked.clone()).await;
        Ok(linked)
    }

    async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    async fn cache_stats(&self) -> Option<CacheStatsReport> {
        Some(self.cache.report().await)
    }
}
