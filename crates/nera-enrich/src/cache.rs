//! Entity link cache
//!
//! Knowledge graph lookups are slow and rate limited, so resolved links are
//! kept in a concurrent moka cache with a TTL. Negative results (no match)
//! are cached too.

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::EntityLink;

/// Cache sizing
#[derive(Debug, Clone)]
pub struct LinkCacheConfig {
    /// Maximum number of cached surface forms
    pub max_capacity: u64,

    /// Time-to-live for entries (in seconds)
    pub ttl_seconds: u64,
}

impl Default for LinkCacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            ttl_seconds: 3600,
        }
    }
}

/// Cache for resolved entity links, keyed by surface text
#[derive(Clone)]
pub struct LinkCache {
    cache: Cache<String, Option<EntityLink>>,
    stats: Arc<CacheStats>,
}

impl LinkCache {
    pub fn new() -> Self {
        Self::with_config(&LinkCacheConfig::default())
    }

    pub fn with_config(config: &LinkCacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .time_to_live(Duration::from_secs(config.ttl_seconds))
            .build();

        Self {
            cache,
            stats: Arc::new(CacheStats::default()),
        }
    }

    /// Look up a surface form
    ///
    /// The outer `Option` is the cache miss, the inner one a cached
    /// "no match" answer.
    pub async fn get(&self, text: &str) -> Option<Option<EntityLink>> {
        let result = self.cache.get(text).await;

        if result.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }

        result
    }

    pub async fn put(&self, text: &str, link: Option<EntityLink>) {
        self.cache.insert(text.to_string(), link).await;
        self.stats.record_write();
    }

    /// Drop every cached link
    pub async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        self.stats.reset();
    }

    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Counters plus the current entry count
    pub async fn report(&self) -> CacheStatsReport {
        self.cache.run_pending_tasks().await;
        CacheStatsReport {
            entries: self.entry_count(),
            ..self.stats.report()
        }
    }
}

impl Default for LinkCache {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Cache Statistics
// ============================================================================

/// Hit/miss counters for the link cache
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

impl CacheStats {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.writes.store(0, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Hit rate (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses();
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }

    pub fn report(&self) -> CacheStatsReport {
        CacheStatsReport {
            hits: self.hits(),
            misses: self.misses(),
            writes: self.writes(),
            hit_rate: self.hit_rate(),
            entries: 0,
        }
    }
}

/// Serializable snapshot of [`CacheStats`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatsReport {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub hit_rate: f64,
    /// Cached surface forms; zero when taken from bare counters
    pub entries: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_miss_then_hit() {
        let cache = LinkCache::new();
        assert!(cache.get("Apple Inc.").await.is_none());

        cache.put("Apple Inc.", Some(EntityLink::new("Q312"))).await;
        assert_eq!(cache.get("Apple Inc.").await, Some(Some(EntityLink::new("Q312"))));

        let stats = cache.stats();
        assert_eq!(stats.hits(), 1);
        assert_eq!(stats.misses(), 1);
        assert_eq!(stats.writes(), 1);
        assert!((stats.hit_rate() - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_negative_results_are_cached() {
        let cache = LinkCache::new();
        cache.put("Nowhereville", None).await;
        assert_eq!(cache.get("Nowhereville").await, Some(None));
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = LinkCache::new();
        cache.put("Google", Some(EntityLink::new("Q95"))).await;
        cache.clear().await;

        assert!(cache.get("Google").await.is_none());
        assert_eq!(cache.stats().writes(), 0);
    }

    #[tokio::test]
    async fn test_report_counts_entries() {
        let cache = LinkCache::new();
        cache.put("Google", Some(EntityLink::new("Q95"))).await;
        cache.put("Nowhereville", None).await;
        let _ = cache.get("Google").await;

        let report = cache.report().await;
        assert_eq!(report.entries, 2);
        assert_eq!(report.writes, 2);
        assert_eq!(report.hits, 1);
        assert_eq!(report.misses, 0);
        assert!((report.hit_rate - 1.0).abs() < 1e-9);
    }
}
