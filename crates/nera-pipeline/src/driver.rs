//! Batch driver
//!
//! Orders the inputs, applies batch limits and fans work out to a bounded
//! pool of tasks. Each task loads and extracts one document on the blocking
//! pool, then enriches it. The driver loop is the only owner of the
//! [`Aggregator`]; it records every outcome as tasks complete.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aggregator::{Aggregator, BatchResult};
use nera_core::{Document, Entity, FailureRecord, NeraError, PipelineConfig, Result};
use nera_enrich::{Enricher, EnrichmentOptions};
use nera_extractor::EntityExtractor;
use nera_parser::{InputItem, InputSet};

/// Lifecycle of a [`BatchDriver`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Running,
    Completed,
}

impl DriverState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            _ => Self::Completed,
        }
    }
}

impl std::fmt::Display for DriverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caps applied to a batch before dispatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchLimits {
    /// Maximum number of items
    pub max_items: Option<usize>,
    /// Maximum total input size in bytes
    pub max_bytes: Option<u64>,
}

impl BatchLimits {
    /// Sort items by source id and drop whatever exceeds the limits
    pub fn apply(&self, mut items: Vec<InputItem>) -> Vec<InputItem> {
        items.sort_by_key(|item| item.source_id());
        let submitted = items.len();

        if let Some(max_items) = self.max_items {
            items.truncate(max_items);
        }

        if let Some(max_bytes) = self.max_bytes {
            let mut total = 0u64;
            let keep = items
                .iter()
                .take_while(|item| {
                    total = total.saturating_add(item.byte_len());
                    total <= max_bytes
                })
                .count();
            items.truncate(keep);
        }

        if items.len() < submitted {
            warn!(
                "Batch truncated to {} of {} items (max_items: {:?}, max_bytes: {:?})",
                items.len(),
                submitted,
                self.max_items,
                self.max_bytes
            );
        }
        items
    }
}

/// Result of one worker task
struct ItemOutcome {
    index: usize,
    source_id: String,
    result: std::result::Result<Document, FailureRecord>,
}

/// Runs one batch through extraction and enrichment
pub struct BatchDriver {
    extractor: Arc<dyn EntityExtractor>,
    enricher: Arc<Enricher>,
    options: EnrichmentOptions,
    concurrency: usize,
    limits: BatchLimits,
    state: AtomicU8,
}

impl BatchDriver {
    /// Driver with the enricher's default options and 4 workers
    pub fn new(extractor: Arc<dyn EntityExtractor>, enricher: Arc<Enricher>) -> Self {
        let options = enricher.defaults();
        Self {
            extractor,
            enricher,
            options,
            concurrency: 4,
            limits: BatchLimits::default(),
            state: AtomicU8::new(DriverState::Idle as u8),
        }
    }

    /// Apply concurrency and limits from pipeline configuration
    pub fn with_pipeline_config(self, config: &PipelineConfig) -> Self {
        self.with_concurrency(config.concurrency)
            .with_limits(BatchLimits {
                max_items: config.max_items,
                max_bytes: config.max_bytes,
            })
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_limits(mut self, limits: BatchLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_options(mut self, options: EnrichmentOptions) -> Self {
        self.options = options;
        self
    }

    pub fn state(&self) -> DriverState {
        DriverState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Process a batch to completion
    ///
    /// Per-item failures are recorded in the result and never abort the
    /// batch. When `cancel` fires, undispatched items are recorded as
    /// cancelled and in-flight items stop at their enrichment step.
    pub async fn run(&self, inputs: InputSet, cancel: CancellationToken) -> Result<BatchResult> {
        self.state
            .compare_exchange(
                DriverState::Idle as u8,
                DriverState::Running as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map_err(|current| {
                NeraError::Validation(format!(
                    "batch driver is {}, expected idle",
                    DriverState::from_u8(current)
                ))
            })?;

        let submitted = inputs.items.len();
        let items = self.limits.apply(inputs.items);
        let total = items.len();
        info!(
            "Starting batch of {} items with {} workers",
            total, self.concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut workers: JoinSet<ItemOutcome> = JoinSet::new();
        let mut in_flight: BTreeMap<usize, String> = BTreeMap::new();
        let mut aggregator = Aggregator::new();
        aggregator.record_truncated(submitted - total);
        let mut queue = items.into_iter().enumerate().peekable();
        let mut cancelled = false;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled(), if !cancelled && queue.peek().is_some() => {
                    cancelled = true;
                    let mut skipped = 0;
                    for (index, item) in queue.by_ref() {
                        aggregator.record_failure(
                            index,
                            item.source_id(),
                            FailureRecord::cancelled("batch cancelled before dispatch"),
                        );
                        skipped += 1;
                    }
                    warn!("Batch cancelled, {} items not dispatched", skipped);
                }

                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    match joined {
                        Ok(outcome) => {
                            in_flight.remove(&outcome.index);
                            match outcome.result {
                                Ok(document) => {
                                    debug!(
                                        "{}: {} entities",
                                        outcome.source_id,
                                        document.entities.len()
                                    );
                                    aggregator.record_document(outcome.index, document);
                                }
                                Err(failure) => aggregator.record_failure(
                                    outcome.index,
                                    outcome.source_id,
                                    failure,
                                ),
                            }
                        }
                        // The item stays in `in_flight` and is failed below
                        Err(err) => warn!("Worker task aborted: {}", err),
                    }
                }

                Ok(permit) = semaphore.clone().acquire_owned(), if !cancelled && queue.peek().is_some() => {
                    if let Some((index, item)) = queue.next() {
                        let source_id = item.source_id();
                        let extractor = Arc::clone(&self.extractor);
                        let enricher = Arc::clone(&self.enricher);
                        let options = self.options;
                        let cancel = cancel.clone();

                        in_flight.insert(index, source_id);
                        workers.spawn(async move {
                            let outcome =
                                process_item(index, item, extractor, enricher, options, cancel).await;
                            drop(permit);
                            outcome
                        });
                    }
                }

                else => break,
            }
        }

        for (index, source_id) in in_flight {
            let err = NeraError::Extraction("worker task failed".to_string());
            aggregator.record_failure(index, source_id, FailureRecord::from(&err));
        }

        let result = aggregator.finish();
        self.state
            .store(DriverState::Completed as u8, Ordering::SeqCst);

        info!(
            "Batch complete: {} succeeded, {} failed",
            result.success_count(),
            result.failure_count()
        );
        Ok(result)
    }
}

/// Load, extract and enrich one item
async fn process_item(
    index: usize,
    item: InputItem,
    extractor: Arc<dyn EntityExtractor>,
    enricher: Arc<Enricher>,
    options: EnrichmentOptions,
    cancel: CancellationToken,
) -> ItemOutcome {
    let source_id = item.source_id();

    let extracted = task::spawn_blocking(move || {
        let raw = item.load()?;
        let entities = extractor.extract(&raw.text)?;
        Ok::<_, NeraError>((raw, entities))
    })
    .await;

    let (raw, extracted) = match extracted {
        Ok(Ok(pair)) => pair,
        Ok(Err(e)) => {
            return ItemOutcome {
                index,
                source_id,
                result: Err(FailureRecord::from(&e)),
            }
        }
        Err(join_err) => {
            let err = NeraError::Extraction(format!("extractor panicked: {join_err}"));
            return ItemOutcome {
                index,
                source_id,
                result: Err(FailureRecord::from(&err)),
            };
        }
    };

    let entities: Vec<Entity> = extracted.iter().cloned().map(Entity::from).collect();

    let enrichment = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        enrichment = enricher.enrich_with(&raw.text, &entities, options) => Some(enrichment),
    };

    let result = match enrichment {
        Some(enrichment) => Ok(Aggregator::assemble(raw, extracted, enrichment)),
        None => Err(FailureRecord::cancelled("batch cancelled during enrichment")),
    };

    ItemOutcome {
        index,
        source_id,
        result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nera_core::FailureKind;
    use nera_extractor::ExtractedEntity;

    struct Capitals;

    impl EntityExtractor for Capitals {
        fn name(&self) -> &str {
            "capitals"
        }

        fn extract(&self, text: &str) -> Result<Vec<ExtractedEntity>> {
            if text.contains("EXPLODE") {
                return Err(NeraError::Extraction("backend refused".to_string()));
            }
            let mut entities = Vec::new();
            let mut offset = 0;
            for word in text.split(' ') {
                if word.chars().next().is_some_and(|c| c.is_uppercase()) {
                    entities.push(ExtractedEntity::from_span(
                        text,
                        offset,
                        offset + word.len(),
                        "ORG",
                        0.5,
                    ));
                }
                offset += word.len() + 1;
            }
            Ok(entities)
        }
    }

    struct Panics;

    impl EntityExtractor for Panics {
        fn name(&self) -> &str {
            "panics"
        }

        fn extract(&self, _text: &str) -> Result<Vec<ExtractedEntity>> {
            panic!("model crashed");
        }
    }

    fn driver(extractor: Arc<dyn EntityExtractor>) -> BatchDriver {
        BatchDriver::new(extractor, Arc::new(Enricher::new()))
    }

    #[test]
    fn test_limits_sort_and_truncate() {
        let items = InputSet::from_texts(["ccc", "a", "bb", "dddd"]).items;
        let limited = BatchLimits {
            max_items: Some(3),
            max_bytes: Some(4),
        }
        .apply(items);

        let ids: Vec<String> = limited.iter().map(|i| i.source_id()).collect();
        assert_eq!(ids, vec!["text-000001", "text-000002"]);
    }

    #[tokio::test]
    async fn test_truncated_items_are_counted() {
        let driver = driver(Arc::new(Capitals)).with_limits(BatchLimits {
            max_items: Some(2),
            max_bytes: None,
        });
        let inputs = InputSet::from_texts(["Acme", "Globex", "Initech", "Umbrella", "Hooli"]);
        let result = driver.run(inputs, CancellationToken::new()).await.unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result.stats.truncated, 3);
        assert!(result
            .summary()
            .report()
            .contains("Truncated: 3 items dropped by batch limits"));
    }

    #[tokio::test]
    async fn test_run_preserves_input_order() {
        let driver = driver(Arc::new(Capitals)).with_concurrency(3);
        assert_eq!(driver.state(), DriverState::Idle);

        let texts: Vec<String> = (0..20).map(|i| format!("Item {i} here")).collect();
        let result = driver
            .run(InputSet::from_texts(texts), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(driver.state(), DriverState::Completed);
        assert_eq!(result.success_count(), 20);
        let indices: Vec<usize> = result.entries.iter().map(|e| e.index).collect();
        assert_eq!(indices, (0..20).collect::<Vec<_>>());
        assert_eq!(result.entries[7].source_id, "text-000008");
    }

    #[tokio::test]
    async fn test_failures_do_not_abort_batch() {
        let driver = driver(Arc::new(Capitals));
        let inputs = InputSet::from_texts(["Acme builds", "  ", "EXPLODE now", "Globex sells"]);
        let result = driver.run(inputs, CancellationToken::new()).await.unwrap();

        assert_eq!(result.success_count(), 2);
        assert_eq!(result.failure_count(), 2);
        let kinds: Vec<FailureKind> = result.failures().map(|(_, f)| f.kind).collect();
        assert_eq!(kinds, vec![FailureKind::Validation, FailureKind::Extraction]);
    }

    #[tokio::test]
    async fn test_panicking_extractor_becomes_extraction_failure() {
        let driver = driver(Arc::new(Panics));
        let result = driver
            .run(InputSet::from_texts(["one", "two"]), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.failure_count(), 2);
        assert!(result
            .failures()
            .all(|(_, f)| f.kind == FailureKind::Extraction));
    }

    #[tokio::test]
    async fn test_cancel_before_dispatch() {
        let driver = driver(Arc::new(Capitals));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = driver
            .run(InputSet::from_texts(["Alpha", "Beta", "Gamma"]), cancel)
            .await
            .unwrap();

        assert_eq!(result.len(), 3);
        assert!(result
            .failures()
            .all(|(_, f)| f.kind == FailureKind::Cancelled));
        assert_eq!(driver.state(), DriverState::Completed);
    }

    #[tokio::test]
    async fn test_driver_runs_once() {
        let driver = driver(Arc::new(Capitals));
        driver
            .run(InputSet::from_texts(["Alpha"]), CancellationToken::new())
            .await
            .unwrap();
        let err = driver
            .run(InputSet::from_texts(["Beta"]), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, NeraError::Validation(_)));
    }

    #[tokio::test]
    async fn test_empty_batch_completes() {
        let driver = driver(Arc::new(Capitals));
        let result = driver
            .run(InputSet::default(), CancellationToken::new())
            .await
            .unwrap();
        assert!(result.is_empty());
        assert_eq!(driver.state(), DriverState::Completed);
    }
}
