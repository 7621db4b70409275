//! Aggregation of per-document outcomes into a batch result
//!
//! The [`Aggregator`] is owned by a single task. Outcomes may arrive in any
//! order; they are held in a reorder buffer and released strictly by input
//! index so entries, and the running statistics derived from them, are
//! always accumulated in submission order.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use nera_core::{Document, Entity, FailureRecord, TextStats};
use nera_enrich::EnrichmentResult;
use nera_extractor::ExtractedEntity;
use nera_parser::RawDocument;

// ============================================================================
// Running Statistics
// ============================================================================

/// Numerically stable incremental mean
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningMean {
    count: u64,
    mean: f64,
}

impl RunningMean {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one observation into the mean
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        self.mean += (value - self.mean) / self.count as f64;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Current mean, `None` before the first observation
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }
}

/// Aggregate statistics over a batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchStats {
    /// Entries recorded (successes + failures)
    pub total: usize,
    pub successes: usize,
    pub failures: usize,
    pub total_entities: usize,
    pub total_words: usize,
    /// Entity count per label
    pub label_counts: BTreeMap<String, usize>,
    /// Document count per detected language
    pub language_counts: BTreeMap<String, usize>,
    /// Failure count per kind
    pub failure_counts: BTreeMap<String, usize>,
    /// Items dropped by `max_items`/`max_bytes` before processing
    pub truncated: usize,
    /// Mean over every entity confidence in the batch
    pub confidence: RunningMean,
    /// Mean over documents that received a sentiment score
    pub sentiment: RunningMean,
    /// Mean over documents that received a subjectivity score
    pub subjectivity: RunningMean,
}

impl BatchStats {
    pub fn mean_confidence(&self) -> Option<f64> {
        self.confidence.mean()
    }

    pub fn mean_sentiment(&self) -> Option<f64> {
        self.sentiment.mean()
    }

    pub fn mean_subjectivity(&self) -> Option<f64> {
        self.subjectivity.mean()
    }

    fn observe_document(&mut self, document: &Document) {
        self.total += 1;
        self.successes += 1;
        self.total_words += document.stats.word_count;
        self.total_entities += document.entities.len();

        for entity in &document.entities {
            *self.label_counts.entry(entity.label.clone()).or_insert(0) += 1;
            self.confidence.push(entity.confidence as f64);
        }

        if let Some(language) = &document.language {
            *self.language_counts.entry(language.clone()).or_insert(0) += 1;
        }
        if let Some(sentiment) = document.sentiment {
            self.sentiment.push(sentiment);
        }
        if let Some(subjectivity) = document.subjectivity {
            self.subjectivity.push(subjectivity);
        }
    }

    fn observe_failure(&mut self, failure: &FailureRecord) {
        self.total += 1;
        self.failures += 1;
        *self
            .failure_counts
            .entry(failure.kind.to_string())
            .or_insert(0) += 1;
    }
}

// ============================================================================
// Batch Result
// ============================================================================

/// Outcome of one batch item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntryOutcome {
    Success(Document),
    Failure(FailureRecord),
}

/// One batch item, in input order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub index: usize,
    pub source_id: String,
    pub outcome: EntryOutcome,
}

impl BatchEntry {
    pub fn document(&self) -> Option<&Document> {
        match &self.outcome {
            EntryOutcome::Success(document) => Some(document),
            EntryOutcome::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureRecord> {
        match &self.outcome {
            EntryOutcome::Success(_) => None,
            EntryOutcome::Failure(failure) => Some(failure),
        }
    }
}

/// Finalized result of a batch run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub entries: Vec<BatchEntry>,
    pub stats: BatchStats,
}

impl BatchResult {
    /// Successfully analysed documents, in input order
    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.entries.iter().filter_map(BatchEntry::document)
    }

    /// Failed entries, in input order
    pub fn failures(&self) -> impl Iterator<Item = (&BatchEntry, &FailureRecord)> {
        self.entries
            .iter()
            .filter_map(|entry| entry.failure().map(|failure| (entry, failure)))
    }

    pub fn success_count(&self) -> usize {
        self.stats.successes
    }

    pub fn failure_count(&self) -> usize {
        self.stats.failures
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Human-oriented summary of the batch
    ///
    /// `most_common` ranks entity surface texts; per-label frequencies are
    /// already carried by `label_counts`.
    pub fn summary(&self) -> BatchSummary {
        let mut mentions: HashMap<&str, usize> = HashMap::new();
        for entity in self.documents().flat_map(|d| d.entities.iter()) {
            *mentions.entry(entity.text.as_str()).or_insert(0) += 1;
        }

        let mut most_common: Vec<(String, usize)> = mentions
            .into_iter()
            .map(|(text, count)| (text.to_string(), count))
            .collect();
        most_common.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        most_common.truncate(MOST_COMMON_LIMIT);

        BatchSummary {
            total_items: self.stats.total,
            successes: self.stats.successes,
            truncated: self.stats.truncated,
            failures: self
                .failures()
                .map(|(entry, failure)| (entry.source_id.clone(), failure.to_string()))
                .collect(),
            total_words: self.stats.total_words,
            total_entities: self.stats.total_entities,
            label_counts: self.stats.label_counts.clone(),
            language_counts: self.stats.language_counts.clone(),
            most_common,
            mean_confidence: self.stats.mean_confidence(),
            mean_sentiment: self.stats.mean_sentiment(),
            mean_subjectivity: self.stats.mean_subjectivity(),
        }
    }
}

const MOST_COMMON_LIMIT: usize = 10;

/// Summary report over a [`BatchResult`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_items: usize,
    pub successes: usize,
    /// Items dropped by the batch limits, not counted in `total_items`
    pub truncated: usize,
    /// `(source_id, reason)` per failed item
    pub failures: Vec<(String, String)>,
    pub total_words: usize,
    pub total_entities: usize,
    pub label_counts: BTreeMap<String, usize>,
    pub language_counts: BTreeMap<String, usize>,
    /// Most frequent entity texts, most common first
    pub most_common: Vec<(String, usize)>,
    pub mean_confidence: Option<f64>,
    pub mean_sentiment: Option<f64>,
    pub mean_subjectivity: Option<f64>,
}

impl BatchSummary {
    /// Render a plain-text report
    pub fn report(&self) -> String {
        let mut out = format!(
            "=== Batch Analysis Report ===\n\n\
             Items: {} | Succeeded: {} | Failed: {}\n\
             Words: {} | Entities: {}\n\
             Mean confidence: {}\n\
             Mean sentiment:  {}\n\
             Mean subjectivity: {}\n",
            self.total_items,
            self.successes,
            self.failures.len(),
            self.total_words,
            self.total_entities,
            format_optional(self.mean_confidence),
            format_optional(self.mean_sentiment),
            format_optional(self.mean_subjectivity),
        );

        if self.truncated > 0 {
            out.push_str(&format!(
                "Truncated: {} items dropped by batch limits\n",
                self.truncated
            ));
        }

        if !self.label_counts.is_empty() {
            out.push_str("\nEntities by label:\n");
            for (label, count) in &self.label_counts {
                out.push_str(&format!("  {label:<10} {count}\n"));
            }
        }

        if !self.language_counts.is_empty() {
            out.push_str("\nLanguages:\n");
            for (language, count) in &self.language_counts {
                out.push_str(&format!("  {language:<10} {count}\n"));
            }
        }

        if !self.most_common.is_empty() {
            out.push_str("\nMost common entities:\n");
            for (text, count) in &self.most_common {
                out.push_str(&format!("  {text} ({count})\n"));
            }
        }

        if !self.failures.is_empty() {
            out.push_str("\nFailures:\n");
            for (source_id, reason) in &self.failures {
                out.push_str(&format!("  {source_id}: {reason}\n"));
            }
        }

        out
    }
}

fn format_optional(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v:.3}"))
        .unwrap_or_else(|| "n/a".to_string())
}

// ============================================================================
// Aggregator
// ============================================================================

/// Assembles documents and accumulates batch statistics in input order
#[derive(Debug, Default)]
pub struct Aggregator {
    next_index: usize,
    pending: BTreeMap<usize, BatchEntry>,
    entries: Vec<BatchEntry>,
    stats: BatchStats,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the document record for one successful item
    ///
    /// Spans that fall outside the text or off a char boundary are dropped
    /// with a warning. Entities come out ordered by `(start, end, label)`.
    pub fn assemble(
        raw: RawDocument,
        extracted: Vec<ExtractedEntity>,
        enrichment: EnrichmentResult,
    ) -> Document {
        let mut entities: Vec<Entity> = extracted.into_iter().map(Entity::from).collect();
        enrichment.apply_links(&mut entities);

        let before = entities.len();
        entities.retain(|e| e.has_valid_span(&raw.text));
        if entities.len() < before {
            warn!(
                "Dropped {} entities with invalid spans from {}",
                before - entities.len(),
                raw.source_id
            );
        }

        entities.sort_by(|a, b| {
            a.start
                .cmp(&b.start)
                .then_with(|| a.end.cmp(&b.end))
                .then_with(|| a.label.cmp(&b.label))
        });

        let stats = TextStats::compute(&raw.text, &entities);

        Document {
            source_id: raw.source_id,
            text: raw.text,
            language: enrichment.language,
            sentiment: enrichment.sentiment,
            subjectivity: enrichment.subjectivity,
            entities,
            stats,
        }
    }

    /// Assemble and record a successful item
    pub fn add(
        &mut self,
        index: usize,
        raw: RawDocument,
        extracted: Vec<ExtractedEntity>,
        enrichment: EnrichmentResult,
    ) {
        let document = Self::assemble(raw, extracted, enrichment);
        self.record_document(index, document);
    }

    /// Record an already assembled document
    pub fn record_document(&mut self, index: usize, document: Document) {
        let entry = BatchEntry {
            index,
            source_id: document.source_id.clone(),
            outcome: EntryOutcome::Success(document),
        };
        self.submit(entry);
    }

    /// Record a failed item
    pub fn record_failure(
        &mut self,
        index: usize,
        source_id: impl Into<String>,
        failure: FailureRecord,
    ) {
        let entry = BatchEntry {
            index,
            source_id: source_id.into(),
            outcome: EntryOutcome::Failure(failure),
        };
        self.submit(entry);
    }

    /// Count items the batch limits dropped before processing
    pub fn record_truncated(&mut self, dropped: usize) {
        self.stats.truncated += dropped;
    }

    /// Entries released so far
    pub fn recorded(&self) -> usize {
        self.entries.len()
    }

    /// Entries waiting for an earlier index
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Statistics over the entries released so far
    pub fn stats(&self) -> &BatchStats {
        &self.stats
    }

    /// Finalize the batch
    ///
    /// Anything still buffered behind a missing index is released in index
    /// order so no recorded outcome is lost.
    pub fn finish(mut self) -> BatchResult {
        if !self.pending.is_empty() {
            warn!(
                "Finishing with {} buffered entries, first missing index {}",
                self.pending.len(),
                self.next_index
            );
            let pending = std::mem::take(&mut self.pending);
            for (_, entry) in pending {
                self.release(entry);
            }
        }

        BatchResult {
            entries: self.entries,
            stats: self.stats,
        }
    }

    fn submit(&mut self, entry: BatchEntry) {
        if entry.index < self.next_index || self.pending.contains_key(&entry.index) {
            warn!("Ignoring duplicate outcome for index {}", entry.index);
            return;
        }

        self.pending.insert(entry.index, entry);
        while let Some(entry) = self.pending.remove(&self.next_index) {
            self.release(entry);
            self.next_index += 1;
        }
    }

    fn release(&mut self, entry: BatchEntry) {
        match &entry.outcome {
            EntryOutcome::Success(document) => self.stats.observe_document(document),
            EntryOutcome::Failure(failure) => {
                debug!("{} failed: {}", entry.source_id, failure);
                self.stats.observe_failure(failure);
            }
        }
        self.entries.push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nera_core::FailureKind;
    use nera_enrich::EntityLink;

    fn raw(id: &str, text: &str) -> RawDocument {
        RawDocument {
            source_id: id.to_string(),
            text: text.to_string(),
            lossy: false,
        }
    }

    fn founder() -> (RawDocument, Vec<ExtractedEntity>) {
        let text = "Apple Inc. was founded by Steve Jobs.";
        (
            raw("text-000001", text),
            vec![
                ExtractedEntity::from_span(text, 26, 36, "PERSON", 0.95),
                ExtractedEntity::from_span(text, 0, 10, "ORG", 0.9),
            ],
        )
    }

    #[test]
    fn test_running_mean() {
        let mut mean = RunningMean::new();
        assert_eq!(mean.mean(), None);
        for x in [1.0, 2.0, 3.0, 4.0] {
            mean.push(x);
        }
        assert_eq!(mean.count(), 4);
        assert!((mean.mean().unwrap() - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_assemble_orders_and_validates_spans() {
        let (raw, mut extracted) = founder();
        extracted.push(ExtractedEntity {
            text: "ghost".to_string(),
            label: "ORG".to_string(),
            start: 30,
            end: 400,
            confidence: 0.5,
        });

        let enrichment = EnrichmentResult {
            language: Some("en".to_string()),
            links: vec![
                Some(EntityLink::new("Q19837")),
                Some(EntityLink::new("Q312").with_description("American technology company")),
                None,
            ],
            ..Default::default()
        };

        let document = Aggregator::assemble(raw, extracted, enrichment);
        assert_eq!(document.entities.len(), 2);
        assert_eq!(document.entities[0].text, "Apple Inc.");
        assert_eq!(document.entities[0].linked_id.as_deref(), Some("Q312"));
        assert_eq!(
            document.entities[0].linked_description.as_deref(),
            Some("American technology company")
        );
        assert_eq!(document.entities[1].text, "Steve Jobs");
        assert_eq!(document.entities[1].linked_description, None);
        assert_eq!(document.language.as_deref(), Some("en"));
        assert_eq!(document.stats.entity_count, 2);
        assert!(document
            .entities
            .iter()
            .all(|e| e.has_valid_span(&document.text)));
    }

    #[test]
    fn test_out_of_order_outcomes_are_released_in_order() {
        let mut aggregator = Aggregator::new();

        aggregator.record_failure(2, "c", FailureRecord::new(FailureKind::Io, "gone"));
        assert_eq!(aggregator.recorded(), 0);
        assert_eq!(aggregator.buffered(), 1);

        let (raw_b, extracted_b) = founder();
        aggregator.add(1, raw_b, extracted_b, EnrichmentResult::default());
        assert_eq!(aggregator.recorded(), 0);

        aggregator.add(0, raw("a", "Nothing here."), vec![], EnrichmentResult::default());
        assert_eq!(aggregator.recorded(), 3);
        assert_eq!(aggregator.buffered(), 0);

        let result = aggregator.finish();
        let indices: Vec<usize> = result.entries.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(result.success_count(), 2);
        assert_eq!(result.failure_count(), 1);
        assert_eq!(result.stats.label_counts.get("ORG"), Some(&1));
        assert_eq!(result.stats.failure_counts.get("IoError"), Some(&1));
    }

    #[test]
    fn test_duplicate_index_is_ignored() {
        let mut aggregator = Aggregator::new();
        aggregator.record_failure(0, "a", FailureRecord::cancelled("stop"));
        aggregator.record_failure(0, "a", FailureRecord::cancelled("again"));

        let result = aggregator.finish();
        assert_eq!(result.len(), 1);
        assert_eq!(result.stats.total, 1);
    }

    #[test]
    fn test_finish_flushes_gaps() {
        let mut aggregator = Aggregator::new();
        aggregator.record_failure(3, "d", FailureRecord::cancelled("stop"));
        aggregator.record_failure(1, "b", FailureRecord::cancelled("stop"));

        let result = aggregator.finish();
        let indices: Vec<usize> = result.entries.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![1, 3]);
    }

    #[test]
    fn test_summary_and_report() {
        let mut aggregator = Aggregator::new();
        for i in 0..3 {
            let (raw, extracted) = founder();
            let enrichment = EnrichmentResult {
                sentiment: Some(0.5),
                subjectivity: Some(0.8),
                language: Some("en".to_string()),
                ..Default::default()
            };
            aggregator.add(i, raw, extracted, enrichment);
        }
        aggregator.record_failure(
            3,
            "text-000004",
            FailureRecord::from(&nera_core::NeraError::empty_input()),
        );

        let summary = aggregator.finish().summary();
        assert_eq!(summary.total_items, 4);
        assert_eq!(summary.successes, 3);
        assert_eq!(summary.total_entities, 6);
        assert_eq!(
            summary.most_common,
            vec![("Apple Inc.".to_string(), 3), ("Steve Jobs".to_string(), 3)]
        );
        assert_eq!(summary.mean_sentiment, Some(0.5));
        assert_eq!(summary.mean_subjectivity, Some(0.8));
        assert_eq!(summary.truncated, 0);
        assert_eq!(
            summary.failures,
            vec![("text-000004".to_string(), "ValidationError: empty input".to_string())]
        );

        let report = summary.report();
        assert!(report.contains("Items: 4 | Succeeded: 3 | Failed: 1"));
        assert!(report.contains("Apple Inc. (3)"));
        assert!(report.contains("text-000004: ValidationError: empty input"));
        assert!(report.contains("Mean subjectivity: 0.800"));
        assert!(!report.contains("Truncated"));
    }

    #[test]
    fn test_most_common_ranks_texts_not_labels() {
        let mut aggregator = Aggregator::new();
        let text = "Acme and Globex and Acme";
        let extracted = vec![
            ExtractedEntity::from_span(text, 0, 4, "ORG", 0.9),
            ExtractedEntity::from_span(text, 9, 15, "ORG", 0.9),
            ExtractedEntity::from_span(text, 20, 24, "ORG", 0.9),
        ];
        aggregator.add(0, raw("a", text), extracted, EnrichmentResult::default());

        let summary = aggregator.finish().summary();
        assert_eq!(
            summary.most_common,
            vec![("Acme".to_string(), 2), ("Globex".to_string(), 1)]
        );
        assert_eq!(summary.label_counts.get("ORG"), Some(&3));
    }

    #[test]
    fn test_truncated_items_reach_the_report() {
        let mut aggregator = Aggregator::new();
        aggregator.add(0, raw("a", "Nothing here."), vec![], EnrichmentResult::default());
        aggregator.record_truncated(3);

        let result = aggregator.finish();
        assert_eq!(result.stats.truncated, 3);
        assert_eq!(result.stats.total, 1);

        let summary = result.summary();
        assert_eq!(summary.truncated, 3);
        assert!(summary
            .report()
            .contains("Truncated: 3 items dropped by batch limits"));
    }
}
