//! NERA Core - Domain models, errors, and shared configuration
//!
//! This crate defines the records passed between the pipeline stages:
//! - Documents and the entities extracted from them
//! - The well-known entity label vocabulary
//! - Per-document failure records
//! - Common error types
//! - Configuration management

pub mod config;

pub use config::{
    AppConfig, ConfigError, EnrichmentConfig, ExportConfig, LoggingConfig, PipelineConfig,
    ServerConfig,
};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for NERA operations
#[derive(Error, Debug)]
pub enum NeraError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Enrichment timed out: {capability} after {timeout_ms}ms")]
    EnrichmentTimeout { capability: String, timeout_ms: u64 },

    #[error("Enrichment error: {0}")]
    Enrichment(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl NeraError {
    /// Shorthand for the empty-input validation failure
    pub fn empty_input() -> Self {
        Self::Validation("empty input".to_string())
    }

    /// The failure category this error is recorded under when it
    /// happens to a single document of a batch
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Validation(_) => FailureKind::Validation,
            Self::Io { .. } => FailureKind::Io,
            _ => FailureKind::Extraction,
        }
    }
}

pub type Result<T> = std::result::Result<T, NeraError>;

// ============================================================================
// Entity Labels
// ============================================================================

/// Well-known entity labels
///
/// Labels on [`Entity`] stay open strings so that backends can emit
/// anything; this enum names the vocabulary the bundled backends use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityLabel {
    Person,
    Norp,
    Fac,
    Org,
    Gpe,
    Loc,
    Product,
    Event,
    Date,
    Time,
    Percent,
    Money,
    Quantity,
    Ordinal,
    Cardinal,
}

impl EntityLabel {
    pub const ALL: [EntityLabel; 15] = [
        Self::Person,
        Self::Norp,
        Self::Fac,
        Self::Org,
        Self::Gpe,
        Self::Loc,
        Self::Product,
        Self::Event,
        Self::Date,
        Self::Time,
        Self::Percent,
        Self::Money,
        Self::Quantity,
        Self::Ordinal,
        Self::Cardinal,
    ];

    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "PERSON",
            Self::Norp => "NORP",
            Self::Fac => "FAC",
            Self::Org => "ORG",
            Self::Gpe => "GPE",
            Self::Loc => "LOC",
            Self::Product => "PRODUCT",
            Self::Event => "EVENT",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::Percent => "PERCENT",
            Self::Money => "MONEY",
            Self::Quantity => "QUANTITY",
            Self::Ordinal => "ORDINAL",
            Self::Cardinal => "CARDINAL",
        }
    }

    /// Human-readable explanation of the label
    pub fn description(&self) -> &'static str {
        match self {
            Self::Person => "People, including fictional",
            Self::Norp => "Nationalities or religious or political groups",
            Self::Fac => "Buildings, airports, highways, bridges, etc.",
            Self::Org => "Companies, agencies, institutions, etc.",
            Self::Gpe => "Countries, cities, states",
            Self::Loc => "Non-GPE locations, mountain ranges, bodies of water",
            Self::Product => "Objects, vehicles, foods, etc. (not services)",
            Self::Event => "Named hurricanes, battles, wars, sports events, etc.",
            Self::Date => "Absolute or relative dates or periods",
            Self::Time => "Times smaller than a day",
            Self::Percent => "Percentage, including \"%\"",
            Self::Money => "Monetary values, including unit",
            Self::Quantity => "Measurements, as of weight or distance",
            Self::Ordinal => "\"first\", \"second\", etc.",
            Self::Cardinal => "Numerals that do not fall under another type",
        }
    }

    /// Parse a label name (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|l| l.as_str() == upper)
    }

    /// Whether entities with this label are worth a knowledge-graph lookup
    pub fn is_linkable(&self) -> bool {
        matches!(
            self,
            Self::Person | Self::Org | Self::Gpe | Self::Loc | Self::Event
        )
    }
}

impl std::fmt::Display for EntityLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Describe an open label string, falling back to "Unknown"
pub fn describe_label(label: &str) -> &'static str {
    EntityLabel::parse(label)
        .map(|l| l.description())
        .unwrap_or("Unknown")
}

// ============================================================================
// Document Models
// ============================================================================

/// A labeled span of a document's text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Surface text of the span
    pub text: String,

    /// Label (open vocabulary, see [`EntityLabel`])
    pub label: String,

    /// Start byte offset into the owning document's text
    pub start: usize,

    /// End byte offset (exclusive)
    pub end: usize,

    /// Confidence score (0.0 - 1.0)
    pub confidence: f32,

    /// External knowledge-graph identifier, when linking succeeded
    pub linked_id: Option<String>,

    /// Description the knowledge graph publishes for the linked item
    #[serde(default)]
    pub linked_description: Option<String>,
}

impl Entity {
    /// Create a new entity without a link
    pub fn new(
        text: impl Into<String>,
        label: impl Into<String>,
        start: usize,
        end: usize,
        confidence: f32,
    ) -> Self {
        Self {
            text: text.into(),
            label: label.into(),
            start,
            end,
            confidence: confidence.clamp(0.0, 1.0),
            linked_id: None,
            linked_description: None,
        }
    }

    /// Set the linked identifier
    pub fn with_link(mut self, id: impl Into<String>) -> Self {
        self.linked_id = Some(id.into());
        self
    }

    /// Check `0 <= start < end <= len(text)` and that both offsets
    /// land on char boundaries of `text`
    pub fn has_valid_span(&self, text: &str) -> bool {
        self.start < self.end
            && self.end <= text.len()
            && text.is_char_boundary(self.start)
            && text.is_char_boundary(self.end)
    }

    /// Human-readable description of the label ("Unknown" for open labels)
    pub fn description(&self) -> &'static str {
        describe_label(&self.label)
    }

    /// Known label, if the open label maps onto one
    pub fn known_label(&self) -> Option<EntityLabel> {
        EntityLabel::parse(&self.label)
    }

    /// Whether two entities cover at least one common byte
    pub fn overlaps(&self, other: &Entity) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Simple text statistics computed per document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextStats {
    pub character_count: usize,
    pub word_count: usize,
    pub sentence_count: usize,
    pub avg_word_length: f64,
    pub entity_count: usize,
    pub unique_entities: usize,
}

impl TextStats {
    /// Compute statistics for a text and its entities
    pub fn compute(text: &str, entities: &[Entity]) -> Self {
        let words: Vec<&str> = text
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| c.is_ascii_punctuation()))
            .filter(|w| !w.is_empty())
            .collect();

        let word_chars: usize = words.iter().map(|w| w.chars().count()).sum();
        let avg_word_length = word_chars as f64 / words.len().max(1) as f64;

        let sentence_count = text
            .split(['.', '!', '?', '。'])
            .filter(|s| s.chars().any(|c| c.is_alphanumeric()))
            .count();

        let unique: HashSet<&str> = entities.iter().map(|e| e.text.as_str()).collect();

        Self {
            character_count: text.chars().count(),
            word_count: words.len(),
            sentence_count,
            avg_word_length,
            entity_count: entities.len(),
            unique_entities: unique.len(),
        }
    }
}

/// A fully analysed document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Source identifier (path or generated id)
    pub source_id: String,

    /// Decoded text
    pub text: String,

    /// Detected language code; `None` when unknown or not computed
    pub language: Option<String>,

    /// Document polarity in [-1, 1]; `None` when unknown or not computed
    pub sentiment: Option<f64>,

    /// Document subjectivity in [0, 1]; `None` when unknown or not computed
    #[serde(default)]
    pub subjectivity: Option<f64>,

    /// Extracted entities, ordered by start offset
    pub entities: Vec<Entity>,

    /// Text statistics
    pub stats: TextStats,
}

impl Document {
    /// Mean entity confidence, if the document has entities
    pub fn mean_confidence(&self) -> Option<f64> {
        if self.entities.is_empty() {
            return None;
        }
        let sum: f64 = self.entities.iter().map(|e| e.confidence as f64).sum();
        Some(sum / self.entities.len() as f64)
    }
}

// ============================================================================
// Failure Records
// ============================================================================

/// Category of a per-document failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Empty or malformed input
    Validation,
    /// Extraction backend failed
    Extraction,
    /// Input could not be read
    Io,
    /// Batch was cancelled before or during processing
    Cancelled,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "ValidationError"),
            Self::Extraction => write!(f, "ExtractionError"),
            Self::Io => write!(f, "IoError"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Why a document did not make it through the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub kind: FailureKind,
    pub reason: String,
}

impl FailureRecord {
    pub fn new(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::new(FailureKind::Cancelled, reason)
    }
}

impl From<&NeraError> for FailureRecord {
    fn from(err: &NeraError) -> Self {
        let reason = match err {
            NeraError::Validation(msg) | NeraError::Extraction(msg) => msg.clone(),
            other => other.to_string(),
        };
        Self::new(err.failure_kind(), reason)
    }
}

impl std::fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.reason)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_round_trip_names() {
        for label in EntityLabel::ALL {
            assert_eq!(EntityLabel::parse(label.as_str()), Some(label));
        }
        assert_eq!(EntityLabel::parse("org"), Some(EntityLabel::Org));
        assert_eq!(EntityLabel::parse("WIDGET"), None);
    }

    #[test]
    fn test_describe_label() {
        assert_eq!(describe_label("PERSON"), "People, including fictional");
        assert_eq!(describe_label("CUSTOM_THING"), "Unknown");
    }

    #[test]
    fn test_entity_description_follows_label() {
        let org = Entity::new("Apple Inc.", "org", 0, 10, 0.9);
        assert_eq!(org.description(), "Companies, agencies, institutions, etc.");
        assert_eq!(Entity::new("x", "GADGET", 0, 1, 0.5).description(), "Unknown");
        assert_eq!(org.linked_description, None);
    }

    #[test]
    fn test_entity_span_validation() {
        let text = "Apple Inc. was founded by Steve Jobs.";
        let good = Entity::new("Apple Inc.", "ORG", 0, 10, 0.9);
        let empty = Entity::new("", "ORG", 3, 3, 0.9);
        let past_end = Entity::new("x", "ORG", 30, 60, 0.9);

        assert!(good.has_valid_span(text));
        assert!(!empty.has_valid_span(text));
        assert!(!past_end.has_valid_span(text));
    }

    #[test]
    fn test_entity_span_rejects_split_char() {
        let text = "Café Müller";
        // 'é' occupies bytes 3..5
        let split = Entity::new("Caf", "ORG", 0, 4, 0.5);
        assert!(!split.has_valid_span(text));
    }

    #[test]
    fn test_entity_confidence_is_clamped() {
        assert_eq!(Entity::new("a", "X", 0, 1, 1.7).confidence, 1.0);
        assert_eq!(Entity::new("a", "X", 0, 1, -0.2).confidence, 0.0);
    }

    #[test]
    fn test_entity_overlap() {
        let a = Entity::new("Apple Inc", "ORG", 0, 9, 0.9);
        let b = Entity::new("Inc.", "ORG", 6, 10, 0.9);
        let c = Entity::new("was", "X", 11, 14, 0.9);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_text_stats() {
        let text = "Tim Cook leads Apple. Apple sells phones!";
        let entities = vec![
            Entity::new("Tim Cook", "PERSON", 0, 8, 0.8),
            Entity::new("Apple", "ORG", 15, 20, 0.8),
            Entity::new("Apple", "ORG", 22, 27, 0.8),
        ];
        let stats = TextStats::compute(text, &entities);

        assert_eq!(stats.word_count, 7);
        assert_eq!(stats.sentence_count, 2);
        assert_eq!(stats.entity_count, 3);
        assert_eq!(stats.unique_entities, 2);
        assert!(stats.avg_word_length > 3.0);
    }

    #[test]
    fn test_failure_record_from_error() {
        let record = FailureRecord::from(&NeraError::empty_input());
        assert_eq!(record.kind, FailureKind::Validation);
        assert_eq!(record.to_string(), "ValidationError: empty input");
    }
}
