//! NERA Extractor - Entity extraction port
//!
//! Defines the [`EntityExtractor`] port and ships reference backends:
//! - Rule-based: regex patterns + gazetteer matching
//! - Heuristic: capitalisation and context cues
//! - Ensemble: merges several backends into one result

use nera_core::{Entity, Result};

/// Extracted entity from text
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedEntity {
    pub text: String,
    pub label: String,
    pub start: usize,
    pub end: usize,
    pub confidence: f32,
}

impl ExtractedEntity {
    /// Build from a byte range of `text`
    pub fn from_span(
        text: &str,
        start: usize,
        end: usize,
        label: impl Into<String>,
        confidence: f32,
    ) -> Self {
        Self {
            text: text[start..end].to_string(),
            label: label.into(),
            start,
            end,
            confidence,
        }
    }

    /// Span length in bytes
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether two spans share at least one byte
    pub fn overlaps(&self, other: &ExtractedEntity) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl From<ExtractedEntity> for Entity {
    fn from(e: ExtractedEntity) -> Self {
        Entity::new(e.text, e.label, e.start, e.end, e.confidence)
    }
}

/// Trait for entity extractors
///
/// Implementations are black boxes; they may wrap a statistical model, a
/// remote service or a set of rules. A failure is reported as
/// [`nera_core::NeraError::Extraction`] and only affects the current document.
pub trait EntityExtractor: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &str;

    fn extract(&self, text: &str) -> Result<Vec<ExtractedEntity>>;
}

pub mod ensemble;
pub mod heuristic;
pub mod ner;

pub use ensemble::EnsembleExtractor;
pub use heuristic::HeuristicNer;
pub use ner::RuleBasedNer;
