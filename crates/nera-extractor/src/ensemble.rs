//! Ensemble extraction
//!
//! Runs several [`EntityExtractor`] backends over the same text and merges
//! their output. Overlapping spans with the same label collapse to the most
//! confident one; spans with different labels are all kept. A backend that
//! fails is logged and skipped, the ensemble only fails when every backend
//! does.

use tracing::{debug, warn};

use crate::{EntityExtractor, ExtractedEntity};
use nera_core::{NeraError, Result};

/// Combines several extraction backends into one
pub struct EnsembleExtractor {
    backends: Vec<Box<dyn EntityExtractor>>,
    min_confidence: f32,
}

impl EnsembleExtractor {
    pub fn new(backends: Vec<Box<dyn EntityExtractor>>) -> Self {
        Self {
            backends,
            min_confidence: 0.0,
        }
    }

    /// Drop merged entities below this confidence
    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence.clamp(0.0, 1.0);
        self
    }

    /// Add another backend
    pub fn with_backend(mut self, backend: Box<dyn EntityExtractor>) -> Self {
        self.backends.push(backend);
        self
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Merge candidate lists from all backends
    ///
    /// Candidates are visited most confident first (longer spans break ties),
    /// so the survivor of every same-label overlap is the best one. The output
    /// is ordered by `(start, end, label)`.
    pub fn merge(candidates: Vec<ExtractedEntity>, min_confidence: f32) -> Vec<ExtractedEntity> {
        let mut candidates: Vec<ExtractedEntity> = candidates
            .into_iter()
            .filter(|e| !e.is_empty() && e.confidence >= min_confidence)
            .collect();

        candidates.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| b.len().cmp(&a.len()))
                .then_with(|| a.start.cmp(&b.start))
        });

        let mut kept: Vec<ExtractedEntity> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let duplicate = kept
                .iter()
                .any(|k| k.label == candidate.label && k.overlaps(&candidate));
            if !duplicate {
                kept.push(candidate);
            }
        }

        kept.sort_by(|a, b| {
            a.start
                .cmp(&b.start)
                .then_with(|| a.end.cmp(&b.end))
                .then_with(|| a.label.cmp(&b.label))
        });
        kept
    }
}

impl EntityExtractor for EnsembleExtractor {
    fn name(&self) -> &str {
        "ensemble"
    }

    fn extract(&self, text: &str) -> Result<Vec<ExtractedEntity>> {
        if self.backends.is_empty() {
            return Err(NeraError::Extraction(
                "no extraction backends configured".to_string(),
            ));
        }

        let mut candidates = Vec::new();
        let mut failures = Vec::new();

        for backend in &self.backends {
            match backend.extract(text) {
                Ok(entities) => {
                    debug!("{} produced {} candidates", backend.name(), entities.len());
                    candidates.extend(entities);
                }
                Err(e) => {
                    warn!("Extractor {} failed: {}", backend.name(), e);
                    failures.push(format!("{}: {}", backend.name(), e));
                }
            }
        }

        if failures.len() == self.backends.len() {
            return Err(NeraError::Extraction(format!(
                "all backends failed ({})",
                failures.join("; ")
            )));
        }

        Ok(Self::merge(candidates, self.min_confidence))
    }
}
