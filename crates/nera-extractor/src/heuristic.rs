//! Heuristic NER from capitalisation and context cues
//!
//! A low-confidence second opinion for the ensemble: title-case runs are
//! labelled from the word that precedes them. Runs with no usable cue are
//! not emitted.

use regex::Regex;

use crate::{EntityExtractor, ExtractedEntity};
use nera_core::{EntityLabel, Result};

const LOCATION_CUES: &[&str] = &["in", "at", "from", "near", "to", "across"];
const PERSON_CUES: &[&str] = &[
    "by", "with", "CEO", "President", "founder", "Dr", "Mr", "Mrs", "Ms", "said",
];

/// Capitalisation-based tagger
pub struct HeuristicNer {
    run: Option<Regex>,
    location_confidence: f32,
    person_confidence: f32,
}

impl HeuristicNer {
    pub fn new() -> Self {
        Self {
            // One or more Title Case words separated by single spaces
            run: Regex::new(r"\b\p{Lu}\p{Ll}+(?: \p{Lu}\p{Ll}+)*\b").ok(),
            location_confidence: 0.55,
            person_confidence: 0.6,
        }
    }

    /// Word immediately before `start`, without trailing punctuation
    fn previous_word(text: &str, start: usize) -> Option<&str> {
        text[..start]
            .split_whitespace()
            .last()
            .map(|w| w.trim_end_matches(|c: char| c.is_ascii_punctuation()))
    }

    fn classify(&self, text: &str, start: usize, words: usize) -> Option<(EntityLabel, f32)> {
        let cue = Self::previous_word(text, start)?;

        if LOCATION_CUES.contains(&cue) {
            return Some((EntityLabel::Gpe, self.location_confidence));
        }
        if words >= 2 && PERSON_CUES.contains(&cue) {
            return Some((EntityLabel::Person, self.person_confidence));
        }
        None
    }
}

impl Default for HeuristicNer {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityExtractor for HeuristicNer {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn extract(&self, text: &str) -> Result<Vec<ExtractedEntity>> {
        let mut entities = Vec::new();
        let Some(run) = &self.run else {
            return Ok(entities);
        };

        for mat in run.find_iter(text) {
            let words = mat.as_str().split(' ').count();
            if let Some((label, confidence)) = self.classify(text, mat.start(), words) {
                entities.push(ExtractedEntity::from_span(
                    text,
                    mat.start(),
                    mat.end(),
                    label.as_str(),
                    confidence,
                ));
            }
        }

        Ok(entities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_cue() {
        let ner = HeuristicNer::new();
        let entities = ner.extract("She grew up in Springfield.").unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].text, "Springfield");
        assert_eq!(entities[0].label, "GPE");
    }

    #[test]
    fn test_person_cue_requires_two_words() {
        let ner = HeuristicNer::new();
        let entities = ner.extract("Founded by Steve Jobs, led by Cook.").unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].text, "Steve Jobs");
        assert_eq!(entities[0].label, "PERSON");
    }

    #[test]
    fn test_sentence_start_is_ignored() {
        let ner = HeuristicNer::new();
        assert!(ner.extract("Apple makes phones.").unwrap().is_empty());
    }
}
