//! Lexicon-based sentiment scoring
//!
//! Each opinion word carries a polarity in [-1, 1]. An intensifier directly
//! before an opinion word scales it, a negator within the previous three
//! tokens flips it and halves its strength. The document score is the mean
//! polarity of the opinion words found; subjectivity is the mean strength
//! of the same words regardless of sign.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::SentimentScorer;
use nera_core::Result;

const POSITIVE: &[(&str, f64)] = &[
    ("good", 0.7),
    ("great", 0.8),
    ("excellent", 1.0),
    ("amazing", 0.9),
    ("wonderful", 1.0),
    ("fantastic", 0.9),
    ("best", 1.0),
    ("better", 0.5),
    ("love", 0.5),
    ("loved", 0.7),
    ("like", 0.3),
    ("happy", 0.8),
    ("pleased", 0.5),
    ("nice", 0.6),
    ("positive", 0.5),
    ("success", 0.6),
    ("successful", 0.75),
    ("innovative", 0.5),
    ("impressive", 0.8),
    ("beautiful", 0.85),
    ("strong", 0.4),
    ("growth", 0.3),
    ("win", 0.6),
    ("perfect", 1.0),
    ("favorite", 0.5),
    ("brilliant", 0.9),
];

const NEGATIVE: &[(&str, f64)] = &[
    ("bad", -0.7),
    ("terrible", -1.0),
    ("awful", -1.0),
    ("horrible", -1.0),
    ("worst", -1.0),
    ("worse", -0.4),
    ("poor", -0.4),
    ("hate", -0.8),
    ("hated", -0.9),
    ("sad", -0.5),
    ("angry", -0.5),
    ("negative", -0.3),
    ("failure", -0.6),
    ("failed", -0.5),
    ("disappointing", -0.6),
    ("disappointed", -0.75),
    ("weak", -0.4),
    ("loss", -0.4),
    ("decline", -0.3),
    ("crisis", -0.5),
    ("scandal", -0.6),
    ("problem", -0.3),
    ("wrong", -0.5),
    ("ugly", -0.7),
    ("boring", -1.0),
];

const INTENSIFIERS: &[(&str, f64)] = &[
    ("very", 1.3),
    ("really", 1.2),
    ("extremely", 1.5),
    ("so", 1.2),
    ("quite", 1.1),
    ("incredibly", 1.4),
    ("slightly", 0.5),
    ("somewhat", 0.7),
];

const NEGATORS: &[&str] = &["not", "no", "never", "nothing", "hardly", "neither", "nor"];

/// How many tokens back a negator still applies
const NEGATION_WINDOW: usize = 3;

/// Lexicon sentiment scorer
#[derive(Debug, Clone)]
pub struct LexiconSentiment {
    lexicon: HashMap<String, f64>,
    intensifiers: HashMap<String, f64>,
}

impl LexiconSentiment {
    /// Scorer with the built-in English lexicon
    pub fn new() -> Self {
        let lexicon = POSITIVE
            .iter()
            .chain(NEGATIVE)
            .map(|(w, p)| (w.to_string(), *p))
            .collect();
        let intensifiers = INTENSIFIERS
            .iter()
            .map(|(w, f)| (w.to_string(), *f))
            .collect();

        Self {
            lexicon,
            intensifiers,
        }
    }

    /// Add or override an opinion word
    pub fn with_word(mut self, word: &str, polarity: f64) -> Self {
        self.lexicon
            .insert(word.to_lowercase(), polarity.clamp(-1.0, 1.0));
        self
    }

    /// Score `text`; `None` when it contains no opinion words
    pub fn score(&self, text: &str) -> Option<f64> {
        let values = self.opinion_values(text);
        mean(values.iter().copied()).map(|m| m.clamp(-1.0, 1.0))
    }

    /// Subjectivity of `text` in [0, 1]; `None` when it contains no opinion words
    ///
    /// Each opinion word counts 0.5 plus half its absolute adjusted polarity,
    /// so strongly worded text reads as more subjective than mild text.
    pub fn subjectivity(&self, text: &str) -> Option<f64> {
        let values = self.opinion_values(text);
        mean(values.iter().map(|v| 0.5 + 0.5 * v.abs())).map(|m| m.min(1.0))
    }

    /// Adjusted polarity of every opinion word, in text order
    fn opinion_values(&self, text: &str) -> Vec<f64> {
        let tokens: Vec<String> = text
            .split(|c: char| !(c.is_alphanumeric() || c == '\''))
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect();

        let mut values = Vec::new();

        for (i, token) in tokens.iter().enumerate() {
            let Some(&polarity) = self.lexicon.get(token.as_str()) else {
                continue;
            };

            let mut value = polarity;
            if let Some(prev) = i.checked_sub(1).map(|p| tokens[p].as_str()) {
                if let Some(factor) = self.intensifiers.get(prev) {
                    value *= factor;
                }
            }

            let window = &tokens[i.saturating_sub(NEGATION_WINDOW)..i];
            if window.iter().any(|t| is_negator(t)) {
                value *= -0.5;
            }

            values.push(value.clamp(-1.0, 1.0));
        }

        values
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (total, count) = values.fold((0.0, 0usize), |(t, c), v| (t + v, c + 1));
    if count == 0 {
        None
    } else {
        Some(total / count as f64)
    }
}

impl Default for LexiconSentiment {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SentimentScorer for LexiconSentiment {
    async fn score_sentiment(&self, text: &str) -> Result<Option<f64>> {
        Ok(self.score(text))
    }

    async fn score_subjectivity(&self, text: &str) -> Result<Option<f64>> {
        Ok(self.subjectivity(text))
    }
}

fn is_negator(token: &str) -> bool {
    NEGATORS.contains(&token) || token.ends_with("n't")
}
