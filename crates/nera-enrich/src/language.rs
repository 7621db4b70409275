//! Stopword-profile language detection
//!
//! Counts how many tokens of a text belong to each language's list of
//! function words and picks the best-scoring profile. Han script dominates
//! the decision for Chinese since it has no whitespace tokens.

use async_trait::async_trait;

use crate::LanguageDetector;
use nera_core::Result;

/// Function-word profile for one language
struct Profile {
    code: &'static str,
    stopwords: &'static [&'static str],
}

const PROFILES: &[Profile] = &[
    Profile {
        code: "en",
        stopwords: &[
            "the", "and", "is", "are", "was", "were", "of", "to", "that", "it", "with", "for",
            "on", "by", "this", "be", "have", "has", "from", "an", "not", "they", "which",
            "you", "he", "she", "we", "would", "their", "been",
        ],
    },
    Profile {
        code: "es",
        stopwords: &[
            "el", "los", "las", "que", "y", "un", "una", "es", "por", "con", "para", "del",
            "se", "su", "al", "lo", "como", "más", "pero", "sus", "está", "fue", "muy", "también",
        ],
    },
    Profile {
        code: "fr",
        stopwords: &[
            "le", "les", "des", "et", "est", "une", "du", "qui", "dans", "pour", "pas", "sur",
            "au", "avec", "ce", "il", "elle", "sont", "été", "nous", "vous", "mais", "cette",
        ],
    },
    Profile {
        code: "de",
        stopwords: &[
            "der", "die", "das", "und", "ist", "nicht", "ein", "eine", "zu", "den", "von", "mit",
            "sich", "des", "auf", "für", "im", "dem", "auch", "wurde", "sind", "ich", "wir",
            "oder",
        ],
    },
    Profile {
        code: "it",
        stopwords: &[
            "il", "di", "che", "è", "per", "non", "con", "della", "sono", "gli", "nel", "si",
            "da", "anche", "questo", "ha", "alla", "delle", "degli", "una",
        ],
    },
    Profile {
        code: "pt",
        stopwords: &[
            "o", "os", "as", "que", "do", "da", "em", "um", "uma", "para", "com", "não", "por",
            "mais", "dos", "das", "no", "na", "foi", "são", "é", "também",
        ],
    },
    Profile {
        code: "nl",
        stopwords: &[
            "de", "het", "een", "en", "van", "is", "dat", "op", "te", "niet", "zijn", "met",
            "voor", "die", "er", "ook", "aan", "wordt", "ik", "werd", "naar", "bij",
        ],
    },
];

/// Detector over the built-in stopword profiles
#[derive(Debug, Clone)]
pub struct StopwordDetector {
    /// Minimum number of stopword hits for a confident answer
    min_hits: usize,
}

impl StopwordDetector {
    pub fn new() -> Self {
        Self { min_hits: 1 }
    }

    pub fn with_min_hits(mut self, min_hits: usize) -> Self {
        self.min_hits = min_hits.max(1);
        self
    }

    /// Supported ISO 639-1 codes
    pub fn supported_languages() -> Vec<&'static str> {
        let mut codes: Vec<&'static str> = PROFILES.iter().map(|p| p.code).collect();
        codes.push("zh");
        codes
    }

    /// Synchronous detection; `None` when no profile wins outright
    pub fn detect(&self, text: &str) -> Option<String> {
        let letters = text.chars().filter(|c| c.is_alphabetic()).count();
        if letters == 0 {
            return None;
        }

        let han = text.chars().filter(|c| is_han(*c)).count();
        if han * 2 >= letters {
            return Some("zh".to_string());
        }

        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphabetic())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect();

        let mut best: Option<(&'static str, usize)> = None;
        let mut tied = false;

        for profile in PROFILES {
            let hits = tokens
                .iter()
                .filter(|t| profile.stopwords.contains(&t.as_str()))
                .count();

            match best {
                Some((_, top)) if hits == top => tied = true,
                Some((_, top)) if hits < top => {}
                _ => {
                    best = Some((profile.code, hits));
                    tied = false;
                }
            }
        }

        match best {
            Some((code, hits)) if !tied && hits >= self.min_hits => Some(code.to_string()),
            _ => None,
        }
    }
}

impl Default for StopwordDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LanguageDetector for StopwordDetector {
    async fn detect_language(&self, text: &str) -> Result<Option<String>> {
        Ok(self.detect(text))
    }
}

fn is_han(c: char) -> bool {
    matches!(c as u32, 0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0xF900..=0xFAFF)
}
