//! Rule-based Named Entity Recognition
//!
//! Regex patterns for numeric and temporal expressions plus a gazetteer
//! of well-known names. Overlapping matches inside this backend are
//! resolved in favour of the longest span, then the highest confidence.

use regex::Regex;

use crate::{EntityExtractor, ExtractedEntity};
use nera_core::{EntityLabel, Result};

// ============================================================================
// Gazetteer
// ============================================================================

/// Dictionary entry for entity matching
#[derive(Debug, Clone)]
pub struct DictionaryEntry {
    pub term: String,
    pub label: EntityLabel,
    pub aliases: Vec<String>,
}

/// Compiled matchers for one dictionary entry
struct DictionaryMatcher {
    entry: DictionaryEntry,
    term: Regex,
    aliases: Option<Regex>,
}

const GIVEN_NAMES: &[&str] = &[
    "Steve", "Tim", "Elon", "Bill", "Jeff", "Mark", "Larry", "Sergey", "Satya", "Sundar",
    "Warren", "Barack", "Joe", "Donald", "Angela", "Emmanuel", "John", "Jane", "Mary",
    "James", "Robert", "Michael", "William", "David", "Richard", "Thomas", "Elizabeth",
    "Jennifer", "Linda", "Susan", "Sarah", "Karen", "Nancy", "Lisa", "Anna", "Maria",
];

const MONTHS: &str = "January|February|March|April|May|June|July|August|September|October|November|December";

/// Rule-based NER using regex patterns and a gazetteer
pub struct RuleBasedNer {
    /// Pattern rules (regex -> label, confidence)
    patterns: Vec<(Regex, EntityLabel, f32)>,
    /// Dictionary of known terms
    dictionary: Vec<DictionaryMatcher>,
}

impl RuleBasedNer {
    /// Create a new rule-based NER with the default English rules
    pub fn new() -> Self {
        let mut ner = Self::empty();
        ner.init_patterns();
        ner.init_dictionary();
        ner
    }

    /// Create a NER without any rules
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
            dictionary: Vec::new(),
        }
    }

    fn init_patterns(&mut self) {
        // Organisations by legal/institutional suffix
        self.add_pattern(
            r"\b[A-Z][A-Za-z0-9&'-]*(?:\s+[A-Z][A-Za-z0-9&'-]*){0,3}\s+(?:Inc\.|Corp\.|Ltd\.|Co\.|LLC|Corporation|Company|Group|Foundation|University|Institute|Agency)",
            EntityLabel::Org,
            0.9,
        );

        // People with an honorific or a common given name
        self.add_pattern(
            r"\b(?:Mr|Mrs|Ms|Dr|Prof)\.?\s+[A-Z][a-z]+(?:\s+[A-Z][a-z]+)?",
            EntityLabel::Person,
            0.9,
        );
        let given = GIVEN_NAMES.join("|");
        self.add_pattern(
            &format!(r"\b(?:{given})\s+[A-Z][a-z]+(?:-[A-Z][a-z]+)?\b"),
            EntityLabel::Person,
            0.85,
        );

        // Dates
        self.add_pattern(r"\b\d{4}-\d{1,2}-\d{1,2}\b", EntityLabel::Date, 0.95);
        self.add_pattern(r"\b\d{1,2}/\d{1,2}/\d{4}\b", EntityLabel::Date, 0.95);
        self.add_pattern(
            &format!(r"\b(?:{MONTHS})\s+\d{{1,2}}(?:,\s*\d{{4}})?\b"),
            EntityLabel::Date,
            0.9,
        );
        self.add_pattern(
            &format!(r"\b(?:{MONTHS})\s+\d{{4}}\b"),
            EntityLabel::Date,
            0.9,
        );
        self.add_pattern(r"\b(?:1[89]|20)\d{2}\b", EntityLabel::Date, 0.7);

        // Times
        self.add_pattern(
            r"(?i)\b\d{1,2}:\d{2}(?:\s?[ap]\.?m\.?)?",
            EntityLabel::Time,
            0.85,
        );

        // Money and percentages
        self.add_pattern(
            r"\$\s?\d[\d,]*(?:\.\d+)?(?:\s?(?:million|billion|trillion))?",
            EntityLabel::Money,
            0.9,
        );
        self.add_pattern(
            r"\b\d[\d,]*(?:\.\d+)?\s?(?:dollars|euros|pounds)\b",
            EntityLabel::Money,
            0.85,
        );
        self.add_pattern(r"\b\d+(?:\.\d+)?\s?(?:%|percent\b)", EntityLabel::Percent, 0.9);

        // Ordinals
        self.add_pattern(
            r"(?i)\b(?:first|second|third|fourth|fifth|sixth|seventh|eighth|ninth|tenth|\d+(?:st|nd|rd|th))\b",
            EntityLabel::Ordinal,
            0.8,
        );
    }

    fn init_dictionary(&mut self) {
        // Organisations
        self.add_term("Apple", EntityLabel::Org, vec![]);
        self.add_term("Google", EntityLabel::Org, vec!["Alphabet"]);
        self.add_term("Microsoft", EntityLabel::Org, vec![]);
        self.add_term("Amazon", EntityLabel::Org, vec![]);
        self.add_term("Samsung", EntityLabel::Org, vec![]);
        self.add_term("Tesla", EntityLabel::Org, vec![]);
        self.add_term("IBM", EntityLabel::Org, vec![]);
        self.add_term("NASA", EntityLabel::Org, vec![]);
        self.add_term("United Nations", EntityLabel::Org, vec!["UN"]);
        self.add_term("European Union", EntityLabel::Org, vec!["EU"]);

        // People
        self.add_term("Steve Jobs", EntityLabel::Person, vec![]);
        self.add_term("Tim Cook", EntityLabel::Person, vec![]);
        self.add_term("Elon Musk", EntityLabel::Person, vec![]);
        self.add_term("Bill Gates", EntityLabel::Person, vec![]);

        // Places
        self.add_term(
            "United States",
            EntityLabel::Gpe,
            vec!["USA", "U.S.", "United States of America"],
        );
        self.add_term("United Kingdom", EntityLabel::Gpe, vec!["UK", "Britain"]);
        self.add_term("France", EntityLabel::Gpe, vec![]);
        self.add_term("Germany", EntityLabel::Gpe, vec![]);
        self.add_term("China", EntityLabel::Gpe, vec![]);
        self.add_term("Japan", EntityLabel::Gpe, vec![]);
        self.add_term("California", EntityLabel::Gpe, vec![]);
        self.add_term("Cupertino", EntityLabel::Gpe, vec![]);
        self.add_term("New York", EntityLabel::Gpe, vec!["NYC"]);
        self.add_term("London", EntityLabel::Gpe, vec![]);
        self.add_term("Paris", EntityLabel::Gpe, vec![]);
        self.add_term("Berlin", EntityLabel::Gpe, vec![]);
        self.add_term("Tokyo", EntityLabel::Gpe, vec![]);
        self.add_term("Pacific Ocean", EntityLabel::Loc, vec!["the Pacific"]);
        self.add_term("Alps", EntityLabel::Loc, vec![]);

        // Groups
        self.add_term("American", EntityLabel::Norp, vec!["Americans"]);
        self.add_term("French", EntityLabel::Norp, vec![]);
        self.add_term("German", EntityLabel::Norp, vec!["Germans"]);
        self.add_term("Chinese", EntityLabel::Norp, vec![]);

        // Events and products
        self.add_term("World War II", EntityLabel::Event, vec!["WWII", "Second World War"]);
        self.add_term("Olympics", EntityLabel::Event, vec!["Olympic Games"]);
        self.add_term("iPhone", EntityLabel::Product, vec![]);
        self.add_term("Windows", EntityLabel::Product, vec![]);
    }

    /// Add a regex pattern; invalid patterns are ignored
    pub fn add_pattern(&mut self, pattern: &str, label: EntityLabel, confidence: f32) {
        if let Ok(regex) = Regex::new(pattern) {
            self.patterns.push((regex, label, confidence));
        }
    }

    /// Add a dictionary term with aliases (case-sensitive, whole words)
    pub fn add_term(&mut self, term: &str, label: EntityLabel, aliases: Vec<&str>) {
        let entry = DictionaryEntry {
            term: term.to_string(),
            label,
            aliases: aliases.iter().map(|s| s.to_string()).collect(),
        };

        let Some(term_regex) = word_regex(std::slice::from_ref(&entry.term)) else {
            return;
        };
        let alias_regex = if entry.aliases.is_empty() {
            None
        } else {
            word_regex(&entry.aliases)
        };

        self.dictionary.push(DictionaryMatcher {
            entry,
            term: term_regex,
            aliases: alias_regex,
        });
    }

    /// Known dictionary entries
    pub fn dictionary(&self) -> impl Iterator<Item = &DictionaryEntry> {
        self.dictionary.iter().map(|m| &m.entry)
    }

    /// Extract entities using pattern matching
    fn extract_by_patterns(&self, text: &str) -> Vec<ExtractedEntity> {
        let mut entities = Vec::new();

        for (regex, label, confidence) in &self.patterns {
            for mat in regex.find_iter(text) {
                let (start, end) = trim_span(text, mat.start(), mat.end());
                if start < end {
                    entities.push(ExtractedEntity::from_span(
                        text,
                        start,
                        end,
                        label.as_str(),
                        *confidence,
                    ));
                }
            }
        }

        entities
    }

    /// Extract entities using dictionary lookup
    fn extract_by_dictionary(&self, text: &str) -> Vec<ExtractedEntity> {
        let mut entities = Vec::new();

        for matcher in &self.dictionary {
            let label = matcher.entry.label.as_str();

            for mat in matcher.term.find_iter(text) {
                entities.push(ExtractedEntity::from_span(
                    text,
                    mat.start(),
                    mat.end(),
                    label,
                    0.95,
                ));
            }

            if let Some(aliases) = &matcher.aliases {
                for mat in aliases.find_iter(text) {
                    entities.push(ExtractedEntity::from_span(
                        text,
                        mat.start(),
                        mat.end(),
                        label,
                        0.9,
                    ));
                }
            }
        }

        entities
    }
}

impl Default for RuleBasedNer {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityExtractor for RuleBasedNer {
    fn name(&self) -> &str {
        "rule_based"
    }

    fn extract(&self, text: &str) -> Result<Vec<ExtractedEntity>> {
        let mut entities = self.extract_by_patterns(text);
        entities.extend(self.extract_by_dictionary(text));
        Ok(resolve_overlaps(entities))
    }
}

/// Build a whole-word alternation regex for literal terms
///
/// `\b` only applies next to word characters, so terms ending in
/// punctuation ("U.S.") get a lookahead-free boundary on that side.
fn word_regex(terms: &[String]) -> Option<Regex> {
    let alternatives: Vec<String> = terms
        .iter()
        .map(|t| {
            let escaped = regex::escape(t);
            let lead = if t.starts_with(|c: char| c.is_alphanumeric()) {
                r"\b"
            } else {
                ""
            };
            let trail = if t.ends_with(|c: char| c.is_alphanumeric()) {
                r"\b"
            } else {
                ""
            };
            format!("{lead}{escaped}{trail}")
        })
        .collect();

    Regex::new(&format!("(?:{})", alternatives.join("|"))).ok()
}

/// Drop leading/trailing whitespace from a match
fn trim_span(text: &str, start: usize, end: usize) -> (usize, usize) {
    let slice = &text[start..end];
    let leading = slice.len() - slice.trim_start().len();
    let trailing = slice.len() - slice.trim_end().len();
    if leading + trailing >= slice.len() {
        return (start, start);
    }
    (start + leading, end - trailing)
}

/// Keep non-overlapping spans, preferring the longest, then the most
/// confident, then the earliest. The result is ordered by start offset.
pub fn resolve_overlaps(mut entities: Vec<ExtractedEntity>) -> Vec<ExtractedEntity> {
    entities.sort_by(|a, b| {
        b.len()
            .cmp(&a.len())
            .then(b.confidence.total_cmp(&a.confidence))
            .then(a.start.cmp(&b.start))
    });

    let mut selected: Vec<ExtractedEntity> = Vec::with_capacity(entities.len());
    for entity in entities {
        if !selected.iter().any(|s| s.overlaps(&entity)) {
            selected.push(entity);
        }
    }

    selected.sort_by_key(|e| (e.start, e.end));
    selected
}

// ============================================================================
// Tests
// ============================================================================
