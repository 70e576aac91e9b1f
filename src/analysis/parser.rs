//! Sentence parsing: raw query text to core and excluded terms.
//!
//! # Examples
//!
//! ```
//! use retina::analysis::parser::{NegationAwareParser, SentenceParser};
//!
//! let parser = NegationAwareParser::default();
//! let parsed = parser.parse("A car behind tree without wheel");
//!
//! assert_eq!(
//!     parsed.core_terms.iter().map(String::as_str).collect::<Vec<_>>(),
//!     vec!["behind", "car", "tree"]
//! );
//! assert!(parsed.excluded_terms.contains("wheel"));
//! ```

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::analysis::stemmer::{LightStemmer, Stemmer};
use crate::analysis::stop::StopWords;
use crate::error::{Result, RetinaError};

/// Words that negate the word following them.
const NEGATION_WORDS: &[&str] = &[
    "without",
    "no",
    "not",
    "never",
    "none",
    "nobody",
    "nothing",
    "neither",
    "nor",
    "nowhere",
    "hardly",
    "barely",
    "scarcely",
    "except",
    "excluding",
    "but",
    "minus",
    "avoid",
    "lack",
    "absent",
    "denied",
    "prohibited",
    "devoid",
    "omit",
    "forbid",
];

/// Characters that are neither word characters nor whitespace.
const STRIP_PATTERN: &str = r"[^\w\s]";

/// Terms extracted from one query sentence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedQuery {
    /// Stemmed words the user asked for.
    pub core_terms: BTreeSet<String>,
    /// Stemmed words the user negated.
    pub excluded_terms: BTreeSet<String>,
}

impl ParsedQuery {
    /// True when the sentence yielded no core terms.
    pub fn is_empty(&self) -> bool {
        self.core_terms.is_empty()
    }
}

/// Converts raw query text into terms.
pub trait SentenceParser: Send + Sync + std::fmt::Debug {
    /// Parse `raw` into core and excluded terms.
    fn parse(&self, raw: &str) -> ParsedQuery;
}

/// Default parser: lowercase, strip punctuation, split on Unicode word
/// boundaries, drop stop words, treat the word after a negation as excluded,
/// stem the rest.
#[derive(Debug, Clone)]
pub struct NegationAwareParser {
    stop_words: StopWords,
    negations: HashSet<String>,
    stemmer: Arc<dyn Stemmer>,
    strip: Regex,
}

impl NegationAwareParser {
    /// Create a parser with the given stop words and stemmer.
    pub fn new(stop_words: StopWords, stemmer: Arc<dyn Stemmer>) -> Result<Self> {
        let strip = Regex::new(STRIP_PATTERN)
            .map_err(|e| RetinaError::analysis(format!("Invalid regex pattern: {e}")))?;

        Ok(NegationAwareParser {
            stop_words,
            negations: NEGATION_WORDS.iter().map(|&w| w.to_string()).collect(),
            stemmer,
            strip,
        })
    }

    /// Name of the stemmer in use.
    pub fn stemmer_name(&self) -> &'static str {
        self.stemmer.name()
    }
}

impl Default for NegationAwareParser {
    fn default() -> Self {
        Self::new(StopWords::english(), Arc::new(LightStemmer::new()))
            .expect("Default strip pattern should be valid")
    }
}

impl SentenceParser for NegationAwareParser {
    fn parse(&self, raw: &str) -> ParsedQuery {
        let lowered = raw.to_lowercase();
        let cleaned = self.strip.replace_all(&lowered, "");
        let words: Vec<&str> = cleaned.unicode_words().collect();

        let mut parsed = ParsedQuery::default();
        let mut negated: HashSet<&str> = HashSet::new();

        for (i, word) in words.iter().enumerate() {
            if self.negations.contains(*word) {
                if let Some(next) = words.get(i + 1) {
                    if !self.stop_words.contains(next) {
                        parsed.excluded_terms.insert(self.stemmer.stem(next));
                        negated.insert(*next);
                    }
                }
            } else if !self.stop_words.contains(word) && !negated.contains(word) {
                parsed.core_terms.insert(self.stemmer.stem(word));
            }
        }

        parsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::stemmer::IdentityStemmer;

    fn terms(set: &BTreeSet<String>) -> Vec<&str> {
        set.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_negation_excludes_next_word() {
        let parser = NegationAwareParser::default();
        let parsed = parser.parse("A car behind tree without wheel");

        assert_eq!(terms(&parsed.core_terms), vec!["behind", "car", "tree"]);
        assert_eq!(terms(&parsed.excluded_terms), vec!["wheel"]);
    }

    #[test]
    fn test_punctuation_and_case() {
        let parser = NegationAwareParser::default();
        let parsed = parser.parse("Red CARS, parked!");

        assert_eq!(terms(&parsed.core_terms), vec!["car", "park", "red"]);
        assert!(parsed.excluded_terms.is_empty());
    }

    #[test]
    fn test_negation_before_stop_word_excludes_nothing() {
        let parser = NegationAwareParser::default();
        let parsed = parser.parse("dog but the cat");

        assert!(parsed.excluded_terms.is_empty());
        assert_eq!(terms(&parsed.core_terms), vec!["cat", "dog"]);
    }

    #[test]
    fn test_negated_word_is_never_core() {
        let parser = NegationAwareParser::default();
        let parsed = parser.parse("beach no people, people");

        assert_eq!(terms(&parsed.core_terms), vec!["beach"]);
        assert_eq!(terms(&parsed.excluded_terms), vec!["people"]);
    }

    #[test]
    fn test_empty_and_stop_only_sentences() {
        let parser = NegationAwareParser::default();
        assert!(parser.parse("").is_empty());
        assert!(parser.parse("the of and").is_empty());
        assert!(parser.parse("?!").is_empty());
    }

    #[test]
    fn test_custom_stemmer() {
        let parser =
            NegationAwareParser::new(StopWords::english(), Arc::new(IdentityStemmer)).unwrap();
        let parsed = parser.parse("running dogs");

        assert_eq!(terms(&parsed.core_terms), vec!["dogs", "running"]);
        assert_eq!(parser.stemmer_name(), "identity");
    }
}
