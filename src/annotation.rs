//! User sentence annotations.
//!
//! Users can describe an image in their own words. Sentences accumulate per
//! image; once an image has `sentence_threshold` of them, its keywords are
//! recomputed from all of its sentences and replace that image's
//! `User sentence feedback` rows, so the descriptions become searchable
//! features.
//!
//! Keywords are scored by single-document TF-IDF: with one document every
//! term has the same idf, so a term's score is its count divided by the L2
//! norm of all counts.

use std::collections::BTreeMap;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use unicode_segmentation::UnicodeSegmentation;

use crate::analysis::{LightStemmer, Stemmer, StopWords};
use crate::config::AnnotationConfig;
use crate::error::{Result, RetinaError};
use crate::feature::{Annotation, FeatureRow, FeatureType, base_filename};
use crate::store::FeatureStore;

/// A keyword and its TF-IDF score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub term: String,
    pub score: f64,
}

/// Result of recording one sentence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationOutcome {
    pub filename: String,
    /// Sentences recorded for the image, including this one.
    pub sentences: usize,
    /// True when the image's keyword rows were replaced.
    pub recomputed: bool,
    /// The new keywords; empty below the threshold.
    pub keywords: Vec<Keyword>,
}

/// Turns accumulated user sentences into `User sentence feedback` rows.
#[derive(Debug, Clone)]
pub struct AnnotationIndexer {
    config: AnnotationConfig,
    stop_words: StopWords,
    stemmer: Arc<dyn Stemmer>,
    strip: Regex,
}

impl AnnotationIndexer {
    pub fn new(
        config: AnnotationConfig,
        stop_words: StopWords,
        stemmer: Arc<dyn Stemmer>,
    ) -> Result<Self> {
        config.validate()?;
        let strip = Regex::new(r"[^\w\s]")
            .map_err(|e| RetinaError::analysis(format!("Invalid regex pattern: {e}")))?;

        Ok(AnnotationIndexer {
            config,
            stop_words,
            stemmer,
            strip,
        })
    }

    /// English stop words and the light stemmer.
    pub fn with_defaults(config: AnnotationConfig) -> Result<Self> {
        Self::new(config, StopWords::english(), Arc::new(LightStemmer::new()))
    }

    /// Record `sentence` for `filename` and recompute keywords once the
    /// threshold is reached.
    pub fn annotate(
        &self,
        store: &FeatureStore,
        filename: &str,
        sentence: &str,
    ) -> Result<AnnotationOutcome> {
        let filename = base_filename(filename);
        let sentence = sentence.trim();
        if filename.is_empty() {
            return Err(RetinaError::invalid_argument("empty filename"));
        }
        if sentence.is_empty() {
            return Err(RetinaError::invalid_argument("empty sentence"));
        }

        let sentences = store.record_annotation(Annotation::new(filename.as_str(), sentence))?;
        let mut outcome = AnnotationOutcome {
            filename: filename.clone(),
            sentences,
            recomputed: false,
            keywords: Vec::new(),
        };

        if sentences < self.config.sentence_threshold {
            debug!(
                filename = %filename,
                sentences,
                threshold = self.config.sentence_threshold,
                "recorded sentence"
            );
            return Ok(outcome);
        }

        let texts: Vec<String> = store
            .annotations_for(&filename)
            .into_iter()
            .map(|annotation| annotation.sentence)
            .collect();
        let keywords = self.keywords(&texts);

        let rows = keywords
            .iter()
            .map(|keyword| {
                FeatureRow::new(
                    filename.as_str(),
                    FeatureType::UserSentenceFeedback,
                    keyword.term.as_str(),
                    keyword.score,
                )
            })
            .collect();
        let removed = store.replace_features(&filename, FeatureType::UserSentenceFeedback, rows)?;

        info!(
            filename = %filename,
            sentences,
            keywords = keywords.len(),
            removed,
            "recomputed sentence keywords"
        );
        outcome.recomputed = true;
        outcome.keywords = keywords;
        Ok(outcome)
    }

    /// Top keywords of `sentences`, best first; ties by term ascending.
    pub fn keywords<S: AsRef<str>>(&self, sentences: &[S]) -> Vec<Keyword> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for sentence in sentences {
            for token in self.tokens(sentence.as_ref()) {
                *counts.entry(token).or_insert(0) += 1;
            }
        }

        let norm = counts
            .values()
            .map(|&count| (count * count) as f64)
            .sum::<f64>()
            .sqrt();
        if norm == 0.0 {
            return Vec::new();
        }

        let mut keywords: Vec<Keyword> = counts
            .into_iter()
            .map(|(term, count)| Keyword {
                term,
                score: count as f64 / norm,
            })
            .collect();
        keywords.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.term.cmp(&b.term))
        });
        keywords.truncate(self.config.max_keywords);
        keywords
    }

    fn tokens(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        let cleaned = self.strip.replace_all(&lowered, "");
        cleaned
            .unicode_words()
            .filter(|word| word.chars().count() >= self.config.min_token_len)
            .filter(|word| !self.stop_words.contains(word))
            .map(|word| self.stemmer.stem(word))
            .collect()
    }
}
