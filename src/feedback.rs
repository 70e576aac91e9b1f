//! Relevance feedback.
//!
//! A user marks one result image as relevant or not for the query that
//! produced it. The query is re-parsed into its core terms (no synonym
//! expansion) and every row of that image whose value is one of those terms
//! has its probability scaled: up by `positive_factor` and capped at 1, or
//! down by `negative_factor` and floored at 0. Rows of every feature type
//! sharing the value are updated together: positive feedback scales the
//! highest of their probabilities and negative feedback the lowest, so no row
//! moves against the judgement.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::analysis::SentenceParser;
use crate::config::FeedbackConfig;
use crate::error::{Result, RetinaError};
use crate::feature::base_filename;
use crate::store::FeatureStore;

/// Direction of a relevance judgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feedback {
    Positive,
    Negative,
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feedback::Positive => f.write_str("positive"),
            Feedback::Negative => f.write_str("negative"),
        }
    }
}

impl FromStr for Feedback {
    type Err = RetinaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "positive" | "+" | "up" => Ok(Feedback::Positive),
            "negative" | "-" | "down" => Ok(Feedback::Negative),
            other => Err(RetinaError::invalid_argument(format!(
                "unknown feedback '{other}', expected positive or negative"
            ))),
        }
    }
}

/// One probability change made by feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityChange {
    pub feature_value: String,
    pub old: f64,
    pub new: f64,
}

/// What one feedback call changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackOutcome {
    pub filename: String,
    pub feedback: Feedback,
    /// One entry per updated value; empty when nothing matched.
    pub changes: Vec<ProbabilityChange>,
}

impl FeedbackOutcome {
    /// True when no row matched.
    pub fn is_noop(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Applies relevance feedback to stored probabilities.
#[derive(Debug, Clone)]
pub struct FeedbackEngine {
    config: FeedbackConfig,
    parser: Arc<dyn SentenceParser>,
}

impl FeedbackEngine {
    pub fn new(config: FeedbackConfig, parser: Arc<dyn SentenceParser>) -> Result<Self> {
        config.validate()?;
        Ok(FeedbackEngine { config, parser })
    }

    /// Probability after one round of `feedback`.
    pub fn adjust(&self, probability: f64, feedback: Feedback) -> f64 {
        match feedback {
            Feedback::Positive => (probability * self.config.positive_factor).min(1.0),
            Feedback::Negative => (probability * self.config.negative_factor).max(0.0),
        }
    }

    /// Scale the probabilities of `filename`'s rows matching the core terms
    /// of `query`.
    pub fn apply_feedback(
        &self,
        store: &FeatureStore,
        filename: &str,
        query: &str,
        feedback: Feedback,
    ) -> Result<FeedbackOutcome> {
        let filename = base_filename(filename);
        let parsed = self.parser.parse(query);

        let mut outcome = FeedbackOutcome {
            filename: filename.clone(),
            feedback,
            changes: Vec::new(),
        };

        // One update per value: rows of several types share it.
        let rows = store.rows_for(&filename, &parsed.core_terms);
        let mut seen: BTreeMap<String, f64> = BTreeMap::new();
        for row in rows {
            seen.entry(row.feature_value)
                .and_modify(|p| {
                    *p = match feedback {
                        Feedback::Positive => p.max(row.probability),
                        Feedback::Negative => p.min(row.probability),
                    }
                })
                .or_insert(row.probability);
        }

        for (feature_value, old) in seen {
            let new = self.adjust(old, feedback);
            store.update_probability(&filename, &feature_value, new)?;
            debug!(filename = %filename, feature_value = %feature_value, old, new, "adjusted probability");
            outcome.changes.push(ProbabilityChange {
                feature_value,
                old,
                new,
            });
        }

        if outcome.is_noop() {
            info!(filename = %filename, query, %feedback, "feedback matched no features");
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::NegationAwareParser;
    use crate::feature::{FeatureRow, FeatureType};

    fn engine() -> FeedbackEngine {
        FeedbackEngine::new(
            FeedbackConfig::default(),
            Arc::new(NegationAwareParser::default()),
        )
        .unwrap()
    }

    fn store_with(rows: Vec<FeatureRow>) -> FeatureStore {
        let store = FeatureStore::in_memory().unwrap();
        store.insert_batch(rows).unwrap();
        store
    }

    fn probability(store: &FeatureStore, filename: &str, value: &str) -> f64 {
        store.rows_for(filename, [value])[0].probability
    }

    #[test]
    fn test_positive_feedback_scales_matching_row() {
        let store = store_with(vec![
            FeatureRow::new("img.jpg", FeatureType::ImageClassification, "car", 0.5),
            FeatureRow::new("img.jpg", FeatureType::ImageClassification, "road", 0.5),
        ]);

        let outcome = engine()
            .apply_feedback(&store, "img.jpg", "red car", Feedback::Positive)
            .unwrap();

        assert_eq!(outcome.changes.len(), 1);
        assert!((probability(&store, "img.jpg", "car") - 0.6).abs() < 1e-12);
        assert_eq!(probability(&store, "img.jpg", "road"), 0.5);
    }

    #[test]
    fn test_repeated_positive_feedback_converges_to_one() {
        let store = store_with(vec![FeatureRow::new(
            "img.jpg",
            FeatureType::ImageClassification,
            "car",
            0.5,
        )]);
        let engine = engine();

        let mut last = 0.5;
        for _ in 0..20 {
            engine
                .apply_feedback(&store, "img.jpg", "red car", Feedback::Positive)
                .unwrap();
            let current = probability(&store, "img.jpg", "car");
            assert!(current >= last);
            assert!(current <= 1.0);
            last = current;
        }
        assert_eq!(last, 1.0);
    }

    #[test]
    fn test_negative_feedback_decreases_and_floors() {
        let store = store_with(vec![FeatureRow::new(
            "img.jpg",
            FeatureType::Colors,
            "red",
            0.5,
        )]);
        let engine = engine();

        engine
            .apply_feedback(&store, "uploads/img.jpg", "red", Feedback::Negative)
            .unwrap();
        assert!((probability(&store, "img.jpg", "red") - 0.4).abs() < 1e-12);

        for _ in 0..50 {
            engine
                .apply_feedback(&store, "img.jpg", "red", Feedback::Negative)
                .unwrap();
        }
        let p = probability(&store, "img.jpg", "red");
        assert!((0.0..0.4).contains(&p));
    }

    #[test]
    fn test_feedback_spans_feature_types() {
        let store = store_with(vec![
            FeatureRow::new("img.jpg", FeatureType::Colors, "red", 0.5),
            FeatureRow::new("img.jpg", FeatureType::UserSentenceFeedback, "red", 0.5),
        ]);

        engine()
            .apply_feedback(&store, "img.jpg", "red", Feedback::Positive)
            .unwrap();

        assert!(
            store
                .rows_for("img.jpg", ["red"])
                .iter()
                .all(|row| (row.probability - 0.6).abs() < 1e-12)
        );
    }

    #[test]
    fn test_shared_value_never_moves_against_feedback() {
        let store = store_with(vec![
            FeatureRow::new("img.jpg", FeatureType::ImageClassification, "car", 0.5),
            FeatureRow::new("img.jpg", FeatureType::Colors, "car", 0.3),
        ]);
        let engine = engine();

        let before = store.rows_for("img.jpg", ["car"]);
        let outcome = engine
            .apply_feedback(&store, "img.jpg", "car", Feedback::Negative)
            .unwrap();
        assert_eq!(outcome.changes.len(), 1);
        assert_eq!(outcome.changes[0].old, 0.3);

        let after = store.rows_for("img.jpg", ["car"]);
        for old in &before {
            let new = after
                .iter()
                .find(|row| row.feature_type == old.feature_type)
                .unwrap();
            assert!(new.probability < old.probability);
            assert!((new.probability - 0.24).abs() < 1e-12);
        }

        let before = after;
        engine
            .apply_feedback(&store, "img.jpg", "car", Feedback::Positive)
            .unwrap();
        let after = store.rows_for("img.jpg", ["car"]);
        for old in &before {
            let new = after
                .iter()
                .find(|row| row.feature_type == old.feature_type)
                .unwrap();
            assert!(new.probability >= old.probability);
        }
    }

    #[test]
    fn test_no_match_is_noop() {
        let store = store_with(vec![FeatureRow::new(
            "img.jpg",
            FeatureType::Colors,
            "red",
            0.5,
        )]);

        let outcome = engine()
            .apply_feedback(&store, "img.jpg", "blue boat", Feedback::Positive)
            .unwrap();
        assert!(outcome.is_noop());

        let outcome = engine()
            .apply_feedback(&store, "other.jpg", "red", Feedback::Positive)
            .unwrap();
        assert!(outcome.is_noop());
        assert_eq!(probability(&store, "img.jpg", "red"), 0.5);
    }

    #[test]
    fn test_feedback_parsing() {
        assert_eq!("positive".parse::<Feedback>().unwrap(), Feedback::Positive);
        assert_eq!("Up".parse::<Feedback>().unwrap(), Feedback::Positive);
        assert_eq!("-".parse::<Feedback>().unwrap(), Feedback::Negative);
        assert_eq!(" negative ".parse::<Feedback>().unwrap(), Feedback::Negative);
        assert!("maybe".parse::<Feedback>().is_err());
        assert_eq!(Feedback::Negative.to_string(), "negative");
    }

    #[test]
    fn test_adjust_clamps() {
        let engine = engine();
        assert_eq!(engine.adjust(0.9, Feedback::Positive), 1.0);
        assert_eq!(engine.adjust(0.0, Feedback::Negative), 0.0);
    }
}
