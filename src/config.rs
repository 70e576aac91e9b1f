//! Retina configuration types.
//!
//! [`RetinaConfig`] groups one section per component. Every section implements
//! `Default` with the values the ranking and feedback formulas are tuned for,
//! and deserializes with `#[serde(default)]`, so a JSON file only needs the
//! fields it overrides:
//!
//! ```
//! use retina::config::RetinaConfig;
//!
//! let config = RetinaConfig::from_json(r#"{ "ranking": { "core_weight": 5.0 } }"#).unwrap();
//! assert_eq!(config.ranking.core_weight, 5.0);
//! assert_eq!(config.ranking.other_weight, 0.75);
//! assert_eq!(config.expansion.synonym_limit, 10);
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, RetinaError};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetinaConfig {
    /// Term expansion settings.
    pub expansion: ExpansionConfig,
    /// Vector space model settings.
    pub ranking: RankingConfig,
    /// Ingest pipeline settings.
    pub aggregator: AggregatorConfig,
    /// Relevance feedback settings.
    pub feedback: FeedbackConfig,
    /// User sentence annotation settings.
    pub annotation: AnnotationConfig,
    /// Feature store persistence settings.
    pub store: StoreConfig,
}

impl RetinaConfig {
    /// Parse a configuration from JSON text and validate it.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: RetinaConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            RetinaError::config(format!(
                "Failed to read config file '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_json(&text)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.ranking.validate()?;
        self.feedback.validate()?;
        self.annotation.validate()?;
        self.store.validate()
    }
}

/// Term expansion settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionConfig {
    /// Maximum synonyms looked up per query word.
    pub synonym_limit: usize,
    /// Optional JSON file of synonym groups.
    pub dictionary_path: Option<PathBuf>,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            synonym_limit: 10,
            dictionary_path: None,
        }
    }
}

/// Vector space model weights and imputation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Weight of columns that are core query terms.
    pub core_weight: f64,
    /// Weight of every other column.
    pub other_weight: f64,
    /// The imputed value is the smallest positive probability divided by this.
    pub imputation_divisor: f64,
    /// Imputed value when no candidate row has a positive probability.
    pub fallback_imputation: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            core_weight: 3.5,
            other_weight: 0.75,
            imputation_divisor: 10.0,
            fallback_imputation: 0.0001,
        }
    }
}

impl RankingConfig {
    /// Reject weights and imputation settings that break the ranking formulas.
    pub fn validate(&self) -> Result<()> {
        if !(self.core_weight.is_finite() && self.core_weight > 0.0) {
            return Err(RetinaError::config("ranking.core_weight must be positive"));
        }
        if !(self.other_weight.is_finite() && self.other_weight > 0.0) {
            return Err(RetinaError::config("ranking.other_weight must be positive"));
        }
        if !(self.imputation_divisor.is_finite() && self.imputation_divisor > 1.0) {
            return Err(RetinaError::config(
                "ranking.imputation_divisor must be greater than 1",
            ));
        }
        if !(self.fallback_imputation > 0.0 && self.fallback_imputation < 1.0) {
            return Err(RetinaError::config(
                "ranking.fallback_imputation must lie in (0, 1)",
            ));
        }
        Ok(())
    }
}

/// Ingest pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Worker threads; `None` uses one per CPU.
    pub thread_pool_size: Option<usize>,
    /// Directory ingested filenames are resolved against.
    pub upload_dir: PathBuf,
    /// Add synonym rows for the strongest classification labels.
    pub enrich_labels: bool,
    /// Synonyms added per label word when enriching.
    pub enrichment_limit: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            thread_pool_size: None,
            upload_dir: PathBuf::from("storage"),
            enrich_labels: false,
            enrichment_limit: 10,
        }
    }
}

/// Relevance feedback factors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Multiplier applied on positive feedback.
    pub positive_factor: f64,
    /// Multiplier applied on negative feedback.
    pub negative_factor: f64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            positive_factor: 1.2,
            negative_factor: 0.8,
        }
    }
}

impl FeedbackConfig {
    /// Positive feedback must not shrink probabilities; negative must not grow them.
    pub fn validate(&self) -> Result<()> {
        if !(self.positive_factor.is_finite() && self.positive_factor >= 1.0) {
            return Err(RetinaError::config("feedback.positive_factor must be >= 1"));
        }
        if !(self.negative_factor >= 0.0 && self.negative_factor <= 1.0) {
            return Err(RetinaError::config(
                "feedback.negative_factor must lie in [0, 1]",
            ));
        }
        Ok(())
    }
}

/// User sentence annotation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationConfig {
    /// Sentences needed before keywords are (re)computed.
    pub sentence_threshold: usize,
    /// Keywords kept per image.
    pub max_keywords: usize,
    /// Shorter tokens are ignored.
    pub min_token_len: usize,
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            sentence_threshold: 4,
            max_keywords: 10,
            min_token_len: 3,
        }
    }
}

impl AnnotationConfig {
    /// Validate thresholds.
    pub fn validate(&self) -> Result<()> {
        if self.sentence_threshold == 0 {
            return Err(RetinaError::config(
                "annotation.sentence_threshold must be at least 1",
            ));
        }
        if self.max_keywords == 0 {
            return Err(RetinaError::config("annotation.max_keywords must be at least 1"));
        }
        Ok(())
    }
}

/// Feature store persistence settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory of the on-disk store; `None` keeps the store in memory.
    pub path: Option<PathBuf>,
    /// WAL records tolerated before a snapshot is written.
    pub wal_compaction_threshold: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            wal_compaction_threshold: 64,
        }
    }
}

impl StoreConfig {
    /// Validate persistence settings.
    pub fn validate(&self) -> Result<()> {
        if self.wal_compaction_threshold == 0 {
            return Err(RetinaError::config(
                "store.wal_compaction_threshold must be at least 1",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RetinaConfig::default();
        assert_eq!(config.ranking.core_weight, 3.5);
        assert_eq!(config.ranking.other_weight, 0.75);
        assert_eq!(config.ranking.fallback_imputation, 0.0001);
        assert_eq!(config.feedback.positive_factor, 1.2);
        assert_eq!(config.feedback.negative_factor, 0.8);
        assert_eq!(config.annotation.sentence_threshold, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = RetinaConfig::from_json(
            r#"{ "expansion": { "synonym_limit": 3 }, "store": { "path": "/tmp/retina" } }"#,
        )
        .unwrap();
        assert_eq!(config.expansion.synonym_limit, 3);
        assert_eq!(config.store.path, Some(PathBuf::from("/tmp/retina")));
        assert_eq!(config.store.wal_compaction_threshold, 64);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(RetinaConfig::from_json(r#"{ "ranking": { "core_weight": 0.0 } }"#).is_err());
        assert!(
            RetinaConfig::from_json(r#"{ "ranking": { "imputation_divisor": 1.0 } }"#).is_err()
        );
        assert!(
            RetinaConfig::from_json(r#"{ "feedback": { "positive_factor": 0.9 } }"#).is_err()
        );
        assert!(
            RetinaConfig::from_json(r#"{ "annotation": { "sentence_threshold": 0 } }"#).is_err()
        );
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("retina.json");
        std::fs::write(&path, r#"{ "feedback": { "negative_factor": 0.5 } }"#).unwrap();

        let config = RetinaConfig::from_file(&path).unwrap();
        assert_eq!(config.feedback.negative_factor, 0.5);
        assert!(RetinaConfig::from_file(dir.path().join("missing.json")).is_err());
    }
}
