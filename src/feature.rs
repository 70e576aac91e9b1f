//! Feature rows: the facts the index stores about each image.
//!
//! A [`FeatureRow`] says "image `filename` has feature `feature_value` of kind
//! `feature_type` with confidence `probability`". Producers emit loosely typed
//! [`RawFeature`]s; [`RawFeature::into_row`] coerces them into rows the store
//! accepts, rejecting anything that cannot be made well-formed.
//!
//! # Examples
//!
//! ```
//! use retina::feature::{FeatureType, RawFeature};
//! use serde_json::json;
//!
//! let raw = RawFeature::new("Image classification", json!("tabby cat"), json!("0.82"));
//! let row = raw.into_row("cat.jpg").unwrap();
//!
//! assert_eq!(row.feature_type, FeatureType::ImageClassification);
//! assert_eq!(row.feature_value, "tabby cat");
//! assert!((row.probability - 0.82).abs() < 1e-12);
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, RetinaError};

/// Kind of feature a row describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FeatureType {
    /// Share of a basic hue (red, green, ...) in the image.
    Colors,
    /// A dominant color cluster centre.
    DominantColors,
    /// A label emitted by the vision classifier.
    ImageClassification,
    /// A metadata attribute.
    Metadata,
    /// Keywords derived from user-written sentences about the image.
    UserSentenceFeedback,
    /// A producer-reported error marker.
    Error,
}

impl FeatureType {
    /// All feature types, in declaration order.
    pub const ALL: [FeatureType; 6] = [
        FeatureType::Colors,
        FeatureType::DominantColors,
        FeatureType::ImageClassification,
        FeatureType::Metadata,
        FeatureType::UserSentenceFeedback,
        FeatureType::Error,
    ];

    /// Canonical label used on the wire and in persisted rows.
    pub fn label(&self) -> &'static str {
        match self {
            FeatureType::Colors => "Colors",
            FeatureType::DominantColors => "Dominant Colors",
            FeatureType::ImageClassification => "Image classification",
            FeatureType::Metadata => "Metadata",
            FeatureType::UserSentenceFeedback => "User sentence feedback",
            FeatureType::Error => "Error",
        }
    }
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for FeatureType {
    type Err = RetinaError;

    /// Case-insensitive; spaces, underscores and hyphens are ignored.
    fn from_str(s: &str) -> Result<Self> {
        let folded: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .flat_map(char::to_lowercase)
            .collect();

        match folded.as_str() {
            "colors" | "colours" => Ok(FeatureType::Colors),
            "dominantcolors" | "dominantcolours" => Ok(FeatureType::DominantColors),
            "imageclassification" | "classification" => Ok(FeatureType::ImageClassification),
            "metadata" => Ok(FeatureType::Metadata),
            "usersentencefeedback" => Ok(FeatureType::UserSentenceFeedback),
            "error" => Ok(FeatureType::Error),
            _ => Err(RetinaError::validation(format!("unknown feature type '{s}'"))),
        }
    }
}

/// One `(filename, feature_type, feature_value, probability)` fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    /// Base filename of the image.
    pub filename: String,
    /// Kind of feature.
    pub feature_type: FeatureType,
    /// Vocabulary term for the feature.
    pub feature_value: String,
    /// Confidence in `[0, 1]`.
    pub probability: f64,
}

impl FeatureRow {
    /// Create a row, clamping the probability into `[0, 1]`.
    pub fn new<F, V>(filename: F, feature_type: FeatureType, feature_value: V, probability: f64) -> Self
    where
        F: Into<String>,
        V: Into<String>,
    {
        Self {
            filename: filename.into(),
            feature_type,
            feature_value: feature_value.into(),
            probability: clamp_probability(probability),
        }
    }

    /// Check the row invariants.
    pub fn validate(&self) -> Result<()> {
        if self.filename.trim().is_empty() {
            return Err(RetinaError::validation("empty filename"));
        }
        if self.feature_value.trim().is_empty() {
            return Err(RetinaError::validation(format!(
                "empty feature value for '{}'",
                self.filename
            )));
        }
        if !self.probability.is_finite() || !(0.0..=1.0).contains(&self.probability) {
            return Err(RetinaError::validation(format!(
                "probability {} out of range for '{}'/'{}'",
                self.probability, self.filename, self.feature_value
            )));
        }
        Ok(())
    }
}

/// A feature as emitted by a producer, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFeature {
    /// Feature type label, e.g. `"Dominant Colors"`.
    pub feature_type: String,
    /// Feature value of any JSON shape.
    pub feature_value: Value,
    /// Probability as a number or numeric string.
    pub probability: Value,
}

impl RawFeature {
    /// Create a raw feature.
    pub fn new<T: Into<String>>(feature_type: T, feature_value: Value, probability: Value) -> Self {
        Self {
            feature_type: feature_type.into(),
            feature_value,
            probability,
        }
    }

    /// Coerce into a [`FeatureRow`] for `filename`.
    pub fn into_row(self, filename: &str) -> Result<FeatureRow> {
        let feature_type = self.feature_type.parse::<FeatureType>()?;
        let feature_value = coerce_value(&self.feature_value)?;
        let probability = coerce_probability(&self.probability)?;

        let row = FeatureRow::new(filename, feature_type, feature_value, probability);
        row.validate()?;
        Ok(row)
    }
}

/// A free-text sentence a user wrote about an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Base filename of the image.
    pub filename: String,
    /// The sentence as written.
    pub sentence: String,
    /// When the sentence was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl Annotation {
    /// Create an annotation stamped with the current time.
    pub fn new<F: Into<String>, S: Into<String>>(filename: F, sentence: S) -> Self {
        Self {
            filename: filename.into(),
            sentence: sentence.into(),
            recorded_at: Utc::now(),
        }
    }
}

/// Reduce a path-like filename to its base name.
pub fn base_filename(filename: &str) -> String {
    Path::new(filename.trim())
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| filename.trim().to_string())
}

fn clamp_probability(probability: f64) -> f64 {
    if probability.is_finite() {
        probability.clamp(0.0, 1.0)
    } else {
        probability
    }
}

fn coerce_value(value: &Value) -> Result<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
        Value::Null => String::new(),
    };

    if text.is_empty() {
        return Err(RetinaError::validation("feature value is empty or null"));
    }
    Ok(text)
}

fn coerce_probability(value: &Value) -> Result<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(p) if p.is_finite() => Ok(p),
        _ => Err(RetinaError::validation(format!(
            "probability {value} is not a finite number"
        ))),
    }
}
