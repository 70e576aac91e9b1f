//! Vector space model ranking.
//!
//! Candidate rows are pivoted into one weighted, L2-normalized vector per
//! image over a shared vocabulary, the query becomes a vector over the same
//! vocabulary, and images are ranked by cosine similarity (the dot product of
//! the unit vectors).
//!
//! Steps of [`VectorSpaceModel::rank`]:
//!
//! 1. The vocabulary is the union of candidate feature values and query term
//!    texts, sorted lexicographically; each entry is one column.
//! 2. Rows pivot into `vector[filename][value] = probability`. When one image
//!    has the same value under several feature types, the maximum probability
//!    is kept.
//! 3. Absent cells get an imputed value: the smallest positive probability
//!    among the candidate rows divided by `imputation_divisor`, or
//!    `fallback_imputation` when there is none.
//! 4. Core term columns are multiplied by `core_weight`, all others by
//!    `other_weight`.
//! 5. Each image vector is L2-normalized; a zero vector stays zero.
//! 6. The query vector holds `core_weight` for Core terms, `other_weight` for
//!    Expansion terms and 0 elsewhere, then is normalized.
//! 7. Images are sorted by score descending, ties by filename ascending.
//!
//! # Examples
//!
//! ```
//! use retina::config::RankingConfig;
//! use retina::expansion::QueryTerms;
//! use retina::feature::{FeatureRow, FeatureType};
//! use retina::vsm::VectorSpaceModel;
//!
//! let rows = vec![
//!     FeatureRow::new("A", FeatureType::ImageClassification, "dog", 0.9),
//!     FeatureRow::new("B", FeatureType::ImageClassification, "cat", 0.8),
//! ];
//! let model = VectorSpaceModel::new(RankingConfig::default()).unwrap();
//! let ranked = model.rank(&rows, &QueryTerms::from_core(["dog"]));
//!
//! assert_eq!(ranked[0].filename, "A");
//! assert_eq!(ranked[1].filename, "B");
//! assert!(ranked[0].score > ranked[1].score && ranked[1].score > 0.0);
//! ```

use std::collections::BTreeMap;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RankingConfig;
use crate::error::Result;
use crate::expansion::{QueryTerms, TermRole};
use crate::feature::FeatureRow;

/// Column order shared by every vector of one ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    columns: Vec<String>,
    index: AHashMap<String, usize>,
}

impl Vocabulary {
    /// Union of `rows`' feature values and `terms`' texts, sorted.
    pub fn build(rows: &[FeatureRow], terms: &QueryTerms) -> Self {
        let mut columns: Vec<String> = rows
            .iter()
            .map(|row| row.feature_value.as_str())
            .chain(terms.texts())
            .map(str::to_string)
            .collect();
        columns.sort();
        columns.dedup();

        let index = columns
            .iter()
            .enumerate()
            .map(|(i, column)| (column.clone(), i))
            .collect();
        Vocabulary { columns, index }
    }

    /// Column index of `value`.
    pub fn index_of(&self, value: &str) -> Option<usize> {
        self.index.get(value).copied()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Weighted, normalized image vectors of one ranking.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    /// Shared column order.
    pub vocabulary: Vocabulary,
    /// One unit (or zero) vector per candidate filename.
    pub vectors: BTreeMap<String, Vec<f64>>,
    /// Value given to absent cells before weighting.
    pub imputed: f64,
}

/// One ranked image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredImage {
    pub filename: String,
    pub score: f64,
}

/// Cosine-similarity ranker over weighted feature vectors.
#[derive(Debug, Clone)]
pub struct VectorSpaceModel {
    config: RankingConfig,
}

impl VectorSpaceModel {
    /// Create a model; rejects invalid weights or imputation settings.
    pub fn new(config: RankingConfig) -> Result<Self> {
        config.validate()?;
        Ok(VectorSpaceModel { config })
    }

    pub fn config(&self) -> &RankingConfig {
        &self.config
    }

    /// Rank the images owning `rows` against `terms`.
    pub fn rank(&self, rows: &[FeatureRow], terms: &QueryTerms) -> Vec<ScoredImage> {
        self.rank_with_limit(rows, terms, None)
    }

    /// Like [`rank`](Self::rank), keeping at most `limit` results.
    pub fn rank_with_limit(
        &self,
        rows: &[FeatureRow],
        terms: &QueryTerms,
        limit: Option<usize>,
    ) -> Vec<ScoredImage> {
        if rows.is_empty() {
            return Vec::new();
        }

        let matrix = self.image_vectors(rows, terms);
        let query = self.query_vector(&matrix.vocabulary, terms);

        let mut scored: Vec<ScoredImage> = matrix
            .vectors
            .iter()
            .map(|(filename, vector)| ScoredImage {
                filename: filename.clone(),
                score: dot(vector, &query),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.filename.cmp(&b.filename))
        });
        if let Some(limit) = limit {
            scored.truncate(limit);
        }

        debug!(
            candidates = matrix.vectors.len(),
            vocabulary = matrix.vocabulary.len(),
            imputed = matrix.imputed,
            "ranked candidates"
        );
        scored
    }

    /// Pivot, impute, weight and normalize the candidate rows.
    pub fn image_vectors(&self, rows: &[FeatureRow], terms: &QueryTerms) -> FeatureMatrix {
        let vocabulary = Vocabulary::build(rows, terms);
        let imputed = self.imputed_value(rows);

        let mut cells: BTreeMap<String, Vec<Option<f64>>> = BTreeMap::new();
        for row in rows {
            let Some(column) = vocabulary.index_of(&row.feature_value) else {
                continue;
            };
            let vector = cells
                .entry(row.filename.clone())
                .or_insert_with(|| vec![None; vocabulary.len()]);
            let cell = &mut vector[column];
            *cell = Some(cell.map_or(row.probability, |p| p.max(row.probability)));
        }

        let weights = self.column_weights(&vocabulary, terms);
        let vectors = cells
            .into_iter()
            .map(|(filename, cells)| {
                let mut vector: Vec<f64> = cells
                    .into_iter()
                    .zip(&weights)
                    .map(|(cell, weight)| cell.unwrap_or(imputed) * weight)
                    .collect();
                normalize(&mut vector);
                (filename, vector)
            })
            .collect();

        FeatureMatrix {
            vocabulary,
            vectors,
            imputed,
        }
    }

    /// Normalized query vector over `vocabulary`.
    pub fn query_vector(&self, vocabulary: &Vocabulary, terms: &QueryTerms) -> Vec<f64> {
        let mut vector = vec![0.0; vocabulary.len()];
        for (text, role) in terms.iter() {
            if let Some(column) = vocabulary.index_of(text) {
                vector[column] = match role {
                    TermRole::Core => self.config.core_weight,
                    TermRole::Expansion => self.config.other_weight,
                };
            }
        }
        normalize(&mut vector);
        vector
    }

    fn imputed_value(&self, rows: &[FeatureRow]) -> f64 {
        rows.iter()
            .map(|row| row.probability)
            .filter(|p| *p > 0.0)
            .min_by(f64::total_cmp)
            .map_or(self.config.fallback_imputation, |min| {
                min / self.config.imputation_divisor
            })
    }

    fn column_weights(&self, vocabulary: &Vocabulary, terms: &QueryTerms) -> Vec<f64> {
        vocabulary
            .columns()
            .iter()
            .map(|column| {
                if terms.is_core(column) {
                    self.config.core_weight
                } else {
                    self.config.other_weight
                }
            })
            .collect()
    }
}

impl Default for VectorSpaceModel {
    fn default() -> Self {
        VectorSpaceModel {
            config: RankingConfig::default(),
        }
    }
}

/// Scale `vector` to unit L2 norm; a zero vector is left unchanged.
pub fn normalize(vector: &mut [f64]) {
    let norm = vector.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Dot product of two equally long vectors.
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
