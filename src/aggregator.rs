//! Concurrent per-image feature aggregation.
//!
//! [`FeatureAggregator::ingest_batch`] runs one unit of work per image on a
//! named rayon pool. Inside a unit the producers run one after another; units
//! share nothing and report back over a channel. Once every unit has reported,
//! all accumulated rows are committed to the [`FeatureStore`] in a single
//! batch insert, so a batch becomes visible to queries all at once.
//!
//! A failing (or panicking) producer fails only its own image: the error is
//! logged, recorded in the returned [`IngestReport`], and no rows are emitted
//! for that image.

use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ahash::AHashMap;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AggregatorConfig;
use crate::error::{Result, RetinaError};
use crate::expansion::SynonymSource;
use crate::feature::{FeatureRow, FeatureType, base_filename};
use crate::store::FeatureStore;

pub mod producer;

use producer::{FeatureProducer, FileInfoProducer, SidecarProducer};

/// One image that could not be ingested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestFailure {
    pub filename: String,
    pub error: String,
}

/// Outcome of one ingest batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    /// Identifier of this batch, for correlating log lines.
    pub batch_id: Uuid,
    /// Images whose units completed, sorted.
    pub indexed: Vec<String>,
    /// Images whose units failed, sorted by filename.
    pub failures: Vec<IngestFailure>,
    /// New rows written.
    pub rows_inserted: usize,
    /// Existing rows whose probability was overwritten.
    pub rows_replaced: usize,
    /// Rows dropped by validation.
    pub rows_skipped: usize,
    /// Wall time of the batch.
    pub elapsed: Duration,
}

impl IngestReport {
    fn new(batch_id: Uuid) -> Self {
        IngestReport {
            batch_id,
            indexed: Vec::new(),
            failures: Vec::new(),
            rows_inserted: 0,
            rows_replaced: 0,
            rows_skipped: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// True when no image failed.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug)]
struct UnitRows {
    rows: Vec<FeatureRow>,
    skipped: usize,
}

#[derive(Debug)]
struct UnitResult {
    filename: String,
    outcome: std::result::Result<UnitRows, String>,
}

/// Runs feature producers over batches of images.
#[derive(Debug)]
pub struct FeatureAggregator {
    config: AggregatorConfig,
    producers: Arc<Vec<Arc<dyn FeatureProducer>>>,
    synonyms: Option<Arc<dyn SynonymSource>>,
    thread_pool: Arc<ThreadPool>,
}

impl FeatureAggregator {
    /// Create an aggregator running `producers` for every image.
    pub fn new(config: AggregatorConfig, producers: Vec<Arc<dyn FeatureProducer>>) -> Result<Self> {
        let thread_pool_size = config.thread_pool_size.unwrap_or_else(num_cpus::get);

        let thread_pool = ThreadPoolBuilder::new()
            .num_threads(thread_pool_size)
            .thread_name(|i| format!("retina-ingest-{i}"))
            .build()
            .map_err(|e| RetinaError::internal(format!("Failed to create thread pool: {e}")))?;

        Ok(FeatureAggregator {
            config,
            producers: Arc::new(producers),
            synonyms: None,
            thread_pool: Arc::new(thread_pool),
        })
    }

    /// An aggregator with the sidecar and file-info producers.
    pub fn with_default_producers(config: AggregatorConfig) -> Result<Self> {
        Self::new(
            config,
            vec![Arc::new(SidecarProducer::new()), Arc::new(FileInfoProducer::new())],
        )
    }

    /// Synonym source used for label enrichment.
    pub fn with_synonyms(mut self, synonyms: Arc<dyn SynonymSource>) -> Self {
        self.synonyms = Some(synonyms);
        self
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Worker threads in the pool.
    pub fn thread_count(&self) -> usize {
        self.thread_pool.current_num_threads()
    }

    /// Extract features for `filenames` and commit them to `store`.
    ///
    /// Filenames are reduced to their base name and resolved against the
    /// upload directory; duplicates are ingested once. Only a failed commit is
    /// returned as an error.
    pub fn ingest_batch<I, S>(&self, store: &FeatureStore, filenames: I) -> Result<IngestReport>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let started = Instant::now();
        let mut report = IngestReport::new(Uuid::new_v4());

        let mut unique = BTreeSet::new();
        for name in filenames {
            let filename = base_filename(name.as_ref());
            if let Some(error) = invalid_filename(&filename) {
                report.failures.push(IngestFailure {
                    filename: name.as_ref().to_string(),
                    error: error.to_string(),
                });
            } else {
                unique.insert(filename);
            }
        }

        if unique.is_empty() {
            report.elapsed = started.elapsed();
            return Ok(report);
        }

        info!(batch_id = %report.batch_id, images = unique.len(), "ingesting batch");

        let results = self.run_units(unique);

        let mut rows = Vec::new();
        for result in results {
            match result.outcome {
                Ok(unit) => {
                    report.rows_skipped += unit.skipped;
                    rows.extend(unit.rows);
                    report.indexed.push(result.filename);
                }
                Err(error) => {
                    warn!(
                        batch_id = %report.batch_id,
                        filename = %result.filename,
                        error = %error,
                        "feature extraction failed"
                    );
                    report.failures.push(IngestFailure {
                        filename: result.filename,
                        error,
                    });
                }
            }
        }
        report.failures.sort_by(|a, b| a.filename.cmp(&b.filename));

        let summary = store.insert_batch(rows)?;
        report.rows_inserted = summary.inserted;
        report.rows_replaced = summary.replaced;
        report.rows_skipped += summary.skipped;
        report.elapsed = started.elapsed();

        info!(
            batch_id = %report.batch_id,
            indexed = report.indexed.len(),
            failed = report.failures.len(),
            rows = report.rows_inserted,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "ingest batch committed"
        );
        Ok(report)
    }

    /// Spawn one unit per filename and collect every result.
    fn run_units(&self, filenames: BTreeSet<String>) -> Vec<UnitResult> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let synonyms = if self.config.enrich_labels {
            self.synonyms.clone()
        } else {
            None
        };

        for filename in filenames {
            let tx = tx.clone();
            let producers = Arc::clone(&self.producers);
            let synonyms = synonyms.clone();
            let path = self.config.upload_dir.join(&filename);
            let enrichment_limit = self.config.enrichment_limit;

            self.thread_pool.spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    extract_unit(
                        &producers,
                        synonyms.as_deref(),
                        enrichment_limit,
                        &path,
                        &filename,
                    )
                }))
                .unwrap_or_else(|payload| {
                    Err(format!("producer panicked: {}", panic_message(&*payload)))
                });
                let _ = tx.send(UnitResult { filename, outcome });
            });
        }

        // Drop the original sender so the receiver ends when all units report.
        drop(tx);

        let mut results: Vec<UnitResult> = rx.iter().collect();
        results.sort_by(|a, b| a.filename.cmp(&b.filename));
        results
    }
}

fn extract_unit(
    producers: &[Arc<dyn FeatureProducer>],
    synonyms: Option<&dyn SynonymSource>,
    enrichment_limit: usize,
    path: &Path,
    filename: &str,
) -> std::result::Result<UnitRows, String> {
    let mut rows = Vec::new();
    let mut skipped = 0;

    for producer in producers {
        let features = producer
            .extract(path)
            .map_err(|e| format!("{}: {e}", producer.name()))?;
        debug!(
            filename,
            producer = producer.name(),
            features = features.len(),
            "extracted features"
        );

        for raw in features {
            match raw.into_row(filename) {
                Ok(row) => rows.extend(split_labels(row)),
                Err(e) => {
                    warn!(filename, producer = producer.name(), error = %e, "skipping invalid feature");
                    skipped += 1;
                }
            }
        }
    }

    if let Some(synonyms) = synonyms {
        let enriched = enrich_labels(&rows, synonyms, enrichment_limit);
        rows.extend(enriched);
    }

    Ok(UnitRows {
        rows: dedupe_rows(rows),
        skipped,
    })
}

/// Why `filename` cannot name an upload, if it cannot.
fn invalid_filename(filename: &str) -> Option<&'static str> {
    if filename.is_empty() {
        Some("empty filename")
    } else if filename == "." || filename == ".." || filename.contains(['/', '\\']) {
        Some("not a file name")
    } else {
        None
    }
}

/// `"tabby, tabby cat"` becomes one classification row per label.
pub fn split_labels(row: FeatureRow) -> Vec<FeatureRow> {
    if row.feature_type != FeatureType::ImageClassification || !row.feature_value.contains(',') {
        return vec![row];
    }
    row.feature_value
        .split(',')
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .map(|label| FeatureRow::new(&row.filename, row.feature_type, label, row.probability))
        .collect()
}

/// Synonym rows at half probability for every word of the stronger half of
/// the classification labels.
pub fn enrich_labels(
    rows: &[FeatureRow],
    synonyms: &dyn SynonymSource,
    limit: usize,
) -> Vec<FeatureRow> {
    let mut labels: Vec<&FeatureRow> = rows
        .iter()
        .filter(|row| row.feature_type == FeatureType::ImageClassification)
        .collect();
    labels.sort_by(|a, b| b.probability.total_cmp(&a.probability));
    let top_half = labels.len() / 2;

    let mut enriched = Vec::new();
    for label in labels.into_iter().take(top_half) {
        for word in label.feature_value.split_whitespace() {
            let word = word.to_lowercase();
            match synonyms.synonyms(&word, limit) {
                Ok(found) => {
                    for synonym in found {
                        let synonym = synonym.to_lowercase();
                        if synonym != word {
                            enriched.push(FeatureRow::new(
                                &label.filename,
                                FeatureType::ImageClassification,
                                synonym,
                                label.probability / 2.0,
                            ));
                        }
                    }
                }
                Err(e) => warn!(word = %word, error = %e, "label enrichment lookup failed"),
            }
        }
    }
    enriched
}

/// Collapse rows sharing `(filename, type, value)`, keeping the highest
/// probability.
fn dedupe_rows(rows: Vec<FeatureRow>) -> Vec<FeatureRow> {
    let mut seen: AHashMap<(String, FeatureType, String), usize> = AHashMap::new();
    let mut unique: Vec<FeatureRow> = Vec::with_capacity(rows.len());
    for row in rows {
        let key = (row.filename.clone(), row.feature_type, row.feature_value.clone());
        match seen.get(&key) {
            Some(&i) => {
                if row.probability > unique[i].probability {
                    unique[i].probability = row.probability;
                }
            }
            None => {
                seen.insert(key, unique.len());
                unique.push(row);
            }
        }
    }
    unique
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
