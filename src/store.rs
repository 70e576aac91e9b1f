//! Persistent feature store.
//!
//! The store keeps every [`FeatureRow`] in an in-memory table indexed by
//! feature value and by filename, and makes it durable through a [`Storage`]
//! backend with two files:
//!
//! - `features.json`: a snapshot of the table plus the WAL sequence number it
//!   covers
//! - `wal.json`: the sequenced, checksummed mutations since that snapshot
//!
//! # Concurrency
//!
//! Writers are serialized by a single writer mutex: a mutation is appended to
//! the WAL, persisted, and only then applied to the table under a short
//! exclusive lock. Readers take a shared lock for the duration of one scan, so
//! they never block each other and always observe whole mutations. A batch
//! insert is one mutation, so a completed ingest batch becomes visible to
//! queries all at once.
//!
//! # Examples
//!
//! ```
//! use retina::feature::{FeatureRow, FeatureType};
//! use retina::store::FeatureStore;
//!
//! # fn main() -> retina::error::Result<()> {
//! let store = FeatureStore::in_memory()?;
//! store.insert_batch(vec![
//!     FeatureRow::new("a.jpg", FeatureType::ImageClassification, "dog", 0.9),
//!     FeatureRow::new("b.jpg", FeatureType::ImageClassification, "cat", 0.8),
//! ])?;
//!
//! let candidates = store.select_candidates(["dog", "puppy"]);
//! assert_eq!(candidates.into_iter().collect::<Vec<_>>(), vec!["a.jpg".to_string()]);
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::error::{Result, RetinaError};
use crate::feature::{Annotation, FeatureRow, FeatureType};
use crate::storage::Storage;
use crate::storage::memory::MemoryStorage;

pub mod wal;

use wal::{FeatureWal, Mutation, SeqNumber, WalRecord};

const SNAPSHOT_FILE: &str = "features.json";
const WAL_FILE: &str = "wal.json";
const SNAPSHOT_VERSION: u32 = 1;

type RowKey = (String, FeatureType, String);

/// What one mutation changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct MutationEffect {
    inserted: usize,
    replaced: usize,
    updated: usize,
    removed: usize,
}

/// Outcome of [`FeatureStore::insert_batch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertSummary {
    /// New rows added.
    pub inserted: usize,
    /// Existing `(filename, type, value)` rows whose probability was overwritten.
    pub replaced: usize,
    /// Rows dropped by validation.
    pub skipped: usize,
}

/// Row and image counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Live rows.
    pub rows: usize,
    /// Distinct filenames with at least one row.
    pub images: usize,
    /// Recorded user sentences.
    pub annotations: usize,
    /// Rows per feature type label.
    pub rows_by_type: BTreeMap<String, usize>,
    /// WAL records not yet folded into a snapshot.
    pub wal_records: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreSnapshot {
    version: u32,
    last_seq: SeqNumber,
    rows: Vec<FeatureRow>,
    annotations: Vec<Annotation>,
}

#[derive(Debug, Default)]
struct FeatureTable {
    slots: Vec<Option<FeatureRow>>,
    live: usize,
    by_key: AHashMap<RowKey, usize>,
    by_value: AHashMap<String, Vec<usize>>,
    by_filename: AHashMap<String, Vec<usize>>,
    annotations: BTreeMap<String, Vec<Annotation>>,
}

impl FeatureTable {
    fn apply(&mut self, mutation: &Mutation) -> MutationEffect {
        let mut effect = MutationEffect::default();
        match mutation {
            Mutation::Insert { rows } => {
                for row in rows {
                    if self.upsert(row.clone()) {
                        effect.replaced += 1;
                    } else {
                        effect.inserted += 1;
                    }
                }
            }
            Mutation::UpdateProbability {
                filename,
                feature_value,
                probability,
            } => {
                effect.updated = self.set_probability(filename, feature_value, *probability);
            }
            Mutation::ReplaceFeatures {
                filename,
                feature_type,
                rows,
            } => {
                effect.removed = self.remove_type(filename, *feature_type);
                for row in rows {
                    if self.upsert(row.clone()) {
                        effect.replaced += 1;
                    } else {
                        effect.inserted += 1;
                    }
                }
            }
            Mutation::Annotate { annotation } => {
                self.annotations
                    .entry(annotation.filename.clone())
                    .or_default()
                    .push(annotation.clone());
                effect.inserted = 1;
            }
        }
        effect
    }

    /// Returns true when an existing row was overwritten.
    fn upsert(&mut self, row: FeatureRow) -> bool {
        let key = (
            row.filename.clone(),
            row.feature_type,
            row.feature_value.clone(),
        );
        if let Some(&slot) = self.by_key.get(&key) {
            if let Some(existing) = self.slots[slot].as_mut() {
                existing.probability = row.probability;
                return true;
            }
        }

        let slot = self.slots.len();
        self.by_value
            .entry(row.feature_value.clone())
            .or_default()
            .push(slot);
        self.by_filename
            .entry(row.filename.clone())
            .or_default()
            .push(slot);
        self.by_key.insert(key, slot);
        self.slots.push(Some(row));
        self.live += 1;
        false
    }

    fn set_probability(&mut self, filename: &str, feature_value: &str, probability: f64) -> usize {
        let Some(ids) = self.by_filename.get(filename) else {
            return 0;
        };
        let mut updated = 0;
        for &slot in ids {
            if let Some(row) = self.slots[slot].as_mut() {
                if row.feature_value == feature_value {
                    row.probability = probability;
                    updated += 1;
                }
            }
        }
        updated
    }

    fn remove_type(&mut self, filename: &str, feature_type: FeatureType) -> usize {
        let Some(ids) = self.by_filename.get_mut(filename) else {
            return 0;
        };
        let mut removed = 0;
        let slots = &mut self.slots;
        let by_key = &mut self.by_key;
        let by_value = &mut self.by_value;
        ids.retain(|&slot| {
            let matches = slots[slot]
                .as_ref()
                .is_some_and(|row| row.feature_type == feature_type);
            if matches {
                if let Some(row) = slots[slot].take() {
                    if let Some(value_ids) = by_value.get_mut(&row.feature_value) {
                        value_ids.retain(|&id| id != slot);
                        if value_ids.is_empty() {
                            by_value.remove(&row.feature_value);
                        }
                    }
                    by_key.remove(&(row.filename, row.feature_type, row.feature_value));
                    removed += 1;
                }
            }
            !matches
        });
        if ids.is_empty() {
            self.by_filename.remove(filename);
        }
        self.live -= removed;
        removed
    }

    /// Number of emptied slots still held.
    fn tombstones(&self) -> usize {
        self.slots.len() - self.live
    }

    /// Rebuild the slots and indexes from the live rows.
    fn reclaim(&mut self) {
        let rows: Vec<FeatureRow> = self.slots.drain(..).flatten().collect();
        let annotations = std::mem::take(&mut self.annotations);
        *self = FeatureTable {
            annotations,
            ..FeatureTable::default()
        };
        for row in rows {
            self.upsert(row);
        }
    }

    fn rows(&self) -> impl Iterator<Item = &FeatureRow> {
        self.slots.iter().flatten()
    }

    fn rows_of(&self, filename: &str) -> impl Iterator<Item = &FeatureRow> {
        self.by_filename
            .get(filename)
            .into_iter()
            .flatten()
            .filter_map(|&slot| self.slots[slot].as_ref())
    }
}

/// Append-only table of feature rows with durable, serialized writes.
#[derive(Debug)]
pub struct FeatureStore {
    storage: Arc<dyn Storage>,
    table: RwLock<FeatureTable>,
    wal: FeatureWal,
    writer: Mutex<()>,
    compaction_threshold: usize,
}

impl FeatureStore {
    /// Open (or create) a store on `storage`, replaying any persisted state.
    pub fn open(storage: Arc<dyn Storage>, config: &StoreConfig) -> Result<Self> {
        config.validate()?;

        let mut table = FeatureTable::default();
        let snapshot_seq = load_snapshot(storage.as_ref(), &mut table)?;
        let records = load_wal(storage.as_ref())?;

        let mut kept = Vec::with_capacity(records.len());
        let mut replayed = 0;
        for record in records {
            if record.seq <= snapshot_seq {
                continue;
            }
            if !record.verify() {
                warn!(seq = record.seq, "skipping WAL record with bad checksum");
                continue;
            }
            table.apply(&record.mutation);
            replayed += 1;
            kept.push(record);
        }

        info!(
            rows = table.live,
            snapshot_seq,
            replayed,
            "opened feature store"
        );

        Ok(Self {
            storage,
            table: RwLock::new(table),
            wal: FeatureWal::from_records(kept, snapshot_seq),
            writer: Mutex::new(()),
            compaction_threshold: config.wal_compaction_threshold,
        })
    }

    /// A fresh store backed by memory storage.
    pub fn in_memory() -> Result<Self> {
        Self::open(Arc::new(MemoryStorage::default()), &StoreConfig::default())
    }

    /// Broad phase: every filename with at least one row whose value is in
    /// `vocabulary`.
    pub fn select_candidates<I, S>(&self, vocabulary: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let table = self.table.read();
        let mut candidates = BTreeSet::new();
        for term in vocabulary {
            let Some(ids) = table.by_value.get(term.as_ref()) else {
                continue;
            };
            for &slot in ids {
                if let Some(row) = table.slots[slot].as_ref() {
                    candidates.insert(row.filename.clone());
                }
            }
        }
        candidates
    }

    /// Precise phase: every row, of any value, belonging to `filenames`.
    ///
    /// Rows are grouped by filename in ascending order.
    pub fn select_features<I, S>(&self, filenames: I) -> Vec<FeatureRow>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let wanted: BTreeSet<String> = filenames
            .into_iter()
            .map(|name| name.as_ref().to_string())
            .collect();
        let table = self.table.read();
        wanted
            .iter()
            .flat_map(|filename| table.rows_of(filename).cloned())
            .collect()
    }

    /// Rows of `filename` whose value is one of `values`.
    pub fn rows_for<I, S>(&self, filename: &str, values: I) -> Vec<FeatureRow>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let values: BTreeSet<String> = values
            .into_iter()
            .map(|value| value.as_ref().to_string())
            .collect();
        let table = self.table.read();
        table
            .rows_of(filename)
            .filter(|row| values.contains(&row.feature_value))
            .cloned()
            .collect()
    }

    /// Insert a batch of rows as one transaction. Invalid rows are skipped
    /// with a warning instead of failing the batch.
    pub fn insert_batch(&self, rows: Vec<FeatureRow>) -> Result<InsertSummary> {
        let mut summary = InsertSummary::default();
        let mut valid = Vec::with_capacity(rows.len());
        for row in rows {
            match row.validate() {
                Ok(()) => valid.push(row),
                Err(e) => {
                    warn!(filename = %row.filename, error = %e, "skipping invalid feature row");
                    summary.skipped += 1;
                }
            }
        }

        if valid.is_empty() {
            return Ok(summary);
        }

        let effect = self.commit(Mutation::Insert { rows: valid })?;
        summary.inserted = effect.inserted;
        summary.replaced = effect.replaced;
        debug!(
            inserted = summary.inserted,
            replaced = summary.replaced,
            skipped = summary.skipped,
            "committed feature batch"
        );
        Ok(summary)
    }

    /// Overwrite the probability of every row matching `filename` and
    /// `feature_value`, whatever its feature type. Returns the rows updated.
    pub fn update_probability(
        &self,
        filename: &str,
        feature_value: &str,
        probability: f64,
    ) -> Result<usize> {
        if !probability.is_finite() {
            return Err(RetinaError::validation(format!(
                "probability {probability} is not finite"
            )));
        }
        let probability = probability.clamp(0.0, 1.0);

        let exists = self
            .table
            .read()
            .rows_of(filename)
            .any(|row| row.feature_value == feature_value);
        if !exists {
            return Ok(0);
        }

        let effect = self.commit(Mutation::UpdateProbability {
            filename: filename.to_string(),
            feature_value: feature_value.to_string(),
            probability,
        })?;
        Ok(effect.updated)
    }

    /// Supersede all of `filename`'s rows of `feature_type` with `rows`.
    /// Returns the number of rows removed.
    pub fn replace_features(
        &self,
        filename: &str,
        feature_type: FeatureType,
        rows: Vec<FeatureRow>,
    ) -> Result<usize> {
        for row in &rows {
            row.validate()?;
            if row.filename != filename || row.feature_type != feature_type {
                return Err(RetinaError::invalid_argument(format!(
                    "row '{}'/{} does not belong to '{}'/{}",
                    row.filename, row.feature_type, filename, feature_type
                )));
            }
        }

        let effect = self.commit(Mutation::ReplaceFeatures {
            filename: filename.to_string(),
            feature_type,
            rows,
        })?;
        Ok(effect.removed)
    }

    /// Record a user sentence. Returns how many sentences the image now has.
    pub fn record_annotation(&self, annotation: Annotation) -> Result<usize> {
        let filename = annotation.filename.clone();
        self.commit(Mutation::Annotate { annotation })?;
        Ok(self
            .table
            .read()
            .annotations
            .get(&filename)
            .map_or(0, Vec::len))
    }

    /// All sentences recorded for `filename`, oldest first.
    pub fn annotations_for(&self, filename: &str) -> Vec<Annotation> {
        self.table
            .read()
            .annotations
            .get(filename)
            .cloned()
            .unwrap_or_default()
    }

    /// Every filename with at least one row.
    pub fn filenames(&self) -> BTreeSet<String> {
        self.table.read().by_filename.keys().cloned().collect()
    }

    /// Number of live rows.
    pub fn len(&self) -> usize {
        self.table.read().live
    }

    /// True when the store holds no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row and image counts.
    pub fn stats(&self) -> StoreStats {
        let table = self.table.read();
        let mut rows_by_type = BTreeMap::new();
        for row in table.rows() {
            *rows_by_type
                .entry(row.feature_type.label().to_string())
                .or_insert(0) += 1;
        }
        StoreStats {
            rows: table.live,
            images: table.by_filename.len(),
            annotations: table.annotations.values().map(Vec::len).sum(),
            rows_by_type,
            wal_records: self.wal.len(),
        }
    }

    /// Fold the WAL into a fresh snapshot.
    pub fn flush(&self) -> Result<()> {
        let _guard = self.writer.lock();
        self.compact()?;
        self.storage.sync()
    }

    fn commit(&self, mutation: Mutation) -> Result<MutationEffect> {
        let _guard = self.writer.lock();

        let record = self.wal.append(mutation)?;
        if let Err(e) = self.persist_wal() {
            self.wal.rollback(record.seq);
            return Err(e);
        }

        let effect = self.table.write().apply(&record.mutation);

        if self.wal.len() > self.compaction_threshold {
            if let Err(e) = self.compact() {
                warn!(error = %e, "WAL compaction failed; keeping the log");
            }
        }
        Ok(effect)
    }

    fn compact(&self) -> Result<()> {
        let last_seq = self.wal.last_seq();
        let snapshot = {
            let table = self.table.read();
            StoreSnapshot {
                version: SNAPSHOT_VERSION,
                last_seq,
                rows: table.rows().cloned().collect(),
                annotations: table.annotations.values().flatten().cloned().collect(),
            }
        };
        let serialized = serde_json::to_vec(&snapshot)?;
        self.storage.write_atomic(SNAPSHOT_FILE, &serialized)?;

        {
            let mut table = self.table.write();
            let tombstones = table.tombstones();
            if tombstones > 0 {
                table.reclaim();
                debug!(tombstones, "reclaimed feature slots");
            }
        }

        self.wal.truncate();
        self.persist_wal()?;
        debug!(last_seq, rows = snapshot.rows.len(), "wrote feature snapshot");
        Ok(())
    }

    fn persist_wal(&self) -> Result<()> {
        let serialized = serde_json::to_vec(&self.wal.records())?;
        self.storage.write_atomic(WAL_FILE, &serialized)
    }
}

fn load_snapshot(storage: &dyn Storage, table: &mut FeatureTable) -> Result<SeqNumber> {
    if !storage.file_exists(SNAPSHOT_FILE) {
        return Ok(0);
    }
    let buffer = storage.read_all(SNAPSHOT_FILE)?;
    if buffer.is_empty() {
        return Ok(0);
    }

    let snapshot: StoreSnapshot = serde_json::from_slice(&buffer)?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(RetinaError::storage(format!(
            "feature snapshot version mismatch: expected {}, found {}",
            SNAPSHOT_VERSION, snapshot.version
        )));
    }

    for row in snapshot.rows {
        table.upsert(row);
    }
    for annotation in snapshot.annotations {
        table.apply(&Mutation::Annotate { annotation });
    }
    Ok(snapshot.last_seq)
}

fn load_wal(storage: &dyn Storage) -> Result<Vec<WalRecord>> {
    if !storage.file_exists(WAL_FILE) {
        return Ok(Vec::new());
    }
    let buffer = storage.read_all(WAL_FILE)?;
    if buffer.is_empty() {
        return Ok(Vec::new());
    }
    let mut records: Vec<WalRecord> = serde_json::from_slice(&buffer)?;
    records.sort_by_key(|record| record.seq);
    Ok(records)
}
