//! Write-ahead log of feature store mutations.
//!
//! Every write to the store becomes one sequenced [`WalRecord`]. Records carry a
//! CRC32 of their serialized mutation so a torn or hand-edited log is detected
//! on replay instead of silently corrupting the table.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::feature::{Annotation, FeatureRow, FeatureType};

pub type SeqNumber = u64;

/// A state change applied to the feature table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Mutation {
    /// Insert validated rows; an existing `(filename, type, value)` is overwritten.
    Insert { rows: Vec<FeatureRow> },
    /// Set the probability of every row matching `filename` + `feature_value`.
    UpdateProbability {
        filename: String,
        feature_value: String,
        probability: f64,
    },
    /// Drop all rows of one type for one image, then insert `rows`.
    ReplaceFeatures {
        filename: String,
        feature_type: FeatureType,
        rows: Vec<FeatureRow>,
    },
    /// Record a user sentence about an image.
    Annotate { annotation: Annotation },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalRecord {
    pub seq: SeqNumber,
    pub checksum: u32,
    pub mutation: Mutation,
}

impl WalRecord {
    pub fn new(seq: SeqNumber, mutation: Mutation) -> Result<Self> {
        let checksum = checksum_of(&mutation)?;
        Ok(Self {
            seq,
            checksum,
            mutation,
        })
    }

    /// True when the stored checksum matches the mutation.
    pub fn verify(&self) -> bool {
        checksum_of(&self.mutation)
            .map(|checksum| checksum == self.checksum)
            .unwrap_or(false)
    }
}

fn checksum_of(mutation: &Mutation) -> Result<u32> {
    let bytes = serde_json::to_vec(mutation)?;
    Ok(crc32fast::hash(&bytes))
}

#[derive(Debug, Default)]
pub struct FeatureWal {
    records: Mutex<Vec<WalRecord>>,
    next_seq: AtomicU64,
}

impl FeatureWal {
    /// Rebuild a log from persisted records. `floor` is the last sequence
    /// number already captured by a snapshot.
    pub fn from_records(records: Vec<WalRecord>, floor: SeqNumber) -> Self {
        let max_seq = records
            .iter()
            .map(|record| record.seq)
            .max()
            .unwrap_or(0)
            .max(floor);
        Self {
            records: Mutex::new(records),
            next_seq: AtomicU64::new(max_seq),
        }
    }

    pub fn records(&self) -> Vec<WalRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn last_seq(&self) -> SeqNumber {
        self.next_seq.load(Ordering::SeqCst)
    }

    pub fn append(&self, mutation: Mutation) -> Result<WalRecord> {
        let seq = self.next_seq.load(Ordering::SeqCst) + 1;
        let record = WalRecord::new(seq, mutation)?;
        self.records.lock().push(record.clone());
        self.next_seq.store(seq, Ordering::SeqCst);
        Ok(record)
    }

    /// Undo the last append when it could not be persisted.
    pub fn rollback(&self, seq: SeqNumber) {
        let mut records = self.records.lock();
        if records.last().map(|record| record.seq) == Some(seq) {
            records.pop();
            self.next_seq.store(seq - 1, Ordering::SeqCst);
        }
    }

    /// Drop every record; sequence numbers keep increasing from `last_seq`.
    pub fn truncate(&self) {
        self.records.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(value: &str) -> Mutation {
        Mutation::UpdateProbability {
            filename: "a.jpg".to_string(),
            feature_value: value.to_string(),
            probability: 0.5,
        }
    }

    #[test]
    fn test_append_assigns_increasing_sequence() {
        let wal = FeatureWal::default();
        let first = wal.append(update("car")).unwrap();
        let second = wal.append(update("tree")).unwrap();

        assert_eq!(first.seq, 1);
        assert_eq!(second.seq, 2);
        assert_eq!(wal.len(), 2);
        assert_eq!(wal.last_seq(), 2);
    }

    #[test]
    fn test_rollback_only_removes_matching_tail() {
        let wal = FeatureWal::default();
        wal.append(update("car")).unwrap();
        let second = wal.append(update("tree")).unwrap();

        wal.rollback(1);
        assert_eq!(wal.len(), 2);

        wal.rollback(second.seq);
        assert_eq!(wal.len(), 1);
        assert_eq!(wal.last_seq(), 1);
    }

    #[test]
    fn test_checksum_detects_tampering() {
        let mut record = WalRecord::new(1, update("car")).unwrap();
        assert!(record.verify());

        record.mutation = update("bus");
        assert!(!record.verify());
    }

    #[test]
    fn test_truncate_keeps_sequence() {
        let wal = FeatureWal::from_records(Vec::new(), 7);
        wal.append(update("car")).unwrap();
        wal.truncate();

        assert!(wal.is_empty());
        assert_eq!(wal.append(update("car")).unwrap().seq, 9);
    }
}
