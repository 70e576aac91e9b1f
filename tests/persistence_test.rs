use std::sync::Arc;

use retina::config::{RetinaConfig, StoreConfig};
use retina::engine::RetrievalEngine;
use retina::error::Result;
use retina::feature::{FeatureRow, FeatureType};
use retina::feedback::Feedback;
use retina::storage::Storage;
use retina::storage::memory::{MemoryStorage, MemoryStorageConfig};
use retina::store::FeatureStore;
use tempfile::TempDir;

fn file_config(dir: &TempDir, threshold: usize) -> RetinaConfig {
    RetinaConfig {
        store: StoreConfig {
            path: Some(dir.path().to_path_buf()),
            wal_compaction_threshold: threshold,
        },
        ..RetinaConfig::default()
    }
}

#[test]
fn test_state_survives_reopen() -> Result<()> {
    let dir = TempDir::new().unwrap();

    {
        let engine = RetrievalEngine::open(file_config(&dir, 64))?;
        engine.store().insert_batch(vec![
            FeatureRow::new("a.jpg", FeatureType::ImageClassification, "kite", 0.5),
            FeatureRow::new("b.jpg", FeatureType::Colors, "blue", 0.7),
        ])?;
        engine.apply_feedback("a.jpg", "kite", Feedback::Positive)?;
        engine.annotate("a.jpg", "kite over the dunes")?;
        // Dropped without flush: everything lives in the WAL.
    }

    let engine = RetrievalEngine::open(file_config(&dir, 64))?;
    let stats = engine.stats();
    assert_eq!(stats.rows, 2);
    assert_eq!(stats.images, 2);
    assert_eq!(stats.annotations, 1);
    assert!(stats.wal_records > 0);

    let rows = engine.store().rows_for("a.jpg", ["kite"]);
    assert!((rows[0].probability - 0.6).abs() < 1e-12);

    Ok(())
}

#[test]
fn test_compaction_keeps_state() -> Result<()> {
    let dir = TempDir::new().unwrap();

    {
        let engine = RetrievalEngine::open(file_config(&dir, 2))?;
        for (i, value) in ["owl", "fox", "elk", "yak"].iter().enumerate() {
            engine.store().insert_batch(vec![FeatureRow::new(
                format!("{i}.jpg"),
                FeatureType::ImageClassification,
                *value,
                0.5,
            )])?;
        }
        assert!(engine.stats().wal_records <= 2);
    }

    let engine = RetrievalEngine::open(file_config(&dir, 2))?;
    assert_eq!(engine.stats().rows, 4);
    let results = engine.search("fox", None)?;
    assert_eq!(results.hits[0].filename, "1.jpg");

    engine.flush()?;
    assert_eq!(engine.stats().wal_records, 0);
    assert_eq!(engine.stats().rows, 4);

    Ok(())
}

#[test]
fn test_shared_memory_storage_replays() -> Result<()> {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new(MemoryStorageConfig::default()));
    let config = StoreConfig::default();

    {
        let store = FeatureStore::open(Arc::clone(&storage), &config)?;
        store.insert_batch(vec![FeatureRow::new(
            "x.jpg",
            FeatureType::Metadata,
            "jpg",
            1.0,
        )])?;
        store.update_probability("x.jpg", "jpg", 0.25)?;
    }

    let store = FeatureStore::open(storage, &config)?;
    let rows = store.select_features(["x.jpg"]);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].probability, 0.25);

    Ok(())
}
