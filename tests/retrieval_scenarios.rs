use std::fs;
use std::path::Path;

use retina::config::{AggregatorConfig, RetinaConfig};
use retina::engine::RetrievalEngine;
use retina::error::Result;
use retina::feature::{FeatureRow, FeatureType};
use retina::feedback::Feedback;
use serde_json::json;
use tempfile::TempDir;

fn hit_names(engine: &RetrievalEngine, query: &str) -> Result<Vec<String>> {
    Ok(engine
        .search(query, None)?
        .hits
        .into_iter()
        .map(|hit| hit.filename)
        .collect())
}

fn write_image(dir: &Path, name: &str, features: Option<serde_json::Value>) {
    fs::write(dir.join(name), b"\x89PNG").unwrap();
    if let Some(features) = features {
        fs::write(
            dir.join(format!("{name}.features.json")),
            serde_json::to_vec(&features).unwrap(),
        )
        .unwrap();
    }
}

#[test]
fn test_stronger_match_ranks_first() -> Result<()> {
    let engine = RetrievalEngine::in_memory()?;
    engine.store().insert_batch(vec![
        FeatureRow::new("A.jpg", FeatureType::ImageClassification, "dog", 0.9),
        FeatureRow::new("A.jpg", FeatureType::Colors, "green", 0.5),
        FeatureRow::new("B.jpg", FeatureType::ImageClassification, "dog", 0.4),
        FeatureRow::new("B.jpg", FeatureType::ImageClassification, "cat", 0.9),
        FeatureRow::new("C.jpg", FeatureType::ImageClassification, "cat", 0.9),
    ])?;

    let results = engine.search("Show me a dog on green grass!", None)?;

    assert_eq!(results.core_terms, vec!["dog", "grass", "green"]);
    let order: Vec<&str> = results.hits.iter().map(|h| h.filename.as_str()).collect();
    assert_eq!(order, vec!["A.jpg", "B.jpg"]);
    assert!(results.hits[0].score > results.hits[1].score);
    assert!(results.hits.iter().all(|h| h.score <= 1.0 + 1e-9));

    Ok(())
}

#[test]
fn test_batch_with_missing_upload() -> Result<()> {
    let uploads = TempDir::new().unwrap();
    write_image(
        uploads.path(),
        "one.png",
        Some(json!([
            { "feature_type": "Image classification", "feature_value": "dog, puppy", "probability": 0.8 },
            { "feature_type": "Colors", "feature_value": "brown", "probability": "0.35" }
        ])),
    );
    write_image(
        uploads.path(),
        "three.jpg",
        Some(json!([
            { "feature_type": "Image classification", "feature_value": "cat", "probability": 0.7 }
        ])),
    );

    let config = RetinaConfig {
        aggregator: AggregatorConfig {
            upload_dir: uploads.path().to_path_buf(),
            thread_pool_size: Some(2),
            ..AggregatorConfig::default()
        },
        ..RetinaConfig::default()
    };
    let engine = RetrievalEngine::open(config)?;

    let report = engine.ingest_batch(["one.png", "two.png", "three.jpg"])?;

    assert!(!report.is_success());
    assert_eq!(report.indexed.len(), 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].filename, "two.png");

    assert_eq!(hit_names(&engine, "puppy")?, vec!["one.png"]);
    assert_eq!(hit_names(&engine, "cat")?, vec!["three.jpg"]);
    assert!(hit_names(&engine, "png")?.contains(&"one.png".to_string()));
    assert_eq!(engine.stats().images, 2);

    Ok(())
}

#[test]
fn test_feedback_accumulates() -> Result<()> {
    let engine = RetrievalEngine::in_memory()?;
    engine.store().insert_batch(vec![
        FeatureRow::new("a.jpg", FeatureType::ImageClassification, "boat", 0.6),
        FeatureRow::new("b.jpg", FeatureType::ImageClassification, "boat", 0.5),
    ])?;
    assert_eq!(hit_names(&engine, "boat")?, vec!["a.jpg", "b.jpg"]);

    let outcome = engine.apply_feedback("b.jpg", "a boat", Feedback::Positive)?;
    assert_eq!(outcome.changes.len(), 1);
    assert!((outcome.changes[0].new - 0.6).abs() < 1e-12);

    engine.apply_feedback("b.jpg", "a boat", Feedback::Positive)?;
    engine.apply_feedback("a.jpg", "a boat", Feedback::Negative)?;

    let rows = engine.store().rows_for("b.jpg", ["boat"]);
    assert!((rows[0].probability - 0.72).abs() < 1e-12);
    let rows = engine.store().rows_for("a.jpg", ["boat"]);
    assert!((rows[0].probability - 0.48).abs() < 1e-12);

    Ok(())
}

#[test]
fn test_sentences_become_searchable() -> Result<()> {
    let engine = RetrievalEngine::in_memory()?;
    engine.store().insert_batch(vec![FeatureRow::new(
        "trip.jpg",
        FeatureType::ImageClassification,
        "seashore",
        0.9,
    )])?;

    let sentences = [
        "my sister at the lighthouse",
        "lighthouse on a cliff",
        "windy afternoon",
    ];
    for sentence in sentences {
        let outcome = engine.annotate("trip.jpg", sentence)?;
        assert!(!outcome.recomputed);
    }
    assert!(hit_names(&engine, "lighthouse")?.is_empty());

    let outcome = engine.annotate("trip.jpg", "the old lighthouse")?;
    assert!(outcome.recomputed);
    assert_eq!(outcome.keywords[0].term, "lighthouse");
    assert_eq!(hit_names(&engine, "lighthouse")?, vec!["trip.jpg"]);
    assert_eq!(engine.stats().annotations, 4);

    Ok(())
}
