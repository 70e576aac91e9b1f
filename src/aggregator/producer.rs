//! Feature producers.
//!
//! A producer turns one image file into [`RawFeature`]s. Vision models, color
//! clustering and EXIF readers live outside this crate and plug in through
//! [`FeatureProducer`]; two file-based producers ship with it.

use std::path::{Path, PathBuf};

use serde_json::json;

use crate::error::{Result, RetinaError};
use crate::feature::{FeatureType, RawFeature};

/// Extracts features from one image.
///
/// Implementations are called concurrently from worker threads without
/// extra synchronization.
pub trait FeatureProducer: Send + Sync + std::fmt::Debug {
    /// Short name used in logs and failure reports.
    fn name(&self) -> &str;

    /// Extract the features of the image at `path`.
    fn extract(&self, path: &Path) -> Result<Vec<RawFeature>>;
}

/// Reads precomputed features from a JSON file next to the image.
///
/// For `uploads/cat.jpg` the sidecar is `uploads/cat.jpg.features.json`, an
/// array of `{"feature_type", "feature_value", "probability"}` objects. A
/// missing sidecar yields no features; an unreadable or malformed one is an
/// error.
#[derive(Debug, Clone, Copy, Default)]
pub struct SidecarProducer;

impl SidecarProducer {
    /// Suffix appended to the image filename.
    pub const SUFFIX: &'static str = ".features.json";

    pub fn new() -> Self {
        SidecarProducer
    }

    /// Path of the sidecar for `image`.
    pub fn sidecar_path(image: &Path) -> PathBuf {
        let mut name = image.as_os_str().to_os_string();
        name.push(Self::SUFFIX);
        PathBuf::from(name)
    }
}

impl FeatureProducer for SidecarProducer {
    fn name(&self) -> &str {
        "sidecar"
    }

    fn extract(&self, path: &Path) -> Result<Vec<RawFeature>> {
        let sidecar = Self::sidecar_path(path);
        if !sidecar.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&sidecar).map_err(|e| {
            RetinaError::producer(format!("Failed to read '{}': {e}", sidecar.display()))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            RetinaError::producer(format!("Malformed sidecar '{}': {e}", sidecar.display()))
        })
    }
}

/// Emits the file extension as a `Metadata` feature.
///
/// Fails when the image does not exist, so a missing upload is reported as a
/// failed unit rather than indexed with no features.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileInfoProducer;

impl FileInfoProducer {
    pub fn new() -> Self {
        FileInfoProducer
    }
}

impl FeatureProducer for FileInfoProducer {
    fn name(&self) -> &str {
        "file-info"
    }

    fn extract(&self, path: &Path) -> Result<Vec<RawFeature>> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            RetinaError::producer(format!("Cannot open image '{}': {e}", path.display()))
        })?;
        if !metadata.is_file() {
            return Err(RetinaError::producer(format!(
                "'{}' is not a file",
                path.display()
            )));
        }

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase);

        Ok(extension
            .into_iter()
            .map(|ext| RawFeature::new(FeatureType::Metadata.label(), json!(ext), json!(1.0)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sidecar_path() {
        assert_eq!(
            SidecarProducer::sidecar_path(Path::new("uploads/cat.jpg")),
            PathBuf::from("uploads/cat.jpg.features.json")
        );
    }

    #[test]
    fn test_sidecar_reads_features() {
        let dir = TempDir::new().unwrap();
        let image = dir.path().join("cat.jpg");
        std::fs::write(&image, b"jpeg").unwrap();
        std::fs::write(
            SidecarProducer::sidecar_path(&image),
            r#"[{"feature_type": "Image classification", "feature_value": "tabby, tabby cat", "probability": 0.8}]"#,
        )
        .unwrap();

        let features = SidecarProducer.extract(&image).unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].feature_type, "Image classification");
    }

    #[test]
    fn test_sidecar_missing_and_malformed() {
        let dir = TempDir::new().unwrap();
        let image = dir.path().join("dog.png");
        assert!(SidecarProducer.extract(&image).unwrap().is_empty());

        std::fs::write(SidecarProducer::sidecar_path(&image), "{").unwrap();
        assert!(SidecarProducer.extract(&image).is_err());
    }

    #[test]
    fn test_file_info() {
        let dir = TempDir::new().unwrap();
        let image = dir.path().join("Beach.JPG");
        std::fs::write(&image, b"jpeg").unwrap();

        let features = FileInfoProducer.extract(&image).unwrap();
        assert_eq!(features, vec![RawFeature::new("Metadata", json!("jpg"), json!(1.0))]);

        assert!(FileInfoProducer.extract(&dir.path().join("missing.jpg")).is_err());
        assert!(FileInfoProducer.extract(dir.path()).is_err());
    }
}
