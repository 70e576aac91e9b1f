//! Storage abstraction layer for Retina.
//!
//! The feature store persists its snapshot and write-ahead log through the
//! [`Storage`] trait, so the same store code runs against a directory on disk
//! or against an in-memory map in tests.
//!
//! # Storage Types
//!
//! ## FileStorage
//! - Disk-based persistent storage rooted at one directory
//! - Configurable buffering and write syncing
//!
//! ## MemoryStorage
//! - In-memory storage for testing and temporary stores
//! - Fast but non-persistent
//!
//! # Example
//!
//! ```
//! use retina::storage::{StorageFactory, StorageConfig};
//! use retina::storage::memory::MemoryStorageConfig;
//!
//! # fn main() -> retina::error::Result<()> {
//! let storage = StorageFactory::create(StorageConfig::Memory(MemoryStorageConfig::default()))?;
//! assert!(!storage.file_exists("features.json"));
//! # Ok(())
//! # }
//! ```

use std::io::{Read, Write};
use std::sync::Arc;

use crate::error::{Result, RetinaError};

pub mod file;
pub mod memory;

/// A trait for storage backends that can store and retrieve named blobs.
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Open an existing file for reading.
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>>;

    /// Create a file for writing, truncating any existing content.
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    /// Check if a file exists.
    fn file_exists(&self, name: &str) -> bool;

    /// Rename a file, replacing the destination if present.
    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()>;

    /// Flush any pending state to the backing medium.
    fn sync(&self) -> Result<()>;

    /// Read a whole file into memory.
    fn read_all(&self, name: &str) -> Result<Vec<u8>> {
        let mut input = self.open_input(name)?;
        let mut buffer = Vec::new();
        input.read_to_end(&mut buffer)?;
        input.close()?;
        Ok(buffer)
    }

    /// Replace a file's content atomically: write a temp file, then rename it
    /// over the destination.
    fn write_atomic(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let tmp_name = format!("{name}.tmp");
        let mut output = self.create_output(&tmp_name)?;
        output.write_all(bytes)?;
        output.flush_and_sync()?;
        output.close()?;
        self.rename_file(&tmp_name, name)
    }
}

/// Input stream for reading a stored file.
pub trait StorageInput: Read + Send + std::fmt::Debug {
    /// Close the input.
    fn close(&mut self) -> Result<()>;
}

/// Output stream for writing a stored file.
pub trait StorageOutput: Write + Send + std::fmt::Debug {
    /// Flush buffers and, where supported, sync to the medium.
    fn flush_and_sync(&mut self) -> Result<()>;

    /// Close the output, making the content visible.
    fn close(&mut self) -> Result<()>;
}

/// Storage backend selection.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    /// File-based storage.
    File(file::FileStorageConfig),

    /// In-memory storage.
    Memory(memory::MemoryStorageConfig),
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Memory(memory::MemoryStorageConfig::default())
    }
}

/// Helper for constructing concrete storage instances.
pub struct StorageFactory;

impl StorageFactory {
    /// Create a storage backend from configuration.
    pub fn create(config: StorageConfig) -> Result<Arc<dyn Storage>> {
        match config {
            StorageConfig::Memory(mem_config) => {
                Ok(Arc::new(memory::MemoryStorage::new(mem_config)))
            }
            StorageConfig::File(file_config) => {
                let path = file_config.path.clone();
                Ok(Arc::new(file::FileStorage::new(&path, file_config)?))
            }
        }
    }
}

/// Errors raised by storage backends.
#[derive(Debug, Clone)]
pub enum StorageError {
    /// File not found.
    FileNotFound(String),

    /// Underlying I/O failure.
    IoError(String),

    /// Output already closed.
    OutputClosed(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::FileNotFound(name) => write!(f, "File not found: {name}"),
            StorageError::IoError(msg) => write!(f, "I/O error: {msg}"),
            StorageError::OutputClosed(name) => write!(f, "Output already closed: {name}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<StorageError> for RetinaError {
    fn from(err: StorageError) -> Self {
        RetinaError::storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::file::FileStorageConfig;
    use crate::storage::memory::MemoryStorageConfig;

    #[test]
    fn test_storage_config_default() {
        match StorageConfig::default() {
            StorageConfig::Memory(mem_config) => {
                assert_eq!(mem_config.initial_capacity, 16);
            }
            _ => panic!("Expected Memory config"),
        }
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::FileNotFound("wal.json".to_string());
        assert_eq!(err.to_string(), "File not found: wal.json");

        let err = StorageError::IoError("disk full".to_string());
        assert_eq!(err.to_string(), "I/O error: disk full");

        let err: RetinaError = StorageError::OutputClosed("features.json".to_string()).into();
        assert_eq!(
            err.to_string(),
            "Storage error: Output already closed: features.json"
        );
    }

    #[test]
    fn test_write_atomic_replaces_content() {
        let storage = StorageFactory::create(StorageConfig::Memory(
            MemoryStorageConfig::default(),
        ))
        .unwrap();

        storage.write_atomic("snapshot.json", b"first").unwrap();
        storage.write_atomic("snapshot.json", b"second").unwrap();

        assert_eq!(storage.read_all("snapshot.json").unwrap(), b"second");
        assert!(!storage.file_exists("snapshot.json.tmp"));
    }

    #[test]
    fn test_storage_factory_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config = StorageConfig::File(FileStorageConfig::new(temp_dir.path()));
        let storage = StorageFactory::create(config).unwrap();

        storage.write_atomic("wal.json", b"[]").unwrap();
        assert!(storage.file_exists("wal.json"));
        assert!(!storage.file_exists("wal.json.tmp"));
        assert_eq!(storage.read_all("wal.json").unwrap(), b"[]");
    }
}
