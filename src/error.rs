//! Error types for the Retina library.
//!
//! Every fallible operation returns [`Result`], whose error side is the
//! [`RetinaError`] enum. Recoverable conditions of the retrieval core (a failed
//! producer, a malformed feature row, an unreachable synonym source, an empty
//! result) are reported inside the returned values instead; only genuine
//! infrastructure failures surface as errors.
//!
//! # Examples
//!
//! ```
//! use retina::error::{RetinaError, Result};
//!
//! fn example_operation() -> Result<()> {
//!     Err(RetinaError::invalid_argument("Invalid input"))
//! }
//!
//! match example_operation() {
//!     Ok(_) => println!("Success"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::io;

use thiserror::Error;

/// The main error type for Retina operations.
#[derive(Error, Debug)]
pub enum RetinaError {
    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A produced feature row failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// A feature producer failed for one image
    #[error("Producer error: {0}")]
    Producer(String),

    /// Analysis-related errors (parsing, stemming, synonym lookup)
    #[error("Analysis error: {0}")]
    Analysis(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for operations that may fail with RetinaError.
pub type Result<T> = std::result::Result<T, RetinaError>;

impl RetinaError {
    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        RetinaError::Storage(msg.into())
    }

    /// Create a new configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        RetinaError::Config(msg.into())
    }

    /// Create a new validation error.
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        RetinaError::Validation(msg.into())
    }

    /// Create a new producer error.
    pub fn producer<S: Into<String>>(msg: S) -> Self {
        RetinaError::Producer(msg.into())
    }

    /// Create a new analysis error.
    pub fn analysis<S: Into<String>>(msg: S) -> Self {
        RetinaError::Analysis(msg.into())
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        RetinaError::Other(format!("Invalid argument: {}", msg.into()))
    }

    /// Create a new internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        RetinaError::Other(format!("Internal error: {}", msg.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = RetinaError::storage("Test storage error");
        assert_eq!(error.to_string(), "Storage error: Test storage error");

        let error = RetinaError::validation("probability is NaN");
        assert_eq!(error.to_string(), "Validation error: probability is NaN");

        let error = RetinaError::invalid_argument("empty batch");
        assert_eq!(error.to_string(), "Error: Invalid argument: empty batch");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let retina_error = RetinaError::from(io_error);

        match retina_error {
            RetinaError::Io(_) => {}
            _ => panic!("Expected IO error variant"),
        }
    }
}
