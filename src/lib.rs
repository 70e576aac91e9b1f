//! # Retina
//!
//! A weighted-feature image retrieval engine with relevance feedback.
//!
//! ## Features
//!
//! - Images indexed by weighted features (classification labels, colors,
//!   metadata, user sentences)
//! - Two-phase candidate selection and cosine ranking in a vector space model
//! - Synonym expansion of query terms
//! - Concurrent per-image feature extraction with per-batch failure reports
//! - Relevance feedback on stored probabilities
//! - Pluggable storage backends with a write-ahead log

pub mod aggregator;
pub mod analysis;
pub mod annotation;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod expansion;
pub mod feature;
pub mod feedback;
pub mod storage;
pub mod store;
pub mod vsm;

pub mod prelude {
    pub use crate::aggregator::{FeatureAggregator, IngestReport};
    pub use crate::config::RetinaConfig;
    pub use crate::engine::{RetrievalEngine, SearchResults};
    pub use crate::error::{Result, RetinaError};
    pub use crate::expansion::{QueryTerms, TermRole};
    pub use crate::feature::{FeatureRow, FeatureType, RawFeature};
    pub use crate::feedback::Feedback;
    pub use crate::store::FeatureStore;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
