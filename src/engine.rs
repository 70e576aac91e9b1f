//! The retrieval engine: one handle over the store and every component.
//!
//! # Examples
//!
//! ```
//! use retina::engine::RetrievalEngine;
//! use retina::feature::{FeatureRow, FeatureType};
//!
//! # fn main() -> retina::error::Result<()> {
//! let engine = RetrievalEngine::in_memory()?;
//! engine.store().insert_batch(vec![
//!     FeatureRow::new("A.jpg", FeatureType::ImageClassification, "dog", 0.9),
//!     FeatureRow::new("B.jpg", FeatureType::ImageClassification, "cat", 0.8),
//! ])?;
//!
//! let results = engine.search("a dog", None)?;
//! assert_eq!(results.hits[0].filename, "A.jpg");
//! assert_eq!(results.core_terms, vec!["dog"]);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::aggregator::producer::{FeatureProducer, FileInfoProducer, SidecarProducer};
use crate::aggregator::{FeatureAggregator, IngestReport};
use crate::analysis::{NegationAwareParser, SentenceParser};
use crate::annotation::{AnnotationIndexer, AnnotationOutcome};
use crate::config::RetinaConfig;
use crate::error::Result;
use crate::expansion::dictionary::SynonymDictionary;
use crate::expansion::{NoSynonyms, SynonymSource, TermExpander};
use crate::feedback::{Feedback, FeedbackEngine, FeedbackOutcome};
use crate::storage::file::FileStorageConfig;
use crate::storage::memory::MemoryStorageConfig;
use crate::storage::{Storage, StorageConfig, StorageFactory};
use crate::store::{FeatureStore, StoreStats};
use crate::vsm::{ScoredImage, VectorSpaceModel};

/// Ranked hits plus the terms the query was reduced to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    /// Images by descending score.
    pub hits: Vec<ScoredImage>,
    /// Terms parsed from the query.
    pub core_terms: Vec<String>,
    /// Synonyms added to the query.
    pub expanded_terms: Vec<String>,
    /// Negated terms. Reported only; ranking does not filter on them.
    pub excluded_terms: Vec<String>,
}

/// Builds a [`RetrievalEngine`] with custom collaborators.
#[derive(Debug)]
pub struct RetrievalEngineBuilder {
    config: RetinaConfig,
    storage: Option<Arc<dyn Storage>>,
    producers: Option<Vec<Arc<dyn FeatureProducer>>>,
    synonyms: Option<Arc<dyn SynonymSource>>,
    parser: Option<Arc<dyn SentenceParser>>,
}

impl RetrievalEngineBuilder {
    /// Store state in `storage` instead of the configured location.
    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Replace the default sidecar and file-info producers.
    pub fn producers(mut self, producers: Vec<Arc<dyn FeatureProducer>>) -> Self {
        self.producers = Some(producers);
        self
    }

    /// Use `synonyms` instead of the configured dictionary.
    pub fn synonyms(mut self, synonyms: Arc<dyn SynonymSource>) -> Self {
        self.synonyms = Some(synonyms);
        self
    }

    /// Use `parser` instead of the negation-aware default.
    pub fn parser(mut self, parser: Arc<dyn SentenceParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn build(self) -> Result<RetrievalEngine> {
        let config = self.config;
        config.validate()?;

        let storage = match self.storage {
            Some(storage) => storage,
            None => StorageFactory::create(match &config.store.path {
                Some(path) => StorageConfig::File(FileStorageConfig::new(path)),
                None => StorageConfig::Memory(MemoryStorageConfig::default()),
            })?,
        };
        let store = Arc::new(FeatureStore::open(storage, &config.store)?);

        let synonyms: Arc<dyn SynonymSource> = match self.synonyms {
            Some(synonyms) => synonyms,
            None => match &config.expansion.dictionary_path {
                Some(path) => Arc::new(SynonymDictionary::load_from_file(path)?),
                None => Arc::new(NoSynonyms),
            },
        };

        let parser: Arc<dyn SentenceParser> = self
            .parser
            .unwrap_or_else(|| Arc::new(NegationAwareParser::default()));

        let producers = self.producers.unwrap_or_else(|| {
            vec![
                Arc::new(SidecarProducer::new()) as Arc<dyn FeatureProducer>,
                Arc::new(FileInfoProducer::new()),
            ]
        });

        let aggregator = FeatureAggregator::new(config.aggregator.clone(), producers)?
            .with_synonyms(Arc::clone(&synonyms));
        let expander = TermExpander::new(synonyms, config.expansion.synonym_limit);
        let model = VectorSpaceModel::new(config.ranking.clone())?;
        let feedback = FeedbackEngine::new(config.feedback.clone(), Arc::clone(&parser))?;
        let annotations = AnnotationIndexer::with_defaults(config.annotation.clone())?;

        debug!(
            threads = aggregator.thread_count(),
            rows = store.len(),
            "retrieval engine ready"
        );

        Ok(RetrievalEngine {
            config,
            store,
            parser,
            expander,
            model,
            aggregator,
            feedback,
            annotations,
        })
    }
}

/// Indexes images and answers natural-language queries against them.
#[derive(Debug)]
pub struct RetrievalEngine {
    config: RetinaConfig,
    store: Arc<FeatureStore>,
    parser: Arc<dyn SentenceParser>,
    expander: TermExpander,
    model: VectorSpaceModel,
    aggregator: FeatureAggregator,
    feedback: FeedbackEngine,
    annotations: AnnotationIndexer,
}

impl RetrievalEngine {
    pub fn builder(config: RetinaConfig) -> RetrievalEngineBuilder {
        RetrievalEngineBuilder {
            config,
            storage: None,
            producers: None,
            synonyms: None,
            parser: None,
        }
    }

    /// Open an engine with default collaborators.
    pub fn open(config: RetinaConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    /// An engine over a fresh in-memory store.
    pub fn in_memory() -> Result<Self> {
        Self::open(RetinaConfig::default())
    }

    pub fn config(&self) -> &RetinaConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<FeatureStore> {
        &self.store
    }

    /// Rank indexed images against `query`.
    ///
    /// A query without core terms returns no hits.
    pub fn search(&self, query: &str, limit: Option<usize>) -> Result<SearchResults> {
        let parsed = self.parser.parse(query);
        let mut results = SearchResults {
            core_terms: parsed.core_terms.iter().cloned().collect(),
            excluded_terms: parsed.excluded_terms.iter().cloned().collect(),
            ..SearchResults::default()
        };
        if parsed.is_empty() {
            debug!(query, "query has no core terms");
            return Ok(results);
        }

        let terms = self.expander.expand(&parsed.core_terms);
        results.expanded_terms = terms.expansions();

        let candidates = self.store.select_candidates(terms.texts());
        let rows = self.store.select_features(&candidates);
        results.hits = self.model.rank_with_limit(&rows, &terms, limit);

        info!(
            query,
            terms = terms.len(),
            candidates = candidates.len(),
            hits = results.hits.len(),
            "search completed"
        );
        Ok(results)
    }

    /// Extract and index features for `filenames`.
    pub fn ingest_batch<I, S>(&self, filenames: I) -> Result<IngestReport>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.aggregator.ingest_batch(&self.store, filenames)
    }

    /// Apply a relevance judgement for one result of `query`.
    pub fn apply_feedback(
        &self,
        filename: &str,
        query: &str,
        feedback: Feedback,
    ) -> Result<FeedbackOutcome> {
        self.feedback
            .apply_feedback(&self.store, filename, query, feedback)
    }

    /// Record a user sentence about an image.
    pub fn annotate(&self, filename: &str, sentence: &str) -> Result<AnnotationOutcome> {
        self.annotations.annotate(&self.store, filename, sentence)
    }

    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    /// Write a snapshot of the store.
    pub fn flush(&self) -> Result<()> {
        self.store.flush()
    }
}
