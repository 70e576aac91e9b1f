//! Query term expansion.
//!
//! [`TermExpander::expand`] turns the core words of a query into a set of
//! [`QueryTerm`]s: every input word tagged [`TermRole::Core`] plus up to
//! `limit` synonyms per word tagged [`TermRole::Expansion`]. A word that is
//! both typed by the user and a synonym of another typed word stays Core.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use retina::expansion::{TermExpander, TermRole};
//! use retina::expansion::dictionary::SynonymDictionary;
//!
//! let dictionary = SynonymDictionary::from_synonym_groups(vec![
//!     vec!["car".into(), "auto".into()],
//!     vec!["red".into(), "crimson".into()],
//! ]);
//! let expander = TermExpander::new(Arc::new(dictionary), 10);
//! let terms = expander.expand(["car", "red"]);
//!
//! assert_eq!(terms.role("car"), Some(TermRole::Core));
//! assert_eq!(terms.role("auto"), Some(TermRole::Expansion));
//! assert_eq!(terms.len(), 4);
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

pub mod dictionary;

/// Lexical collaborator that supplies synonyms.
pub trait SynonymSource: Send + Sync + std::fmt::Debug {
    /// At most `limit` synonyms of `word`, in a deterministic order.
    fn synonyms(&self, word: &str, limit: usize) -> Result<Vec<String>>;
}

/// A source that never expands.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSynonyms;

impl SynonymSource for NoSynonyms {
    fn synonyms(&self, _word: &str, _limit: usize) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Where a query term came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TermRole {
    /// Typed by the user.
    Core,
    /// Derived from a synonym lookup.
    Expansion,
}

/// One term of an expanded query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryTerm {
    pub text: String,
    pub role: TermRole,
}

/// A deduplicated set of query terms, ordered by text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryTerms {
    terms: BTreeMap<String, TermRole>,
}

impl QueryTerms {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every word tagged Core, without expansion.
    pub fn from_core<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut terms = Self::new();
        for word in words {
            terms.insert(word.as_ref(), TermRole::Core);
        }
        terms
    }

    /// Add a term. Core wins over Expansion; empty text is ignored.
    pub fn insert(&mut self, text: &str, role: TermRole) {
        if text.is_empty() {
            return;
        }
        self.terms
            .entry(text.to_string())
            .and_modify(|existing| {
                if role == TermRole::Core {
                    *existing = TermRole::Core;
                }
            })
            .or_insert(role);
    }

    /// Role of `text`, if present.
    pub fn role(&self, text: &str) -> Option<TermRole> {
        self.terms.get(text).copied()
    }

    /// True when `text` is a Core term.
    pub fn is_core(&self, text: &str) -> bool {
        self.role(text) == Some(TermRole::Core)
    }

    /// Terms and roles in text order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, TermRole)> {
        self.terms.iter().map(|(text, role)| (text.as_str(), *role))
    }

    /// Term texts in order.
    pub fn texts(&self) -> impl Iterator<Item = &str> {
        self.terms.keys().map(String::as_str)
    }

    /// Core term texts in order.
    pub fn core(&self) -> Vec<String> {
        self.with_role(TermRole::Core)
    }

    /// Expansion term texts in order.
    pub fn expansions(&self) -> Vec<String> {
        self.with_role(TermRole::Expansion)
    }

    /// Owned [`QueryTerm`]s in text order.
    pub fn to_terms(&self) -> Vec<QueryTerm> {
        self.iter()
            .map(|(text, role)| QueryTerm {
                text: text.to_string(),
                role,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    fn with_role(&self, wanted: TermRole) -> Vec<String> {
        self.terms
            .iter()
            .filter(|(_, role)| **role == wanted)
            .map(|(text, _)| text.clone())
            .collect()
    }
}

/// Expands query words with synonyms.
#[derive(Debug, Clone)]
pub struct TermExpander {
    source: Arc<dyn SynonymSource>,
    limit: usize,
}

impl TermExpander {
    /// Create an expander looking up at most `limit` synonyms per word.
    pub fn new(source: Arc<dyn SynonymSource>, limit: usize) -> Self {
        TermExpander { source, limit }
    }

    /// An expander that only tags words Core.
    pub fn core_only() -> Self {
        Self::new(Arc::new(NoSynonyms), 0)
    }

    /// Synonyms looked up per word.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Tag `words` Core and add their synonyms as Expansion terms.
    ///
    /// A failing synonym source degrades to Core-only terms.
    pub fn expand<I, S>(&self, words: I) -> QueryTerms
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words: Vec<String> = words
            .into_iter()
            .map(|word| word.as_ref().to_string())
            .collect();
        let mut terms = QueryTerms::from_core(&words);

        for word in &words {
            match self.source.synonyms(word, self.limit) {
                Ok(synonyms) => {
                    for synonym in synonyms {
                        let synonym = synonym.to_lowercase();
                        if synonym != *word {
                            terms.insert(&synonym, TermRole::Expansion);
                        }
                    }
                }
                Err(e) => {
                    warn!(word = %word, error = %e, "synonym lookup failed; using core terms only");
                    return QueryTerms::from_core(&words);
                }
            }
        }

        debug!(
            core = words.len(),
            expanded = terms.len() - terms.core().len(),
            "expanded query terms"
        );
        terms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RetinaError;
    use crate::expansion::dictionary::SynonymDictionary;

    #[derive(Debug)]
    struct Unavailable;

    impl SynonymSource for Unavailable {
        fn synonyms(&self, _word: &str, _limit: usize) -> Result<Vec<String>> {
            Err(RetinaError::analysis("lexical database unavailable"))
        }
    }

    fn dictionary() -> Arc<SynonymDictionary> {
        Arc::new(SynonymDictionary::from_synonym_groups(vec![
            vec!["car".into(), "auto".into(), "automobile".into(), "machine".into()],
            vec!["red".into(), "crimson".into(), "Cherry".into()],
            vec!["tree".into(), "car".into()],
        ]))
    }

    #[test]
    fn test_core_wins_over_expansion() {
        let expander = TermExpander::new(dictionary(), 10);
        let terms = expander.expand(["car", "tree"]);

        assert!(terms.is_core("car"));
        assert!(terms.is_core("tree"));
        assert_eq!(terms.role("auto"), Some(TermRole::Expansion));
        assert_eq!(terms.core(), vec!["car", "tree"]);
    }

    #[test]
    fn test_limit_bounds_synonyms_per_word() {
        let expander = TermExpander::new(dictionary(), 2);
        let terms = expander.expand(["car"]);

        assert_eq!(terms.expansions(), vec!["auto", "automobile"]);
    }

    #[test]
    fn test_synonyms_are_lowercased() {
        let expander = TermExpander::new(dictionary(), 10);
        let terms = expander.expand(["red"]);

        assert_eq!(terms.expansions(), vec!["cherry", "crimson"]);
    }

    #[test]
    fn test_deterministic() {
        let expander = TermExpander::new(dictionary(), 10);
        assert_eq!(expander.expand(["car", "red"]), expander.expand(["red", "car"]));
    }

    #[test]
    fn test_failing_source_degrades_to_core() {
        let expander = TermExpander::new(Arc::new(Unavailable), 10);
        let terms = expander.expand(["car", "red"]);

        assert_eq!(terms.core(), vec!["car", "red"]);
        assert!(terms.expansions().is_empty());
    }

    #[test]
    fn test_core_only_and_empty_input() {
        let terms = TermExpander::core_only().expand(["dog"]);
        assert_eq!(terms.to_terms(), vec![QueryTerm {
            text: "dog".to_string(),
            role: TermRole::Core,
        }]);

        assert!(TermExpander::new(dictionary(), 10).expand(Vec::<String>::new()).is_empty());
    }
}
