//! Synonym dictionary for mapping terms to their synonyms.

use std::path::Path;

use ahash::AHashMap;
use tracing::debug;

use crate::error::{Result, RetinaError};
use crate::expansion::SynonymSource;

/// In-process synonym dictionary built from synonym groups.
///
/// Every member of a group is a synonym of every other member. A term that
/// appears in several groups collects the synonyms of all of them, in group
/// order. Lookup is case-insensitive.
///
/// ```
/// use retina::expansion::SynonymSource;
/// use retina::expansion::dictionary::SynonymDictionary;
///
/// let dictionary = SynonymDictionary::from_synonym_groups(vec![
///     vec!["car".into(), "auto".into(), "automobile".into()],
/// ]);
/// assert_eq!(dictionary.synonyms("Car", 10).unwrap(), vec!["auto", "automobile"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SynonymDictionary {
    synonyms: AHashMap<String, Vec<String>>,
}

impl SynonymDictionary {
    /// Load synonym dictionary from a JSON file.
    ///
    /// The file holds an array of synonym groups:
    ///
    /// ```json
    /// [
    ///   ["car", "auto", "automobile"],
    ///   ["dog", "domestic_dog", "canis_familiaris"]
    /// ]
    /// ```
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RetinaError::storage(format!(
                "Failed to read synonym dictionary file '{}': {e}",
                path.display()
            ))
        })?;

        let groups: Vec<Vec<String>> = serde_json::from_str(&content).map_err(|e| {
            RetinaError::analysis(format!(
                "Failed to parse synonym dictionary JSON from '{}': {e}",
                path.display()
            ))
        })?;

        let dictionary = Self::from_synonym_groups(groups);
        debug!(path = %path.display(), terms = dictionary.len(), "loaded synonym dictionary");
        Ok(dictionary)
    }

    /// Build a synonym dictionary from synonym groups.
    pub fn from_synonym_groups(groups: Vec<Vec<String>>) -> Self {
        let mut synonyms: AHashMap<String, Vec<String>> = AHashMap::new();

        for group in groups {
            let members: Vec<String> = group
                .iter()
                .map(|term| term.trim().to_lowercase())
                .filter(|term| !term.is_empty())
                .collect();

            for term in &members {
                let entry = synonyms.entry(term.clone()).or_default();
                for other in &members {
                    if other != term && !entry.contains(other) {
                        entry.push(other.clone());
                    }
                }
            }
        }

        SynonymDictionary { synonyms }
    }

    /// Number of terms with an entry.
    pub fn len(&self) -> usize {
        self.synonyms.len()
    }

    /// True when no term has an entry.
    pub fn is_empty(&self) -> bool {
        self.synonyms.is_empty()
    }
}

impl SynonymSource for SynonymDictionary {
    fn synonyms(&self, word: &str, limit: usize) -> Result<Vec<String>> {
        Ok(self
            .synonyms
            .get(&word.to_lowercase())
            .map(|list| list.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}
