//! Stemming algorithms for reducing words to their root forms.
//!
//! Feature values are stored as the classifier and color producers spell them
//! ("dog", "car", "tree"), so query words only need their inflection removed
//! to meet them. [`LightStemmer`] strips plural and `-ing`/`-ed` endings and
//! leaves everything else alone.

/// Trait for stemming algorithms.
pub trait Stemmer: Send + Sync + std::fmt::Debug {
    /// Stem a lowercase word to its root form.
    fn stem(&self, word: &str) -> String;

    /// Get the name of this stemmer.
    fn name(&self) -> &'static str;
}

/// A stemmer that returns words unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityStemmer;

impl Stemmer for IdentityStemmer {
    fn stem(&self, word: &str) -> String {
        word.to_string()
    }

    fn name(&self) -> &'static str {
        "identity"
    }
}

/// Light English inflection stripper.
///
/// ```
/// use retina::analysis::stemmer::{LightStemmer, Stemmer};
///
/// let stemmer = LightStemmer::new();
/// assert_eq!(stemmer.stem("puppies"), "puppy");
/// assert_eq!(stemmer.stem("running"), "run");
/// assert_eq!(stemmer.stem("glass"), "glass");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct LightStemmer;

impl LightStemmer {
    /// Create a new light stemmer.
    pub fn new() -> Self {
        LightStemmer
    }

    fn strip_plural(word: &str) -> String {
        if let Some(stem) = word.strip_suffix("ies") {
            if stem.len() >= 2 {
                return format!("{stem}y");
            }
        }
        if let Some(stem) = word.strip_suffix("sses") {
            return format!("{stem}ss");
        }
        if word.ends_with("ss") || word.ends_with("us") || word.ends_with("is") {
            return word.to_string();
        }
        if let Some(stem) = word.strip_suffix("es") {
            if ["s", "x", "z", "ch", "sh"].iter().any(|end| stem.ends_with(end)) {
                return stem.to_string();
            }
        }
        if let Some(stem) = word.strip_suffix('s') {
            return stem.to_string();
        }
        word.to_string()
    }

    fn strip_verb_ending(word: &str) -> String {
        if word.ends_with("eed") {
            return word.to_string();
        }
        let stem = word
            .strip_suffix("ing")
            .or_else(|| word.strip_suffix("ed"));
        match stem {
            Some(stem) if stem.chars().count() >= 3 && has_vowel(stem) => undouble(stem),
            _ => word.to_string(),
        }
    }
}

impl Stemmer for LightStemmer {
    fn stem(&self, word: &str) -> String {
        if word.chars().count() <= 3 || !word.chars().all(char::is_alphabetic) {
            return word.to_string();
        }
        let word = Self::strip_plural(word);
        Self::strip_verb_ending(&word)
    }

    fn name(&self) -> &'static str {
        "light"
    }
}

fn has_vowel(word: &str) -> bool {
    word.chars().any(|c| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y'))
}

/// `runn` -> `run`, but `fall` and `kiss` keep their double letter.
fn undouble(stem: &str) -> String {
    let chars: Vec<char> = stem.chars().collect();
    match chars.as_slice() {
        [.., a, b] if a == b && !matches!(*a, 'l' | 's' | 'z' | 'a' | 'e' | 'i' | 'o' | 'u') => {
            chars[..chars.len() - 1].iter().collect()
        }
        _ => stem.to_string(),
    }
}
