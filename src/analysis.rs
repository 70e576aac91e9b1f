//! Text analysis for queries and user sentences.
//!
//! - [`stop`]: English stop word list
//! - [`stemmer`]: the [`Stemmer`](stemmer::Stemmer) trait and a light suffix stripper
//! - [`parser`]: turning a raw sentence into core and excluded terms

pub mod parser;
pub mod stemmer;
pub mod stop;

pub use parser::{NegationAwareParser, ParsedQuery, SentenceParser};
pub use stemmer::{IdentityStemmer, LightStemmer, Stemmer};
pub use stop::StopWords;
