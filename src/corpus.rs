use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

/// Pseudo-category marking the start of a sentence.
pub const START_CATEGORY: &str = "empty";
/// Reserved key in `category_word_counts` holding per-category word totals.
pub const TOTAL_ENTRY: &str = "total";

type Counts = IndexMap<String, f64>;

/// Read-only count tables estimated from a tagged corpus.
///
/// Maps keep document order, so candidate categories for a word come back
/// in the order the corpus file lists them.
#[derive(Debug, Clone, Deserialize)]
pub struct Corpus {
    /// word -> category -> count, plus the `total` entry.
    category_word_counts: IndexMap<String, Counts>,
    /// current category -> preceding category -> count.
    word_pair_count: IndexMap<String, Counts>,
    /// preceding category -> number of bigrams it starts.
    total_counts: Counts,
}

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("failed to read corpus: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse corpus: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("corpus has no `total` entry in category_word_counts")]
    MissingTotal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("word not in corpus: {0}")]
    UnknownWord(String),
    #[error("word {word:?} is never tagged {category}")]
    UnknownCategory { word: String, category: String },
    #[error("no word total recorded for category {0}")]
    MissingCategoryTotal(String),
    #[error("no bigram total recorded for preceding category {0}")]
    MissingBigramTotal(String),
    #[error("no bigram counts recorded for category {0}")]
    UnknownTransitionTarget(String),
}

impl Corpus {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CorpusError> {
        let path_ref = path.as_ref();
        let file = File::open(path_ref)?;
        let corpus = Self::from_reader(BufReader::new(file))?;
        info!(
            "loaded corpus from {} ({} words)",
            path_ref.display(),
            corpus.word_count()
        );
        Ok(corpus)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, CorpusError> {
        let corpus: Corpus = serde_json::from_reader(reader)?;
        corpus.validate()
    }

    pub fn from_json_str(raw: &str) -> Result<Self, CorpusError> {
        let corpus: Corpus = serde_json::from_str(raw)?;
        corpus.validate()
    }

    fn validate(self) -> Result<Self, CorpusError> {
        if !self.category_word_counts.contains_key(TOTAL_ENTRY) {
            return Err(CorpusError::MissingTotal);
        }
        debug!(
            "corpus has {} transition targets and {} bigram totals",
            self.word_pair_count.len(),
            self.total_counts.len()
        );
        Ok(self)
    }

    /// Number of distinct words, not counting the `total` entry.
    pub fn word_count(&self) -> usize {
        self.category_word_counts
            .keys()
            .filter(|k| k.as_str() != TOTAL_ENTRY)
            .count()
    }

    pub fn contains_word(&self, word: &str) -> bool {
        word != TOTAL_ENTRY && self.category_word_counts.contains_key(word)
    }

    /// Categories the corpus has seen `word` tagged with.
    pub fn categories_for(&self, word: &str) -> Result<Vec<&str>, LookupError> {
        Ok(self.word_counts(word)?.keys().map(String::as_str).collect())
    }

    /// P(word | category): count of `word` tagged `category` over all words
    /// tagged `category`.
    pub fn lexical_probability(&self, word: &str, category: &str) -> Result<f64, LookupError> {
        let count = self
            .word_counts(word)?
            .get(category)
            .ok_or_else(|| LookupError::UnknownCategory {
                word: word.to_string(),
                category: category.to_string(),
            })?;
        let total = self
            .category_word_counts
            .get(TOTAL_ENTRY)
            .and_then(|totals| totals.get(category))
            .ok_or_else(|| LookupError::MissingCategoryTotal(category.to_string()))?;
        Ok(count / total)
    }

    /// P(current | preceding). An unseen pair is an explicit zero.
    pub fn bigram_probability(&self, preceding: &str, current: &str) -> Result<f64, LookupError> {
        let pairs = self
            .word_pair_count
            .get(current)
            .ok_or_else(|| LookupError::UnknownTransitionTarget(current.to_string()))?;
        let Some(count) = pairs.get(preceding) else {
            return Ok(0.0);
        };
        let total = self
            .total_counts
            .get(preceding)
            .ok_or_else(|| LookupError::MissingBigramTotal(preceding.to_string()))?;
        Ok(count / total)
    }

    /// Probability of a sentence opening with `word` tagged `category`.
    pub fn start_probability(&self, word: &str, category: &str) -> Result<f64, LookupError> {
        Ok(self.lexical_probability(word, category)?
            * self.bigram_probability(START_CATEGORY, category)?)
    }

    fn word_counts(&self, word: &str) -> Result<&Counts, LookupError> {
        if word == TOTAL_ENTRY {
            return Err(LookupError::UnknownWord(word.to_string()));
        }
        self.category_word_counts
            .get(word)
            .ok_or_else(|| LookupError::UnknownWord(word.to_string()))
    }
}
