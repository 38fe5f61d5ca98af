//! Forward estimation of per-position category probabilities.
//!
//! At position `i > 0` the mass of category `c` is
//!
//! ```text
//! sum over p in categories(word[i-1]) of  P(c | p) * prefix * P(word[i] | c)
//! ```
//!
//! where `prefix` is `start(word[0], p)` for the first transition and, after
//! that, the unnormalized total mass of the previous position. The prefix is
//! a single scalar rather than a vector indexed by the previous category;
//! outputs depend on this, so it is kept as is.

use std::io;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, trace};

use crate::corpus::{Corpus, LookupError};

/// One `(word, category, probability)` entry of a position's table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbabilityCell {
    pub word: String,
    pub category: String,
    pub probability: f64,
}

/// Normalized probability table for one word position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResult {
    pub position: usize,
    pub cells: Vec<ProbabilityCell>,
}

impl StepResult {
    pub fn word(&self) -> Option<&str> {
        self.cells.first().map(|c| c.word.as_str())
    }

    pub fn total(&self) -> f64 {
        self.cells.iter().map(|c| c.probability).sum()
    }

    pub fn probability_of(&self, category: &str) -> Option<f64> {
        self.cells
            .iter()
            .find(|c| c.category == category)
            .map(|c| c.probability)
    }
}

/// A single `bigram * prefix * lexical` term, recorded in verbose mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contribution {
    pub position: usize,
    pub word: String,
    pub category: String,
    pub previous_word: String,
    pub previous_category: String,
    /// Words before `position`, for display.
    pub prefix: Vec<String>,
    pub bigram: f64,
    pub prefix_mass: f64,
    pub lexical: f64,
    pub value: f64,
}

/// Everything produced by one estimation call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForwardRun {
    /// Unnormalized start probabilities of the first word.
    pub start: StepResult,
    /// One table per word after the first.
    pub steps: Vec<StepResult>,
    /// Empty unless the estimator is verbose.
    pub trace: Vec<Contribution>,
}

#[derive(Debug, Error)]
pub enum EstimateError {
    #[error("cannot estimate an empty sentence")]
    EmptySentence,
    #[error(transparent)]
    Lookup(#[from] LookupError),
    #[error("total forward mass is zero at position {position} ({word:?})")]
    ZeroMass { position: usize, word: String },
    #[error("failed to report progress: {0}")]
    Observer(#[from] io::Error),
}

/// Receives results as the recursion produces them, so a failing run has
/// already delivered everything computed before the failure.
///
/// `start_table` and `contribution` are only called by a verbose estimator.
pub trait ForwardObserver {
    fn start_table(&mut self, _table: &StepResult) -> io::Result<()> {
        Ok(())
    }

    fn contribution(&mut self, _term: &Contribution) -> io::Result<()> {
        Ok(())
    }

    fn step(&mut self, _step: &StepResult) -> io::Result<()> {
        Ok(())
    }
}

impl ForwardObserver for () {}

pub struct ForwardEstimator<'a> {
    corpus: &'a Corpus,
    verbose: bool,
}

struct PositionMass {
    cells: Vec<ProbabilityCell>,
    total: f64,
}

impl<'a> ForwardEstimator<'a> {
    pub fn new(corpus: &'a Corpus) -> Self {
        Self {
            corpus,
            verbose: false,
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Normalized tables for every position after the first.
    pub fn estimate<S: AsRef<str>>(
        &self,
        sentence: &[S],
    ) -> Result<Vec<StepResult>, EstimateError> {
        self.run(sentence).map(|run| run.steps)
    }

    pub fn run<S: AsRef<str>>(&self, sentence: &[S]) -> Result<ForwardRun, EstimateError> {
        self.run_observed(sentence, &mut ())
    }

    /// Same as [`ForwardEstimator::run`], handing each start table, term and
    /// position table to `observer` as soon as it is computed.
    pub fn run_observed<S, O>(
        &self,
        sentence: &[S],
        observer: &mut O,
    ) -> Result<ForwardRun, EstimateError>
    where
        S: AsRef<str>,
        O: ForwardObserver + ?Sized,
    {
        let words: Vec<&str> = sentence.iter().map(AsRef::as_ref).collect();
        let Some(&first) = words.first() else {
            return Err(EstimateError::EmptySentence);
        };

        let start = self.start_table(first)?;
        if self.verbose {
            observer.start_table(&start)?;
        }
        let mut steps = Vec::with_capacity(words.len().saturating_sub(1));
        let mut trace = Vec::new();
        let mut carried_mass = 0.0;

        for position in 1..words.len() {
            let prefix_mass = |previous_category: &str| -> f64 {
                if position == 1 {
                    start
                        .probability_of(previous_category)
                        .unwrap_or_default()
                } else {
                    carried_mass
                }
            };
            let mass =
                self.position_mass(&words, position, prefix_mass, &mut trace, observer)?;
            if mass.total == 0.0 {
                return Err(EstimateError::ZeroMass {
                    position,
                    word: words[position].to_string(),
                });
            }

            let step = normalize(position, mass.cells, mass.total);
            debug!(
                "position {position} ({}): total mass {:e}",
                words[position], mass.total
            );
            observer.step(&step)?;
            carried_mass = mass.total;
            steps.push(step);
        }

        Ok(ForwardRun {
            start,
            steps,
            trace,
        })
    }

    fn start_table(&self, word: &str) -> Result<StepResult, LookupError> {
        let cells = self
            .corpus
            .categories_for(word)?
            .into_iter()
            .map(|category| {
                Ok(ProbabilityCell {
                    word: word.to_string(),
                    category: category.to_string(),
                    probability: self.corpus.start_probability(word, category)?,
                })
            })
            .collect::<Result<Vec<_>, LookupError>>()?;
        Ok(StepResult { position: 0, cells })
    }

    /// Unnormalized mass of each candidate category at `position`.
    fn position_mass<F, O>(
        &self,
        words: &[&str],
        position: usize,
        prefix_mass: F,
        contributions: &mut Vec<Contribution>,
        observer: &mut O,
    ) -> Result<PositionMass, EstimateError>
    where
        F: Fn(&str) -> f64,
        O: ForwardObserver + ?Sized,
    {
        let word = words[position];
        let previous_word = words[position - 1];
        let previous_categories = self.corpus.categories_for(previous_word)?;

        let mut cells = Vec::new();
        for category in self.corpus.categories_for(word)? {
            let lexical = self.corpus.lexical_probability(word, category)?;
            let mut category_mass = 0.0;
            for &previous_category in &previous_categories {
                let bigram = self.corpus.bigram_probability(previous_category, category)?;
                let prefix = prefix_mass(previous_category);
                let value = bigram * prefix * lexical;
                trace!(
                    "P({word}|{category} {previous_word}|{previous_category}) = {bigram}*{prefix}*{lexical} = {value}"
                );
                if self.verbose {
                    let term = Contribution {
                        position,
                        word: word.to_string(),
                        category: category.to_string(),
                        previous_word: previous_word.to_string(),
                        previous_category: previous_category.to_string(),
                        prefix: words[..position].iter().map(|w| w.to_string()).collect(),
                        bigram,
                        prefix_mass: prefix,
                        lexical,
                        value,
                    };
                    observer.contribution(&term)?;
                    contributions.push(term);
                }
                category_mass += value;
            }
            cells.push(ProbabilityCell {
                word: word.to_string(),
                category: category.to_string(),
                probability: category_mass,
            });
        }

        let total = cells.iter().map(|c| c.probability).sum();
        Ok(PositionMass { cells, total })
    }
}

fn normalize(position: usize, cells: Vec<ProbabilityCell>, total: f64) -> StepResult {
    let cells = cells
        .into_iter()
        .map(|cell| ProbabilityCell {
            probability: cell.probability / total,
            ..cell
        })
        .collect();
    StepResult { position, cells }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CORPUS: &str = r#"{
        "category_word_counts": {
            "the": {"ART": 2},
            "flies": {"N": 4, "V": 2},
            "like": {"N": 1, "V": 6},
            "flower": {"N": 5, "V": 1},
            "total": {"ART": 10, "N": 20, "V": 10}
        },
        "word_pair_count": {
            "ART": {"empty": 3},
            "N": {"empty": 1, "ART": 6, "N": 2, "V": 4},
            "V": {"empty": 1, "N": 5, "V": 1}
        },
        "total_counts": {"empty": 5, "ART": 8, "N": 10, "V": 8}
    }"#;

    fn corpus() -> Corpus {
        Corpus::from_json_str(CORPUS).expect("parse corpus")
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn first_transition_uses_start_probabilities() {
        let corpus = corpus();
        let run = ForwardEstimator::new(&corpus)
            .run(&["the", "flies"])
            .unwrap();
        assert!(close(run.start.probability_of("ART").unwrap(), 0.12));
        assert_eq!(run.steps.len(), 1);
        let step = &run.steps[0];
        assert_eq!(step.position, 1);
        assert_eq!(step.word(), Some("flies"));
        assert!(close(step.probability_of("N").unwrap(), 1.0));
        assert_eq!(step.probability_of("V"), Some(0.0));
    }

    #[test]
    fn later_positions_use_previous_total_mass() {
        let corpus = corpus();
        let steps = ForwardEstimator::new(&corpus)
            .estimate(&["the", "flies", "like"])
            .unwrap();
        // N: 0.05 * (0.2 + 0.5), V: 0.6 * (0.5 + 0.125), scaled by the same prefix.
        let like = &steps[1];
        assert!(close(like.probability_of("N").unwrap(), 0.035 / 0.41));
        assert!(close(like.probability_of("V").unwrap(), 0.375 / 0.41));
        assert!(close(like.total(), 1.0));
    }

    #[test]
    fn verbose_records_every_contribution() {
        let corpus = corpus();
        let quiet = ForwardEstimator::new(&corpus)
            .run(&["the", "flies", "like"])
            .unwrap();
        assert!(quiet.trace.is_empty());

        let run = ForwardEstimator::new(&corpus)
            .verbose(true)
            .run(&["the", "flies", "like"])
            .unwrap();
        // 2 candidates x 1 predecessor, then 2 x 2.
        assert_eq!(run.trace.len(), 6);
        let first = &run.trace[0];
        assert_eq!(first.previous_category, "ART");
        assert!(close(first.value, 0.75 * 0.12 * 0.2));
        let last = &run.trace[5];
        assert_eq!(last.prefix, vec!["the", "flies"]);
        assert!(close(last.prefix_mass, 0.018));
        assert_eq!(run.steps, quiet.steps);
    }

    #[test]
    fn zero_mass_is_fatal() {
        let corpus = corpus();
        let err = ForwardEstimator::new(&corpus)
            .estimate(&["the", "the"])
            .unwrap_err();
        assert!(matches!(
            err,
            EstimateError::ZeroMass { position: 1, ref word } if word == "the"
        ));
    }

    #[test]
    fn unknown_words_fail_lookup() {
        let corpus = corpus();
        let estimator = ForwardEstimator::new(&corpus);
        assert!(matches!(
            estimator.estimate(&["the", "bananas"]),
            Err(EstimateError::Lookup(LookupError::UnknownWord(ref w))) if w == "bananas"
        ));
        assert!(matches!(
            estimator.estimate(&["a", "flies"]),
            Err(EstimateError::Lookup(LookupError::UnknownWord(_)))
        ));
    }

    #[test]
    fn short_sentences() {
        let corpus = corpus();
        let estimator = ForwardEstimator::new(&corpus);
        let empty: [&str; 0] = [];
        assert!(matches!(
            estimator.run(&empty),
            Err(EstimateError::EmptySentence)
        ));
        let run = estimator.run(&["the"]).unwrap();
        assert!(run.steps.is_empty());
        assert_eq!(run.start.cells.len(), 1);
    }
}
