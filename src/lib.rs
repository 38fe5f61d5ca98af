pub mod corpus;
pub mod forward;
pub mod report;

pub use corpus::{Corpus, CorpusError, LookupError, START_CATEGORY, TOTAL_ENTRY};
pub use forward::{
    Contribution, EstimateError, ForwardEstimator, ForwardObserver, ForwardRun, ProbabilityCell,
    StepResult,
};
pub use report::{Reporter, ResultSink, WriterSink, format_cell, format_contribution};
