use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lexforward::{Corpus, ForwardEstimator, Reporter, WriterSink};

const DEFAULT_CORPUS: &str = "corpus.json";
const DEFAULT_SENTENCE: [&str; 4] = ["the", "flies", "like", "flower"];

#[derive(Parser, Debug)]
#[command(name = "lexforward")]
#[command(about = "Per-word lexical category probabilities via the forward algorithm")]
struct Config {
    /// Words of the sentence to tag.
    sentence: Vec<String>,
    /// JSON corpus with category_word_counts, word_pair_count and total_counts.
    #[arg(long, env = "CORPUS_PATH", default_value = DEFAULT_CORPUS)]
    corpus: PathBuf,
    /// Print the start table and every forward term before the results.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
    /// Emit the run as JSON instead of text lines.
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::parse();
    let sentence = if config.sentence.is_empty() {
        DEFAULT_SENTENCE.iter().map(|w| w.to_string()).collect()
    } else {
        config.sentence
    };
    info!("using corpus at {}", config.corpus.display());

    let start = Instant::now();
    let corpus = Corpus::load(&config.corpus)
        .with_context(|| format!("loading corpus from {}", config.corpus.display()))?;
    info!("corpus loaded in {} ms", start.elapsed().as_millis());

    let estimator = ForwardEstimator::new(&corpus).verbose(config.verbose);
    let context = || format!("estimating \"{}\"", sentence.join(" "));
    let mut out = io::stdout().lock();
    if config.json {
        let run = estimator.run(sentence.as_slice()).with_context(context)?;
        serde_json::to_writer_pretty(&mut out, &run)?;
        writeln!(out)?;
    } else {
        // Lines reach stdout as each position finishes, even if a later one fails.
        let mut reporter = Reporter::new(WriterSink::new(out));
        estimator
            .run_observed(sentence.as_slice(), &mut reporter)
            .with_context(context)?;
    }
    Ok(())
}

/// Logs go to stderr; `RUST_LOG` directives apply as given, default `info`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}
