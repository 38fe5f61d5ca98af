use std::io::{self, Write};

use crate::forward::{Contribution, ForwardObserver, ForwardRun, ProbabilityCell, StepResult};

/// Destination for formatted result lines.
pub trait ResultSink {
    fn line(&mut self, line: &str) -> io::Result<()>;
}

/// Writes each line, newline-terminated, to the wrapped writer.
pub struct WriterSink<W: Write> {
    writer: W,
}

impl<W: Write> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ResultSink for WriterSink<W> {
    fn line(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.writer, "{line}")
    }
}

impl ResultSink for Vec<String> {
    fn line(&mut self, line: &str) -> io::Result<()> {
        self.push(line.to_string());
        Ok(())
    }
}

/// Round the exact binary value to `places` decimals, ties to even.
pub fn round_to(value: f64, places: usize) -> f64 {
    format!("{value:.places$}").parse().unwrap_or(value)
}

/// `<word> (<category>): <probability to 3 decimals>`
pub fn format_cell(cell: &ProbabilityCell) -> String {
    format!(
        "{} ({}): {:?}",
        cell.word,
        cell.category,
        round_to(cell.probability, 3)
    )
}

pub fn format_step(step: &StepResult) -> Vec<String> {
    step.cells.iter().map(format_cell).collect()
}

/// Two-line rendering of one forward term: the factorization, then its values.
pub fn format_contribution(term: &Contribution) -> [String; 2] {
    [
        format!(
            "P({w}|{c} {pw}|{pc})=P({c}|{pc})*P({prefix})*P({w}|{c})",
            w = term.word,
            c = term.category,
            pw = term.previous_word,
            pc = term.previous_category,
            prefix = term.prefix.join(" "),
        ),
        format!(
            "{:?}*{:?}*{:?} = {:?}",
            round_to(term.bigram, 5),
            round_to(term.prefix_mass, 5),
            round_to(term.lexical, 5),
            term.value
        ),
    ]
}

pub struct Reporter<S: ResultSink> {
    sink: S,
}

impl<S: ResultSink> Reporter<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Emit every step in position order, cells in table order.
    pub fn report_steps(&mut self, steps: &[StepResult]) -> io::Result<()> {
        for step in steps {
            for line in format_step(step) {
                self.sink.line(&line)?;
            }
        }
        Ok(())
    }

    /// Replay a finished run. A verbose run prints its start table first and
    /// each position's terms right before that position's table.
    pub fn report_run(&mut self, run: &ForwardRun) -> io::Result<()> {
        if !run.trace.is_empty() {
            self.start_table(&run.start)?;
        }
        for step in &run.steps {
            for term in run.trace.iter().filter(|t| t.position == step.position) {
                self.contribution(term)?;
            }
            self.step(step)?;
        }
        Ok(())
    }
}

impl<S: ResultSink> ForwardObserver for Reporter<S> {
    fn start_table(&mut self, table: &StepResult) -> io::Result<()> {
        self.report_steps(std::slice::from_ref(table))
    }

    fn contribution(&mut self, term: &Contribution) -> io::Result<()> {
        for line in format_contribution(term) {
            self.sink.line(&line)?;
        }
        Ok(())
    }

    fn step(&mut self, step: &StepResult) -> io::Result<()> {
        self.report_steps(std::slice::from_ref(step))
    }
}
