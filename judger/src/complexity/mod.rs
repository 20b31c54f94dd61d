//! Empirical estimation of a submission's time complexity.
//!
//! The submission is timed on a bounded sample of the suite, and the
//! (input size, elapsed time) pairs are fitted against a fixed set of
//! growth-rate models. The result is a heuristic with a confidence score,
//! not a proof.

use serde_json::Value;

use crate::{config::AnalysisConfig, runner::Executor, tester::model::TestCase, JudgeError};

pub use self::fit::{fit, Complexity, ComplexityReport, Measurement, ModelFit};

pub mod fit;

#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    /// How many leading test cases are timed
    pub max_samples: usize,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        AnalysisOptions { max_samples: 10 }
    }
}

impl From<&AnalysisConfig> for AnalysisOptions {
    fn from(cfg: &AnalysisConfig) -> Self {
        AnalysisOptions {
            max_samples: cfg.max_samples,
        }
    }
}

/// Size of a test case's input: the length of the first argument if it is a
/// sequence or text, otherwise 1.
pub fn input_size(case: &TestCase) -> usize {
    match case.input.first() {
        Some(Value::Array(items)) => items.len(),
        Some(Value::String(s)) => s.chars().count(),
        _ => 1,
    }
}

/// Time `code` on the first cases of `cases` and fit the samples.
///
/// Only an unsupported language fails the analysis. Runs that fail, including
/// infrastructure errors, are skipped; if too few remain, the report is
/// [`Complexity::Unknown`].
#[tracing::instrument(skip(executor, code, cases, opt), fields(cases = cases.len()))]
pub async fn analyze(
    executor: &Executor,
    code: &str,
    language: &str,
    cases: &[TestCase],
    opt: &AnalysisOptions,
) -> Result<ComplexityReport, JudgeError> {
    let config = executor.languages().lookup(language)?;

    let mut measurements = Vec::new();
    for (index, case) in cases.iter().take(opt.max_samples).enumerate() {
        match executor.run_with(code, config, case, None).await {
            Ok(res) if res.success => {
                measurements.push(Measurement::new(input_size(case), res.elapsed_millis))
            }
            Ok(res) => {
                tracing::debug!(index, status = ?res.status, "Sample run failed, skipping")
            }
            Err(e) => tracing::warn!(index, "Sample run errored, skipping: {}", e),
        }
    }

    let report = fit(measurements);
    tracing::info!(
        complexity = %report.complexity,
        confidence = report.confidence,
        samples = report.measurements.len(),
        "Analysis finished"
    );
    Ok(report)
}
