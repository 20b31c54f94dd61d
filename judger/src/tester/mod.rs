//! Running a submission against a whole suite of test cases.

use std::time::Duration;

use crate::{runner::Executor, JudgeError};

use self::model::{SuiteReport, TestCase, TestCaseResult};

pub mod compare;
pub mod model;

/// Run `cases` one after another, in order.
///
/// Wrong answers do not stop the suite, but a case whose run failed
/// (compile error, crash, timeout, memory limit) does: the remaining cases
/// are skipped and the report is marked as not passed.
#[tracing::instrument(skip(executor, code, cases), fields(cases = cases.len()))]
pub async fn run_suite(
    executor: &Executor,
    code: &str,
    language: &str,
    cases: &[TestCase],
    timeout: Option<Duration>,
) -> Result<SuiteReport, JudgeError> {
    let config = executor.languages().lookup(language)?;
    let mut results = Vec::with_capacity(cases.len());

    for (index, case) in cases.iter().enumerate() {
        let exec = executor.run_with(code, config, case, timeout).await?;
        let result = TestCaseResult::from_execution(index, case, exec);
        tracing::debug!(index, verdict = ?result.verdict, "case finished");

        let stop = result.verdict.is_run_failure();
        results.push(result);
        if stop {
            tracing::info!(index, "Run failed, skipping remaining cases");
            break;
        }
    }

    let report = SuiteReport::from_results(cases.len(), results);
    tracing::info!(
        passed = report.passed_count,
        total = report.total_count,
        "Suite finished"
    );
    Ok(report)
}
