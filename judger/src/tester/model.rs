use serde::{self, Deserialize, Serialize};
use serde_json::Value;

use crate::{
    runner::model::{ExecutionResult, ExecutionStatus},
    tester::compare::compare_output,
    util::round2,
};

/// One test case, as supplied by the problem store.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    /// Arguments passed to `solution`, in order.
    pub input: Vec<Value>,
    #[serde(alias = "expected")]
    pub expected_output: Value,
}

impl TestCase {
    pub fn new(input: Vec<Value>, expected_output: Value) -> TestCase {
        TestCase {
            input,
            expected_output,
        }
    }
}

/// Verdict of a single test case.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Verdict {
    Accepted,
    WrongAnswer,
    CompileError,
    RuntimeError,
    TimeLimitExceeded,
    MemoryLimitExceeded,
}

impl Verdict {
    /// Whether the run itself failed, as opposed to producing a wrong answer.
    pub fn is_run_failure(self) -> bool {
        !matches!(self, Verdict::Accepted | Verdict::WrongAnswer)
    }
}

impl From<ExecutionStatus> for Verdict {
    fn from(status: ExecutionStatus) -> Self {
        match status {
            ExecutionStatus::Ok => Verdict::Accepted,
            ExecutionStatus::CompileError => Verdict::CompileError,
            ExecutionStatus::RuntimeError => Verdict::RuntimeError,
            ExecutionStatus::TimeLimitExceeded => Verdict::TimeLimitExceeded,
            ExecutionStatus::MemoryLimitExceeded => Verdict::MemoryLimitExceeded,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseResult {
    /// Position of the case in the submitted suite.
    pub index: usize,
    pub input: Vec<Value>,
    pub expected_output: Value,
    pub actual_output: Option<String>,
    pub passed: bool,
    pub verdict: Verdict,
    pub elapsed_millis: f64,
    pub peak_memory_mb: f64,
    pub error_message: Option<String>,
}

impl TestCaseResult {
    pub fn from_execution(index: usize, case: &TestCase, exec: ExecutionResult) -> Self {
        let verdict = match (&exec.raw_output, exec.success) {
            (Some(out), true) if compare_output(out, &case.expected_output) => Verdict::Accepted,
            (_, true) => Verdict::WrongAnswer,
            (_, false) => exec.status.into(),
        };
        TestCaseResult {
            index,
            input: case.input.clone(),
            expected_output: case.expected_output.clone(),
            actual_output: exec.raw_output,
            passed: verdict == Verdict::Accepted,
            verdict,
            elapsed_millis: exec.elapsed_millis,
            peak_memory_mb: exec.peak_memory_mb,
            error_message: exec.error_message,
        }
    }
}

/// Aggregate over one suite run.
///
/// `results` may be shorter than `total_count` when the run stopped early;
/// such a report is never `all_passed`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SuiteReport {
    pub all_passed: bool,
    pub passed_count: usize,
    pub total_count: usize,
    pub total_elapsed_millis: f64,
    pub max_memory_mb: f64,
    pub results: Vec<TestCaseResult>,
}

impl SuiteReport {
    pub fn from_results(total_count: usize, results: Vec<TestCaseResult>) -> SuiteReport {
        let passed_count = results.iter().filter(|r| r.passed).count();
        let total_elapsed_millis = round2(results.iter().map(|r| r.elapsed_millis).sum());
        let max_memory_mb = results
            .iter()
            .map(|r| r.peak_memory_mb)
            .fold(0f64, f64::max);
        SuiteReport {
            all_passed: results.len() == total_count && passed_count == total_count,
            passed_count,
            total_count,
            total_elapsed_millis,
            max_memory_mb,
            results,
        }
    }

    /// Whether some test cases were not run.
    pub fn is_truncated(&self) -> bool {
        self.results.len() < self.total_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn exec_ok(out: &str) -> ExecutionResult {
        ExecutionResult::success(out.into(), 12.5, 3.0)
    }

    #[test]
    fn grades_execution_results() {
        let case = TestCase::new(vec![json!([1, 2])], json!([2, 1]));

        let r = TestCaseResult::from_execution(0, &case, exec_ok("[2, 1]"));
        assert!(r.passed);
        assert_eq!(r.verdict, Verdict::Accepted);

        let r = TestCaseResult::from_execution(1, &case, exec_ok("[1, 2]"));
        assert!(!r.passed);
        assert_eq!(r.verdict, Verdict::WrongAnswer);
        assert!(!r.verdict.is_run_failure());

        let r = TestCaseResult::from_execution(
            2,
            &case,
            ExecutionResult::failure(
                ExecutionStatus::TimeLimitExceeded,
                "Time Limit Exceeded".into(),
                100.0,
                0.0,
            ),
        );
        assert_eq!(r.verdict, Verdict::TimeLimitExceeded);
        assert!(r.verdict.is_run_failure());
        assert_eq!(r.error_message.as_deref(), Some("Time Limit Exceeded"));
    }

    #[test]
    fn empty_suite_passes_and_truncated_suite_does_not() {
        let empty = SuiteReport::from_results(0, vec![]);
        assert!(empty.all_passed);
        assert!(!empty.is_truncated());

        let case = TestCase::new(vec![], json!(1));
        let one = TestCaseResult::from_execution(0, &case, exec_ok("1"));
        let report = SuiteReport::from_results(2, vec![one]);
        assert!(!report.all_passed);
        assert!(report.is_truncated());
        assert_eq!(report.passed_count, 1);
    }

    #[test]
    fn deserializes_camel_case_and_alias() {
        let case: TestCase =
            serde_json::from_str(r#"{"input": [[1,2,3]], "expectedOutput": [3,2,1]}"#).unwrap();
        assert_eq!(case.expected_output, json!([3, 2, 1]));
        let case: TestCase = serde_json::from_str(r#"{"input": [1], "expected": 1}"#).unwrap();
        assert_eq!(case.expected_output, json!(1));
    }
}
