use serde::{Deserialize, Serialize};

use crate::{lang::COMPILE_FAILURE_EXIT_CODE, util::round2};

pub const TIME_LIMIT_EXCEEDED: &str = "Time Limit Exceeded";
pub const MEMORY_LIMIT_EXCEEDED: &str = "Memory Limit Exceeded";

/// How a sandboxed run ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum ExecutionStatus {
    Ok,
    CompileError,
    RuntimeError,
    TimeLimitExceeded,
    MemoryLimitExceeded,
}

/// The outcome of running one harness in one sandbox.
///
/// A failing submission is still an `ExecutionResult`; only judge-side
/// failures are reported as errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    pub status: ExecutionStatus,
    /// Trimmed stdout, present on success.
    pub raw_output: Option<String>,
    pub elapsed_millis: f64,
    pub peak_memory_mb: f64,
    pub error_message: Option<String>,
}

impl ExecutionResult {
    pub fn success(raw_output: String, elapsed_millis: f64, peak_memory_mb: f64) -> Self {
        ExecutionResult {
            success: true,
            status: ExecutionStatus::Ok,
            raw_output: Some(raw_output),
            elapsed_millis: round2(elapsed_millis),
            peak_memory_mb: round2(peak_memory_mb),
            error_message: None,
        }
    }

    pub fn failure(
        status: ExecutionStatus,
        error_message: String,
        elapsed_millis: f64,
        peak_memory_mb: f64,
    ) -> Self {
        ExecutionResult {
            success: false,
            status,
            raw_output: None,
            elapsed_millis: round2(elapsed_millis),
            peak_memory_mb: round2(peak_memory_mb),
            error_message: Some(error_message),
        }
    }
}

/// What the executor observed once the race between the container and the
/// timer resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Exited { code: i64, oom_killed: bool },
    TimedOut,
}

/// Turn an observed outcome and the collected output into a result.
///
/// `compiled` tells whether the entry command had a compile step; only then
/// does [`COMPILE_FAILURE_EXIT_CODE`] mean a compile error.
pub fn classify(
    outcome: RunOutcome,
    compiled: bool,
    stdout: &str,
    stderr: &str,
    elapsed_millis: f64,
    peak_memory_mb: f64,
) -> ExecutionResult {
    let combined = || {
        let stdout = stdout.trim();
        let stderr = stderr.trim();
        match (stderr.is_empty(), stdout.is_empty()) {
            (true, _) => stdout.to_owned(),
            (false, true) => stderr.to_owned(),
            (false, false) => format!("{}\n{}", stderr, stdout),
        }
    };

    let fail = |status, msg| ExecutionResult::failure(status, msg, elapsed_millis, peak_memory_mb);
    match outcome {
        RunOutcome::TimedOut => fail(
            ExecutionStatus::TimeLimitExceeded,
            TIME_LIMIT_EXCEEDED.into(),
        ),
        RunOutcome::Exited {
            oom_killed: true, ..
        } => fail(
            ExecutionStatus::MemoryLimitExceeded,
            MEMORY_LIMIT_EXCEEDED.into(),
        ),
        RunOutcome::Exited { code: 0, .. } => {
            ExecutionResult::success(stdout.trim().to_owned(), elapsed_millis, peak_memory_mb)
        }
        RunOutcome::Exited { code, .. } if compiled && code == COMPILE_FAILURE_EXIT_CODE => {
            fail(ExecutionStatus::CompileError, combined())
        }
        RunOutcome::Exited { code, .. } => {
            let msg = combined();
            let msg = if msg.is_empty() {
                format!("Process exited with code {}", code)
            } else {
                msg
            };
            fail(ExecutionStatus::RuntimeError, msg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn zero_exit_is_success_with_trimmed_stdout() {
        let r = classify(
            RunOutcome::Exited {
                code: 0,
                oom_killed: false,
            },
            false,
            "  [3,2,1]\n",
            "warning: something",
            12.3456,
            7.891,
        );
        assert!(r.success);
        assert_eq!(r.status, ExecutionStatus::Ok);
        assert_eq!(r.raw_output.as_deref(), Some("[3,2,1]"));
        assert_eq!(r.elapsed_millis, 12.35);
        assert_eq!(r.peak_memory_mb, 7.89);
        assert_eq!(r.error_message, None);
    }

    #[test]
    fn nonzero_exit_reports_output() {
        let r = classify(
            RunOutcome::Exited {
                code: 1,
                oom_killed: false,
            },
            false,
            "partial",
            "Traceback: boom\n",
            1.0,
            0.0,
        );
        assert!(!r.success);
        assert_eq!(r.status, ExecutionStatus::RuntimeError);
        assert_eq!(r.error_message.as_deref(), Some("Traceback: boom\npartial"));
        assert_eq!(r.raw_output, None);

        let r = classify(
            RunOutcome::Exited {
                code: 139,
                oom_killed: false,
            },
            false,
            "",
            "",
            1.0,
            0.0,
        );
        assert_eq!(
            r.error_message.as_deref(),
            Some("Process exited with code 139")
        );
    }

    #[test]
    fn special_outcomes() {
        let r = classify(
            RunOutcome::Exited {
                code: COMPILE_FAILURE_EXIT_CODE,
                oom_killed: false,
            },
            true,
            "",
            "Main.java:3: error: ';' expected",
            1.0,
            0.0,
        );
        assert_eq!(r.status, ExecutionStatus::CompileError);
        assert!(r.error_message.unwrap().contains("';' expected"));

        let r = classify(
            RunOutcome::Exited {
                code: 137,
                oom_killed: true,
            },
            false,
            "",
            "",
            1.0,
            256.0,
        );
        assert_eq!(r.status, ExecutionStatus::MemoryLimitExceeded);
        assert_eq!(r.error_message.as_deref(), Some(MEMORY_LIMIT_EXCEEDED));

        let r = classify(RunOutcome::TimedOut, false, "half", "", 2000.0, 0.0);
        assert_eq!(r.status, ExecutionStatus::TimeLimitExceeded);
        assert_eq!(r.error_message.as_deref(), Some(TIME_LIMIT_EXCEEDED));
        assert_eq!(r.raw_output, None);
    }

    #[test]
    fn compile_exit_code_needs_a_compile_step() {
        let outcome = RunOutcome::Exited {
            code: COMPILE_FAILURE_EXIT_CODE,
            oom_killed: false,
        };
        let r = classify(outcome.clone(), false, "", "bye", 1.0, 0.0);
        assert_eq!(r.status, ExecutionStatus::RuntimeError);
        assert_eq!(r.error_message.as_deref(), Some("bye"));

        let r = classify(outcome, true, "", "bye", 1.0, 0.0);
        assert_eq!(r.status, ExecutionStatus::CompileError);
    }
}
