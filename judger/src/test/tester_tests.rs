//! Suite-level behavior: ordering, scoring and short-circuiting.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use test_env_log::test;

use super::util::{embedded_args, executor, MockEngine, MockRun};
use crate::{
    harness::SourceFiles,
    tester::{
        self,
        model::{TestCase, Verdict},
    },
};

fn reverse_cases() -> Vec<TestCase> {
    vec![
        TestCase::new(vec![json!([1, 2, 3])], json!([3, 2, 1])),
        TestCase::new(vec![json!([])], json!([])),
        TestCase::new(vec![json!(["a", "b"])], json!(["b", "a"])),
    ]
}

/// Plays the sandbox: reads the arguments the harness embedded and prints
/// the reversed first one, as a correct submission would.
fn reverse_list(files: &SourceFiles) -> MockRun {
    let args = if let Some(src) = files.get("solution.py") {
        embedded_args(src, "_conquer_json.loads(")
    } else if let Some(src) = files.get("solution.js") {
        embedded_args(src, "JSON.parse(")
    } else {
        return MockRun::exits(1).stderr("unexpected sources");
    };
    let mut list = match args.into_iter().next() {
        Some(Value::Array(list)) => list,
        _ => return MockRun::exits(1).stderr("bad arguments"),
    };
    list.reverse();
    MockRun::prints(Value::Array(list).to_string())
}

#[test(tokio::test)]
async fn test_reverse_list_in_two_languages() {
    let submissions = [
        ("python", "def solution(nums):\n    return nums[::-1]\n"),
        (
            "javascript",
            "function solution(nums) {\n  return [...nums].reverse();\n}\n",
        ),
    ];
    for (lang, code) in submissions.iter() {
        let engine = Arc::new(MockEngine::new(reverse_list));
        let exec = executor(engine.clone());

        let report = tester::run_suite(&exec, code, lang, &reverse_cases(), None)
            .await
            .unwrap();
        assert!(report.all_passed, "{}: {:#?}", lang, report);
        assert_eq!(report.passed_count, 3);
        assert_eq!(report.total_count, 3);
        assert!(report
            .results
            .iter()
            .all(|r| r.verdict == Verdict::Accepted));
        assert_eq!(engine.created().len(), 3);
        assert_eq!(engine.live(), 0);
    }
}

#[test(tokio::test)]
async fn test_wrong_answer_keeps_going() {
    let engine = Arc::new(MockEngine::script(vec![
        MockRun::prints("1"),
        MockRun::prints("2"),
        MockRun::prints("99"),
        MockRun::prints("4"),
        MockRun::prints("5"),
    ]));
    let exec = executor(engine);
    let cases = (1..=5)
        .map(|i| TestCase::new(vec![json!(i)], json!(i)))
        .collect::<Vec<_>>();

    let report = tester::run_suite(&exec, "def solution(x):\n    return x\n", "python", &cases, None)
        .await
        .unwrap();
    assert!(!report.all_passed);
    assert_eq!(report.passed_count, 4);
    assert_eq!(report.total_count, 5);
    assert_eq!(
        report.results.iter().map(|r| r.index).collect::<Vec<_>>(),
        vec![0, 1, 2, 3, 4]
    );
    assert_eq!(
        report.results.iter().map(|r| r.verdict).collect::<Vec<_>>(),
        vec![
            Verdict::Accepted,
            Verdict::Accepted,
            Verdict::WrongAnswer,
            Verdict::Accepted,
            Verdict::Accepted,
        ]
    );
    let wrong = &report.results[2];
    assert!(!wrong.passed);
    assert_eq!(wrong.actual_output.as_deref(), Some("99"));
    assert_eq!(wrong.expected_output, json!(3));
}

#[test(tokio::test)]
async fn test_crash_stops_the_suite() {
    let engine = Arc::new(MockEngine::script(vec![
        MockRun::prints("1"),
        MockRun::exits(1).stderr("IndexError: list index out of range"),
        MockRun::prints("3"),
    ]));
    let exec = executor(engine.clone());
    let cases = (1..=3)
        .map(|i| TestCase::new(vec![json!(i)], json!(i)))
        .collect::<Vec<_>>();

    let report = tester::run_suite(&exec, "def solution(x):\n    return x\n", "python", &cases, None)
        .await
        .unwrap();
    assert!(!report.all_passed);
    assert_eq!(report.results.len(), 2);
    assert!(report.is_truncated());
    assert_eq!(report.results[1].verdict, Verdict::RuntimeError);
    assert!(report.results[1]
        .error_message
        .as_deref()
        .unwrap()
        .contains("IndexError"));
    assert_eq!(engine.created().len(), 2);
}

#[test(tokio::test)]
async fn test_structural_comparison() {
    let engine = Arc::new(MockEngine::script(vec![
        MockRun::prints("{\"b\": [1, 2.0], \"a\": true}"),
        MockRun::prints("hello"),
    ]));
    let exec = executor(engine);
    let cases = vec![
        TestCase::new(vec![json!(0)], json!({"a": true, "b": [1, 2]})),
        TestCase::new(vec![json!(1)], json!("hello")),
    ];
    let report = tester::run_suite(&exec, "def solution(x):\n    pass\n", "python", &cases, None)
        .await
        .unwrap();
    assert!(report.all_passed, "{:#?}", report);
}

#[test(tokio::test)]
async fn test_empty_suite_passes() {
    let engine = Arc::new(MockEngine::always(MockRun::prints("")));
    let exec = executor(engine.clone());
    let report = tester::run_suite(&exec, "", "go", &[], None).await.unwrap();
    assert!(report.all_passed);
    assert_eq!(report.total_count, 0);
    assert!(engine.created().is_empty());
}
