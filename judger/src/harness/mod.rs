//! Generation of runnable programs from a submission and one test case.
//!
//! The submitted code defines a callable named `solution`. Each language has a
//! [`Harness`] that appends the code needed to build the test case's arguments,
//! call `solution` with them and print the return value as one line of JSON.
//!
//! Generation is pure: the same submission and test case always produce the
//! same files.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::{lang::Language, tester::model::TestCase};

mod cpp;
mod go;
mod java;
mod javascript;
pub mod literal;
mod python;

pub use cpp::CppHarness;
pub use go::GoHarness;
pub use java::JavaHarness;
pub use javascript::JavaScriptHarness;
pub use python::PythonHarness;

/// Generated files, keyed by file name relative to the sandbox work dir.
pub type SourceFiles = BTreeMap<String, String>;

/// Per-language wrapper generation strategy.
pub trait Harness: Send + Sync {
    fn language(&self) -> Language;

    /// Produce the complete program that runs `code` against `args`.
    fn generate(&self, code: &str, args: &[Value]) -> SourceFiles;
}

pub fn harness_for(language: Language) -> &'static dyn Harness {
    match language {
        Language::Python => &PythonHarness,
        Language::JavaScript => &JavaScriptHarness,
        Language::Java => &JavaHarness,
        Language::Cpp => &CppHarness,
        Language::Go => &GoHarness,
    }
}

/// Wrap `code` into a complete program fed with `case`'s input.
pub fn wrap(code: &str, case: &TestCase, language: Language) -> SourceFiles {
    harness_for(language).generate(code, &case.input)
}

/// Serialize `args` as the text of a JSON array.
pub(crate) fn args_json(args: &[Value]) -> String {
    Value::Array(args.to_vec()).to_string()
}
