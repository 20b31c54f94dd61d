//! A judge that runs untrusted submissions inside Docker sandboxes, scores
//! them against test cases and estimates their time complexity.
//!
//! The entry point for callers is [`judge::Judge`]. Sandboxes are driven
//! through the [`runner::engine::SandboxEngine`] trait, implemented against the
//! Docker Engine API by [`runner::docker::DockerEngine`].

pub mod complexity;
pub mod config;
pub mod err;
pub mod harness;
pub mod judge;
pub mod lang;
pub mod runner;
pub mod tester;
pub mod util;

pub use err::JudgeError;

#[cfg(test)]
mod test;
