use err_derive::Error;
use std::fmt::Debug;

/// Errors that stop the judge itself from proceeding.
///
/// A failing submission (compile error, crash, timeout) is *not* an error;
/// those are reported inside [`crate::runner::model::ExecutionResult`].
#[derive(Debug, Error)]
pub enum JudgeError {
    #[error(display = "Unsupported language: {}", _0)]
    UnsupportedLanguage(String),

    #[error(display = "Sandbox infrastructure error: {}", _0)]
    Infrastructure(String),

    #[error(display = "Configuration error: {}", _0)]
    Config(String),

    #[error(display = "IO error: {}", _0)]
    Io(#[error(source)] std::io::Error),
}

impl JudgeError {
    /// Wrap an engine failure that happened during `stage`.
    pub fn infra(stage: &str, e: impl Into<anyhow::Error>) -> JudgeError {
        JudgeError::Infrastructure(format!("{}: {:#}", stage, e.into()))
    }

    /// Whether retrying the same call might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, JudgeError::Infrastructure(_) | JudgeError::Io(_))
    }
}
