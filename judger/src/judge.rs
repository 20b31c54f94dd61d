//! The judge's public surface: run a suite, analyze complexity, or execute a
//! single case.

use std::{sync::Arc, time::Duration};

use crate::{
    complexity::{self, AnalysisOptions, ComplexityReport},
    config::JudgerConfig,
    lang::LanguageRegistry,
    runner::{
        engine::SandboxEngine, model::ExecutionResult, registry::SandboxRegistry, Executor,
        ExecutorOptions,
    },
    tester::{
        self,
        model::{SuiteReport, TestCase},
    },
    JudgeError,
};

#[derive(Clone)]
pub struct Judge {
    executor: Executor,
    analysis: AnalysisOptions,
}

impl Judge {
    pub fn new(executor: Executor, analysis: AnalysisOptions) -> Judge {
        Judge { executor, analysis }
    }

    /// Assemble a judge from the startup configuration.
    ///
    /// `registry` is shared with whoever sweeps sandboxes on shutdown.
    pub fn from_config(
        engine: Arc<dyn SandboxEngine>,
        registry: Arc<SandboxRegistry>,
        cfg: &JudgerConfig,
    ) -> Judge {
        let executor = Executor::new(
            engine,
            Arc::new(LanguageRegistry::from_config(cfg)),
            registry,
            ExecutorOptions::from_config(&cfg.docker),
        );
        Judge::new(executor, AnalysisOptions::from(&cfg.analysis))
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn registry(&self) -> &Arc<SandboxRegistry> {
        self.executor.registry()
    }

    /// Judge `code` against every case in `cases`. Used both for full
    /// submissions and for runs on visible cases only.
    pub async fn run_suite(
        &self,
        code: &str,
        language: &str,
        cases: &[TestCase],
        timeout: Option<Duration>,
    ) -> Result<SuiteReport, JudgeError> {
        tester::run_suite(&self.executor, code, language, cases, timeout).await
    }

    /// Estimate the time complexity of `code`. Callers should treat a
    /// failure here as non-fatal to the submission.
    pub async fn analyze(
        &self,
        code: &str,
        language: &str,
        cases: &[TestCase],
    ) -> Result<ComplexityReport, JudgeError> {
        complexity::analyze(&self.executor, code, language, cases, &self.analysis).await
    }

    pub async fn execute_single(
        &self,
        code: &str,
        language: &str,
        case: &TestCase,
        timeout: Option<Duration>,
    ) -> Result<ExecutionResult, JudgeError> {
        self.executor.run(code, language, case, timeout).await
    }
}
