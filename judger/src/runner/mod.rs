//! Running one harnessed submission inside one sandbox.
//!
//! This module is not responsible for interpreting test suites. See
//! [`crate::tester`] for corresponding code.
//!
//! A sandbox goes through `created -> files loaded -> running`, ends as
//! completed, timed out or crashed, and is always torn down before
//! [`Executor::run`] returns.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use futures::StreamExt;

use crate::{
    config::DockerConfig,
    harness,
    lang::{LanguageConfig, LanguageRegistry, SANDBOX_WORKDIR},
    tester::model::TestCase,
    util::{tar::build_archive, AsyncTeardown},
    JudgeError,
};

use self::{
    demux::{DemuxedOutput, Demuxer, DEFAULT_OUTPUT_LIMIT},
    engine::{SandboxEngine, SandboxSpecBuilder},
    model::{classify, ExecutionResult, RunOutcome},
    registry::SandboxRegistry,
    sandbox::Sandbox,
};

pub mod demux;
pub mod docker;
pub mod engine;
pub mod image;
pub mod model;
pub mod registry;
pub mod sandbox;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Limits applied to every sandbox an [`Executor`] creates.
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// The CPU fraction allowed to use
    pub cpu_share: f64,

    pub pids_limit: i64,

    /// Cap of captured bytes per output stream
    pub output_limit: usize,

    pub user: Option<String>,

    /// How long to keep reading output after the container stopped
    pub drain_timeout: Duration,
}

impl ExecutorOptions {
    pub fn from_config(cfg: &DockerConfig) -> ExecutorOptions {
        ExecutorOptions {
            cpu_share: cfg.run_cpu_share,
            pids_limit: cfg.pids_limit,
            output_limit: cfg.output_limit_bytes,
            user: cfg.user.clone(),
            ..Default::default()
        }
    }
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        ExecutorOptions {
            cpu_share: 0.5,
            pids_limit: 64,
            output_limit: DEFAULT_OUTPUT_LIMIT,
            user: None,
            drain_timeout: Duration::from_secs(2),
        }
    }
}

/// Runs one submission against one test case in a fresh sandbox.
///
/// Runs are independent; the only shared state is the [`SandboxRegistry`].
#[derive(Clone)]
pub struct Executor {
    engine: Arc<dyn SandboxEngine>,
    languages: Arc<LanguageRegistry>,
    registry: Arc<SandboxRegistry>,
    opt: ExecutorOptions,
}

impl Executor {
    pub fn new(
        engine: Arc<dyn SandboxEngine>,
        languages: Arc<LanguageRegistry>,
        registry: Arc<SandboxRegistry>,
        opt: ExecutorOptions,
    ) -> Executor {
        Executor {
            engine,
            languages,
            registry,
            opt,
        }
    }

    pub fn engine(&self) -> &Arc<dyn SandboxEngine> {
        &self.engine
    }

    pub fn languages(&self) -> &LanguageRegistry {
        &self.languages
    }

    pub fn registry(&self) -> &Arc<SandboxRegistry> {
        &self.registry
    }

    /// Run `code` written in `language` against `case`.
    ///
    /// `timeout` defaults to the language's own. Submission failures are
    /// reported inside the returned [`ExecutionResult`]; `Err` means the
    /// judge could not run the submission at all.
    pub async fn run(
        &self,
        code: &str,
        language: &str,
        case: &TestCase,
        timeout: Option<Duration>,
    ) -> Result<ExecutionResult, JudgeError> {
        let config = self.languages.lookup(language)?;
        self.run_with(code, config, case, timeout).await
    }

    #[tracing::instrument(skip(self, code, config, case), fields(language = %config.language))]
    pub async fn run_with(
        &self,
        code: &str,
        config: &LanguageConfig,
        case: &TestCase,
        timeout: Option<Duration>,
    ) -> Result<ExecutionResult, JudgeError> {
        let timeout = timeout.unwrap_or_else(|| config.timeout());
        let files = harness::wrap(code, case, config.language);
        let archive = build_archive(&files).await?;

        let mut spec = SandboxSpecBuilder::default();
        spec.name(crate::util::names::sandbox_name())
            .image(config.sandbox_image.clone())
            .command(config.command())
            .working_dir(SANDBOX_WORKDIR)
            .memory_limit(config.memory_limit_bytes)
            .cpu_share(self.opt.cpu_share)
            .pids_limit(self.opt.pids_limit);
        if let Some(user) = &self.opt.user {
            spec.user(user.clone());
        }
        let spec = spec
            .build()
            .map_err(|e| JudgeError::Config(e.to_string()))?;

        let mut sandbox = Sandbox::create(self.engine.clone(), self.registry.clone(), &spec)
            .await
            .map_err(|e| JudgeError::infra("create", e))?;
        let compiled = config.compile_command.is_some();
        let res = self.drive(&sandbox, archive, compiled, timeout).await;
        sandbox.teardown().await;

        match &res {
            Ok(r) => tracing::debug!(status = ?r.status, elapsed = r.elapsed_millis, "run finished"),
            Err(e) => tracing::warn!("run failed: {}", e),
        }
        res
    }

    /// Load files, start, follow the output and race the sandbox against
/// `timeout`.
    async fn drive(
        &self,
        sandbox: &Sandbox,
        archive: Bytes,
        compiled: bool,
        timeout: Duration,
    ) -> Result<ExecutionResult, JudgeError> {
        let engine = sandbox.engine();
        let id = sandbox.id();

        engine
            .upload(id, SANDBOX_WORKDIR, archive)
            .await
            .map_err(|e| JudgeError::infra("upload", e))?;
        tracing::debug!(%id, "files loaded");

        let started = tokio::time::Instant::now();
        engine
            .start(id)
            .await
            .map_err(|e| JudgeError::infra("start", e))?;
        tracing::debug!(%id, "running");

        let mut output = engine
            .attach(id)
            .await
            .map_err(|e| JudgeError::infra("attach", e))?;
        let limit = self.opt.output_limit;
        let mut collector = tokio::spawn(async move {
            let mut demux = Demuxer::new(limit);
            while let Some(chunk) = output.next().await {
                match chunk {
                    Ok(chunk) => demux.push(chunk),
                    Err(e) => {
                        tracing::warn!("Output stream broke: {:#}", e);
                        break;
                    }
                }
            }
            if demux.is_truncated() {
                tracing::debug!(limit, "Output truncated");
            }
            demux.finish()
        });

        let waited = tokio::select! {
            exit = engine.wait(id) => Some(exit),
            _ = tokio::time::sleep(timeout) => None,
        };
        let elapsed_millis = started.elapsed().as_secs_f64() * 1000.0;

        let (outcome, output) = match waited {
            Some(Ok(exit)) => {
                tracing::debug!(%id, code = exit.code, oom_killed = exit.oom_killed, "completed");
                let output = match tokio::time::timeout(self.opt.drain_timeout, &mut collector)
                    .await
                {
                    Ok(Ok(output)) => output,
                    Ok(Err(e)) => {
                        tracing::warn!(%id, "Output collector failed: {}", e);
                        DemuxedOutput::default()
                    }
                    Err(_) => {
                        tracing::warn!(%id, "Output did not drain in time");
                        collector.abort();
                        DemuxedOutput::default()
                    }
                };
                let outcome = RunOutcome::Exited {
                    code: exit.code,
                    oom_killed: exit.oom_killed,
                };
                (outcome, output)
            }
            Some(Err(e)) => {
                collector.abort();
                return Err(JudgeError::infra("wait", e));
            }
            None => {
                tracing::debug!(%id, ?timeout, "timed out");
                if let Err(e) = engine.kill(id).await {
                    tracing::warn!(%id, "Failed to kill timed out sandbox: {:#}", e);
                }
                collector.abort();
                (RunOutcome::TimedOut, DemuxedOutput::default())
            }
        };

        let peak_memory_mb = match engine.peak_memory(id).await {
            Ok(bytes) => bytes.map_or(0.0, |b| b as f64 / BYTES_PER_MB),
            Err(e) => {
                tracing::warn!(%id, "Failed to read memory usage: {:#}", e);
                0.0
            }
        };

        Ok(classify(
            outcome,
            compiled,
            &output.stdout,
            &output.stderr,
            elapsed_millis,
            peak_memory_mb,
        ))
    }
}
