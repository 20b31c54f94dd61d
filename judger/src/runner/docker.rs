//! [`SandboxEngine`] implementation on the Docker Engine API.

use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use bollard::{
    container::{
        Config, CreateContainerOptions, InspectContainerOptions, KillContainerOptions,
        ListContainersOptions, LogOutput, LogsOptions, RemoveContainerOptions,
        StartContainerOptions, StatsOptions, UploadToContainerOptions, WaitContainerOptions,
    },
    models::HostConfig,
    Docker,
};
use bytes::Bytes;
use futures::{future, StreamExt};

use super::{
    demux::{OutputChunk, StreamFrame, StreamKind},
    engine::{ExitState, OutputStream, SandboxEngine, SandboxSpec, SANDBOX_LABEL},
};

/// CFS scheduler period used for CPU quotas, in microseconds.
const CPU_PERIOD: i64 = 100_000;

#[derive(Debug, Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    pub fn new(docker: Docker) -> DockerEngine {
        DockerEngine { docker }
    }

    /// Connect through the local socket or `DOCKER_HOST`.
    pub fn connect() -> anyhow::Result<DockerEngine> {
        let docker =
            Docker::connect_with_local_defaults().context("Failed to connect to docker")?;
        Ok(DockerEngine::new(docker))
    }

    pub fn docker(&self) -> &Docker {
        &self.docker
    }

    /// Remove sandbox containers left behind by a previous process. Returns
    /// the number removed.
    pub async fn cleanup_orphans(&self) -> anyhow::Result<usize> {
        let mut filters = HashMap::new();
        filters.insert(
            "label".to_owned(),
            vec![format!("{}=true", SANDBOX_LABEL)],
        );
        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters,
                ..Default::default()
            }))
            .await
            .context("Failed to list containers")?;

        let mut removed = 0;
        for id in containers.into_iter().filter_map(|c| c.id) {
            match self.remove(&id).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(%id, "Failed to remove orphaned sandbox: {:#}", e),
            }
        }
        Ok(removed)
    }
}

/// Errors on a response stream that only spoil one message, not the stream.
pub(crate) fn is_recoverable_error(e: &bollard::errors::Error) -> bool {
    matches!(
        e,
        bollard::errors::Error::JsonDataError { .. }
            | bollard::errors::Error::JsonSerdeError { .. }
            | bollard::errors::Error::StrParseError { .. }
    )
}

fn host_config(spec: &SandboxSpec) -> HostConfig {
    HostConfig {
        // set memory limits
        memory: Some(spec.memory_limit),
        memory_swap: Some(spec.memory_limit),
        // set cpu limits
        cpu_period: Some(CPU_PERIOD),
        cpu_quota: Some((spec.cpu_share * CPU_PERIOD as f64).floor() as i64),
        pids_limit: Some(spec.pids_limit),
        network_mode: if spec.network_enabled {
            None
        } else {
            Some("none".into())
        },
        cap_drop: Some(vec!["ALL".into()]),
        security_opt: Some(vec!["no-new-privileges".into()]),
        ..Default::default()
    }
}

fn to_chunk(output: LogOutput) -> Option<OutputChunk> {
    let frame = |kind, payload: Bytes| Some(OutputChunk::Frame(StreamFrame { kind, payload }));
    match output {
        LogOutput::StdOut { message } => frame(StreamKind::Stdout, message),
        LogOutput::StdErr { message } => frame(StreamKind::Stderr, message),
        LogOutput::StdIn { .. } => None,
        LogOutput::Console { message } => Some(OutputChunk::Raw(message)),
    }
}

#[async_trait]
impl SandboxEngine for DockerEngine {
    fn name(&self) -> &str {
        "docker"
    }

    async fn create(&self, spec: &SandboxSpec) -> anyhow::Result<String> {
        let mut labels = spec.labels.clone();
        labels.insert(SANDBOX_LABEL.into(), "true".into());

        let res = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: spec.name.clone(),
                }),
                Config {
                    image: Some(spec.image.clone()),
                    cmd: Some(spec.command.clone()),
                    working_dir: Some(spec.working_dir.clone()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    tty: Some(false),
                    // set docker user
                    user: spec.user.clone(),
                    labels: Some(labels),
                    // Set network availability
                    network_disabled: Some(!spec.network_enabled),
                    host_config: Some(host_config(spec)),
                    ..Default::default()
                },
            )
            .await?;
        Ok(res.id)
    }

    async fn upload(&self, id: &str, path: &str, archive: Bytes) -> anyhow::Result<()> {
        self.docker
            .upload_to_container(
                id,
                Some(UploadToContainerOptions {
                    path,
                    no_overwrite_dir_non_dir: "false",
                }),
                hyper::Body::from(archive),
            )
            .await?;
        Ok(())
    }

    async fn attach(&self, id: &str) -> anyhow::Result<OutputStream> {
        let output = self
            .docker
            .logs(
                id,
                Some(LogsOptions::<String> {
                    follow: true,
                    stdout: true,
                    stderr: true,
                    ..Default::default()
                }),
            )
            .filter_map(|v| {
                future::ready(match v {
                    Ok(out) => to_chunk(out).map(Ok),
                    Err(e) if is_recoverable_error(&e) => None,
                    Err(e) => Some(Err(e.into())),
                })
            });
        Ok(output.boxed())
    }

    async fn start(&self, id: &str) -> anyhow::Result<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn wait(&self, id: &str) -> anyhow::Result<ExitState> {
        let mut wait = Box::pin(self.docker.wait_container(
            id,
            Some(WaitContainerOptions {
                condition: "not-running",
            }),
        ));
        // Non-zero exits may surface as errors here; the exit code is read
        // from the container state below either way.
        let waited = wait.next().await;
        drop(wait);

        let info = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await?;
        let state = info.state.unwrap_or_default();
        match (state.running, state.exit_code, waited) {
            (Some(true), _, Some(Err(e))) => Err(e.into()),
            (Some(true), _, _) => Err(anyhow::anyhow!("container is still running")),
            (_, Some(code), _) => Ok(ExitState {
                code,
                oom_killed: state.oom_killed.unwrap_or(false),
            }),
            (_, None, Some(Err(e))) => Err(e.into()),
            (_, None, _) => Err(anyhow::anyhow!("container reported no exit code")),
        }
    }

    async fn peak_memory(&self, id: &str) -> anyhow::Result<Option<u64>> {
        let mut stats = Box::pin(self.docker.stats(
            id,
            Some(StatsOptions {
                stream: false,
                ..Default::default()
            }),
        ));
        match stats.next().await {
            Some(stats) => {
                let mem = stats?.memory_stats;
                Ok(mem.max_usage.or(mem.usage).filter(|x| *x > 0))
            }
            None => Ok(None),
        }
    }

    async fn kill(&self, id: &str) -> anyhow::Result<()> {
        self.docker
            .kill_container(id, None::<KillContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> anyhow::Result<()> {
        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_config_applies_limits() {
        let spec = crate::runner::engine::SandboxSpecBuilder::default()
            .name("conquer-test-0")
            .image("conquer-judge/python:latest")
            .command(vec!["sh".to_owned(), "-c".to_owned(), "true".to_owned()])
            .working_dir("/sandbox")
            .memory_limit(256 * 1024 * 1024i64)
            .cpu_share(0.5)
            .pids_limit(32i64)
            .build()
            .unwrap();
        let cfg = host_config(&spec);
        assert_eq!(cfg.memory, Some(256 * 1024 * 1024));
        assert_eq!(cfg.memory_swap, cfg.memory);
        assert_eq!(cfg.cpu_period, Some(100_000));
        assert_eq!(cfg.cpu_quota, Some(50_000));
        assert_eq!(cfg.pids_limit, Some(32));
        assert_eq!(cfg.network_mode.as_deref(), Some("none"));
        assert_eq!(cfg.cap_drop, Some(vec!["ALL".to_owned()]));
    }
}
