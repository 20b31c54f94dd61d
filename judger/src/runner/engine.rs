//! The seam between the executor and the container engine.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use derive_builder::Builder;
use futures::stream::BoxStream;

use super::demux::OutputChunk;

/// Label put on every sandbox container, used to find leftovers.
pub const SANDBOX_LABEL: &str = "conquer.sandbox";

/// Everything needed to create one sandbox container.
#[derive(Debug, Clone, Builder)]
#[builder(setter(into, strip_option))]
pub struct SandboxSpec {
    /// Container name. Purely for labelling & debugging use.
    pub name: String,

    pub image: String,

    /// Argument vector run as the container's entry command.
    pub command: Vec<String>,

    pub working_dir: String,

    /// Memory limit in bytes. Swap is limited to the same value.
    pub memory_limit: i64,

    /// The CPU fraction allowed to use
    #[builder(default = "0.5")]
    pub cpu_share: f64,

    #[builder(default = "64")]
    pub pids_limit: i64,

    /// Whether network is allowed in this container
    #[builder(default = "false")]
    pub network_enabled: bool,

    /// The user to run the command as, when not the image default
    #[builder(default)]
    pub user: Option<String>,

    #[builder(default)]
    pub labels: HashMap<String, String>,
}

/// How a container stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitState {
    pub code: i64,
    pub oom_killed: bool,
}

pub type OutputStream = BoxStream<'static, anyhow::Result<OutputChunk>>;

/// A container engine able to run one-shot sandboxes.
///
/// Every method addresses a container by the id returned from [`create`].
///
/// [`create`]: SandboxEngine::create
#[async_trait]
pub trait SandboxEngine: Send + Sync {
    /// Name of this engine, used in logs.
    fn name(&self) -> &str;

    /// Create a stopped container and return its id.
    async fn create(&self, spec: &SandboxSpec) -> anyhow::Result<String>;

    /// Extract a tar archive into `path` inside the container.
    async fn upload(&self, id: &str, path: &str, archive: Bytes) -> anyhow::Result<()>;

    async fn start(&self, id: &str) -> anyhow::Result<()>;

    /// Follow the output of a started container. Output produced before the
    /// call is replayed, and the stream ends once the container stops.
    async fn attach(&self, id: &str) -> anyhow::Result<OutputStream>;

    /// Wait for the container to stop.
    async fn wait(&self, id: &str) -> anyhow::Result<ExitState>;

    /// Peak memory usage in bytes, if the engine can tell.
    async fn peak_memory(&self, id: &str) -> anyhow::Result<Option<u64>>;

    async fn kill(&self, id: &str) -> anyhow::Result<()>;

    /// Force-remove the container, running or not.
    async fn remove(&self, id: &str) -> anyhow::Result<()>;
}
