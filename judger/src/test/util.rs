//! An in-memory [`SandboxEngine`] that replays scripted runs.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::bail;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::{io::AsyncReadExt, sync::mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::{
    harness::SourceFiles,
    lang::LanguageRegistry,
    runner::{
        demux::{encode_frame, OutputChunk, StreamFrame, StreamKind},
        engine::{ExitState, OutputStream, SandboxEngine, SandboxSpec},
        registry::SandboxRegistry,
        Executor, ExecutorOptions,
    },
};

/// What a mocked container does once started.
#[derive(Debug, Clone)]
pub struct MockRun {
    pub code: i64,
    pub stdout: String,
    pub stderr: String,
    pub oom_killed: bool,
    /// How long the process runs. `None` runs until killed.
    pub duration: Option<Duration>,
    /// Deliver output as one multiplexed byte blob instead of frames
    pub raw: bool,
}

impl MockRun {
    pub fn exits(code: i64) -> MockRun {
        MockRun {
            code,
            stdout: String::new(),
            stderr: String::new(),
            oom_killed: false,
            duration: Some(Duration::from_millis(1)),
            raw: false,
        }
    }

    pub fn prints(stdout: impl Into<String>) -> MockRun {
        MockRun::exits(0).stdout(stdout)
    }

    pub fn hangs() -> MockRun {
        MockRun {
            duration: None,
            ..MockRun::exits(0)
        }
    }

    pub fn stdout(mut self, s: impl Into<String>) -> Self {
        self.stdout = s.into();
        self
    }

    pub fn stderr(mut self, s: impl Into<String>) -> Self {
        self.stderr = s.into();
        self
    }

    pub fn oom(mut self) -> Self {
        self.oom_killed = true;
        self
    }

    pub fn takes(mut self, d: Duration) -> Self {
        self.duration = Some(d);
        self
    }

    pub fn raw(mut self) -> Self {
        self.raw = true;
        self
    }

    fn chunks(&self) -> Vec<OutputChunk> {
        let frames = [
            (StreamKind::Stdout, &self.stdout),
            (StreamKind::Stderr, &self.stderr),
        ];
        if self.raw {
            let blob = frames
                .iter()
                .filter(|(_, s)| !s.is_empty())
                .flat_map(|(kind, s)| encode_frame(*kind, s.as_bytes()))
                .collect::<Vec<u8>>();
            vec![OutputChunk::Raw(Bytes::from(blob))]
        } else {
            frames
                .iter()
                .filter(|(_, s)| !s.is_empty())
                .map(|(kind, s)| {
                    OutputChunk::Frame(StreamFrame {
                        kind: *kind,
                        payload: Bytes::copy_from_slice(s.as_bytes()),
                    })
                })
                .collect()
        }
    }
}

/// Engine calls that can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Create,
    Upload,
    Attach,
    Start,
    Wait,
    PeakMemory,
    Kill,
    Remove,
}

type Responder = Box<dyn Fn(&SourceFiles) -> MockRun + Send + Sync>;

struct MockContainer {
    files: SourceFiles,
    run: Option<MockRun>,
    output: Option<mpsc::UnboundedSender<anyhow::Result<OutputChunk>>>,
    output_recv: Option<mpsc::UnboundedReceiver<anyhow::Result<OutputChunk>>>,
}

#[derive(Default)]
struct MockState {
    next_id: u64,
    containers: HashMap<String, MockContainer>,
    created: Vec<SandboxSpec>,
    uploads: Vec<SourceFiles>,
    killed: Vec<String>,
    removed: Vec<String>,
}

pub struct MockEngine {
    responder: Responder,
    peak_memory: Option<u64>,
    failing: Mutex<HashSet<Stage>>,
    state: Mutex<MockState>,
}

impl MockEngine {
    /// Every run is decided by `responder`, given the files uploaded into the
    /// sandbox.
    pub fn new(responder: impl Fn(&SourceFiles) -> MockRun + Send + Sync + 'static) -> Self {
        MockEngine {
            responder: Box::new(responder),
            peak_memory: None,
            failing: Mutex::new(HashSet::new()),
            state: Mutex::new(MockState::default()),
        }
    }

    /// Every run behaves like `run`.
    pub fn always(run: MockRun) -> Self {
        MockEngine::new(move |_| run.clone())
    }

    /// Runs replay `runs` in order, then exit successfully with no output.
    pub fn script(runs: Vec<MockRun>) -> Self {
        let queue = Mutex::new(runs.into_iter().collect::<VecDeque<_>>());
        MockEngine::new(move |_| {
            queue
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| MockRun::exits(0))
        })
    }

    pub fn with_peak_memory(mut self, bytes: u64) -> Self {
        self.peak_memory = Some(bytes);
        self
    }

    pub fn fail_at(self, stage: Stage) -> Self {
        self.failing.lock().unwrap().insert(stage);
        self
    }

    pub fn created(&self) -> Vec<SandboxSpec> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn uploads(&self) -> Vec<SourceFiles> {
        self.state.lock().unwrap().uploads.clone()
    }

    pub fn killed(&self) -> Vec<String> {
        self.state.lock().unwrap().killed.clone()
    }

    pub fn removed(&self) -> Vec<String> {
        self.state.lock().unwrap().removed.clone()
    }

    /// Containers created and not yet removed.
    pub fn live(&self) -> usize {
        self.state.lock().unwrap().containers.len()
    }

    fn check(&self, stage: Stage) -> anyhow::Result<()> {
        if self.failing.lock().unwrap().contains(&stage) {
            bail!("injected {:?} failure", stage);
        }
        Ok(())
    }
}

async fn unpack(archive: Bytes) -> anyhow::Result<SourceFiles> {
    let mut archive = tokio_tar::Archive::new(std::io::Cursor::new(archive.to_vec()));
    let mut entries = archive.entries()?;
    let mut files = SourceFiles::new();
    while let Some(entry) = entries.next().await {
        let mut entry = entry?;
        let path = entry.path()?.to_string_lossy().into_owned();
        let mut content = String::new();
        entry.read_to_string(&mut content).await?;
        files.insert(path, content);
    }
    Ok(files)
}

#[async_trait]
impl SandboxEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn create(&self, spec: &SandboxSpec) -> anyhow::Result<String> {
        self.check(Stage::Create)?;
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("mock-{}", state.next_id);
        let (output, output_recv) = mpsc::unbounded_channel();
        state.containers.insert(
            id.clone(),
            MockContainer {
                files: SourceFiles::new(),
                run: None,
                output: Some(output),
                output_recv: Some(output_recv),
            },
        );
        state.created.push(spec.clone());
        Ok(id)
    }

    async fn upload(&self, id: &str, _path: &str, archive: Bytes) -> anyhow::Result<()> {
        self.check(Stage::Upload)?;
        let files = unpack(archive).await?;
        let mut state = self.state.lock().unwrap();
        state.uploads.push(files.clone());
        match state.containers.get_mut(id) {
            Some(c) => c.files = files,
            None => bail!("no such container: {}", id),
        }
        Ok(())
    }

    async fn attach(&self, id: &str) -> anyhow::Result<OutputStream> {
        self.check(Stage::Attach)?;
        let mut state = self.state.lock().unwrap();
        let recv = state
            .containers
            .get_mut(id)
            .and_then(|c| c.output_recv.take());
        match recv {
            Some(recv) => Ok(UnboundedReceiverStream::new(recv).boxed()),
            None => bail!("cannot attach to {}", id),
        }
    }

    async fn start(&self, id: &str) -> anyhow::Result<()> {
        self.check(Stage::Start)?;
        let mut state = self.state.lock().unwrap();
        match state.containers.get_mut(id) {
            Some(c) => c.run = Some((self.responder)(&c.files)),
            None => bail!("no such container: {}", id),
        }
        Ok(())
    }

    async fn wait(&self, id: &str) -> anyhow::Result<ExitState> {
        self.check(Stage::Wait)?;
        let (run, output) = {
            let mut state = self.state.lock().unwrap();
            match state.containers.get_mut(id) {
                Some(c) => (c.run.clone(), c.output.take()),
                None => bail!("no such container: {}", id),
            }
        };
        let run = match run {
            Some(run) => run,
            None => bail!("container {} was never started", id),
        };

        match run.duration {
            Some(d) => tokio::time::sleep(d).await,
            None => futures::future::pending::<()>().await,
        }
        if let Some(output) = output {
            for chunk in run.chunks() {
                let _ = output.send(Ok(chunk));
            }
        }
        Ok(ExitState {
            code: run.code,
            oom_killed: run.oom_killed,
        })
    }

    async fn peak_memory(&self, _id: &str) -> anyhow::Result<Option<u64>> {
        self.check(Stage::PeakMemory)?;
        Ok(self.peak_memory)
    }

    async fn kill(&self, id: &str) -> anyhow::Result<()> {
        self.check(Stage::Kill)?;
        self.state.lock().unwrap().killed.push(id.to_owned());
        Ok(())
    }

    async fn remove(&self, id: &str) -> anyhow::Result<()> {
        self.check(Stage::Remove)?;
        let mut state = self.state.lock().unwrap();
        state.containers.remove(id);
        state.removed.push(id.to_owned());
        Ok(())
    }
}

/// An executor over `engine` with builtin languages and a fresh registry.
pub fn executor(engine: Arc<MockEngine>) -> Executor {
    Executor::new(
        engine,
        Arc::new(LanguageRegistry::builtin()),
        Arc::new(SandboxRegistry::new()),
        ExecutorOptions::default(),
    )
}

/// Extract the JSON argument array a harness embedded after `marker`, e.g.
/// `JSON.parse(` for JavaScript.
pub fn embedded_args(src: &str, marker: &str) -> Vec<serde_json::Value> {
    let start = src.find(marker).expect("marker not found") + marker.len();
    let literal = serde_json::Deserializer::from_str(&src[start..])
        .into_iter::<String>()
        .next()
        .expect("no string literal after marker")
        .expect("malformed string literal");
    serde_json::from_str(&literal).expect("arguments are not JSON")
}

/// Install the test subscriber for tests whose runtime attributes cannot go
/// through `test_env_log::test`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Wait until `cond` holds, polling for a while before giving up.
pub async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
