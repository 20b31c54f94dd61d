use anyhow::Context;
use clap::Parser;
use conquer_judger::{
    config::JudgerConfig,
    judge::Judge,
    lang::{Language, LanguageRegistry},
    runner::{docker::DockerEngine, engine::SandboxEngine, image, registry::SandboxRegistry},
    tester::model::TestCase,
};
use serde::Serialize;
use std::{
    path::Path,
    process::exit,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing_subscriber::EnvFilter;

mod opt;

static CTRL_C: AtomicBool = AtomicBool::new(false);
static CTRL_C_TWICE: AtomicBool = AtomicBool::new(false);

/// Exit code after an interrupted run, as a shell reports SIGINT.
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[tokio::main]
async fn main() {
    let opt = opt::Opts::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let (shutdown_send, shutdown_recv) = unbounded_channel();
    if let Err(e) = ctrlc::set_handler(move || handle_ctrl_c(&shutdown_send)) {
        tracing::warn!("Failed to set termination handler: {}", e);
    }

    let code = match run(opt, shutdown_recv).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:?}", e);
            1
        }
    };
    exit(code);
}

async fn run(opt: opt::Opts, shutdown: UnboundedReceiver<()>) -> anyhow::Result<i32> {
    let cfg = JudgerConfig::load(opt.opt.config.as_deref())?;
    let engine = Arc::new(DockerEngine::connect()?);

    match opt.cmd {
        opt::SubCmd::Images(cmd) => images(&engine, &cfg, cmd).await,
        opt::SubCmd::Cleanup => {
            let removed = engine.cleanup_orphans().await?;
            tracing::info!(removed, "Orphaned sandboxes removed");
            Ok(0)
        }
        cmd => {
            let registry = Arc::new(SandboxRegistry::new());
            let judge = Judge::from_config(engine.clone(), registry.clone(), &cfg);
            let job = judge_cmd(&judge, cmd);
            interruptible(job, shutdown, &registry, &*engine).await
        }
    }
}

/// Run `job` until it finishes or a shutdown signal arrives, in which case
/// every live sandbox is swept before returning.
async fn interruptible(
    job: impl std::future::Future<Output = anyhow::Result<i32>>,
    mut shutdown: UnboundedReceiver<()>,
    registry: &SandboxRegistry,
    engine: &dyn SandboxEngine,
) -> anyhow::Result<i32> {
    tokio::select! {
        res = job => res,
        Some(()) = shutdown.recv() => {
            let removed = registry.sweep(engine).await;
            tracing::warn!(removed, "Interrupted, sandboxes swept");
            Ok(INTERRUPTED_EXIT_CODE)
        }
    }
}

async fn judge_cmd(judge: &Judge, cmd: opt::SubCmd) -> anyhow::Result<i32> {
    match cmd {
        opt::SubCmd::Run(cmd) => {
            let code = read_code(&cmd.submission.code).await?;
            let cases = read_cases(&cmd.cases).await?;
            let report = judge
                .run_suite(
                    &code,
                    &cmd.submission.lang,
                    &cases,
                    cmd.timeout.map(Duration::from_millis),
                )
                .await?;
            print_json(&report)?;
            Ok(if report.all_passed { 0 } else { 1 })
        }
        opt::SubCmd::Analyze(cmd) => {
            let code = read_code(&cmd.submission.code).await?;
            let cases = read_cases(&cmd.cases).await?;
            let report = judge.analyze(&code, &cmd.submission.lang, &cases).await?;
            print_json(&report)?;
            Ok(0)
        }
        opt::SubCmd::Exec(cmd) => {
            let code = read_code(&cmd.submission.code).await?;
            let input = serde_json::from_str(&cmd.input)
                .with_context(|| format!("`{}` is not a JSON array", cmd.input))?;
            let case = TestCase::new(input, serde_json::Value::Null);
            let res = judge
                .execute_single(
                    &code,
                    &cmd.submission.lang,
                    &case,
                    cmd.timeout.map(Duration::from_millis),
                )
                .await?;
            print_json(&res)?;
            Ok(if res.success { 0 } else { 1 })
        }
        opt::SubCmd::Images(_) | opt::SubCmd::Cleanup => Ok(0),
    }
}

async fn images(
    engine: &DockerEngine,
    cfg: &JudgerConfig,
    cmd: opt::ImagesSubCmd,
) -> anyhow::Result<i32> {
    let registry = LanguageRegistry::from_config(cfg);
    let langs = if cmd.langs.is_empty() {
        Language::ALL.to_vec()
    } else {
        cmd.langs
            .iter()
            .map(|l| l.parse::<Language>())
            .collect::<Result<Vec<_>, _>>()?
    };

    let timeout = cmd.timeout.map(Duration::from_secs);
    let mut failed = 0;
    for lang in langs {
        let lang_cfg = registry
            .get(lang)
            .with_context(|| format!("No configuration for {}", lang))?;
        match image::prepare_image(engine.docker(), cfg, lang_cfg, timeout).await {
            Ok(()) => tracing::info!(%lang, image = %lang_cfg.sandbox_image, "Image ready"),
            Err(e) => {
                tracing::error!(%lang, "Failed to prepare image: {}", e);
                failed += 1;
            }
        }
    }
    Ok(if failed == 0 { 0 } else { 1 })
}

async fn read_code(path: &Path) -> anyhow::Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

async fn read_cases(path: &Path) -> anyhow::Result<Vec<TestCase>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("{} is not an array of test cases", path.display()))
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn handle_ctrl_c(shutdown: &UnboundedSender<()>) {
    if !CTRL_C.load(Ordering::SeqCst) {
        tracing::warn!("Removing live sandboxes... Press Ctrl-C again to force quit.");
        CTRL_C.store(true, Ordering::SeqCst);
        let _ = shutdown.send(());
    } else if !CTRL_C_TWICE.load(Ordering::SeqCst) {
        tracing::error!("Force quit!");
        CTRL_C_TWICE.store(true, Ordering::SeqCst);
        exit(101);
    }
}
