//! CLI entry point — run one task and render its event stream.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use repopilot::events::AgentEvent;
use repopilot::pipeline::PipelineShape;
use repopilot::task::{LogLevel, RepoId, Task};
use repopilot::{spawn, AgentConfig};

#[derive(Debug, Parser)]
#[command(name = "repopilot", about = "Autonomous coding agent for GitHub repositories")]
struct Args {
    /// Target repository, owner/name.
    #[arg(long)]
    repo: String,

    /// What to do.
    #[arg(long)]
    task: String,

    /// Working branch (created from the default branch if absent).
    #[arg(long)]
    branch: Option<String>,

    /// Pipeline shape: 3 (analyze/implement/review) or 5 (adds design+plan).
    #[arg(long, default_value = "3")]
    shape: PipelineShape,

    /// Model alias or full id.
    #[arg(long)]
    model: Option<String>,

    /// Skip opening a pull request after the commit.
    #[arg(long)]
    no_pr: bool,

    /// Print unified diffs for staged file changes.
    #[arg(long)]
    diffs: bool,

    /// Optional YAML config file.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AgentConfig::from_env_and_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => AgentConfig::from_env().context("loading config from environment")?,
    };
    if let Some(model) = args.model {
        config.model = model;
    }
    if args.no_pr {
        config.open_pull_request = false;
    }

    let repo = RepoId::parse(&args.repo).map_err(anyhow::Error::msg)?;
    let mut task = Task::new(args.task, repo);
    if let Some(branch) = args.branch {
        task = task.with_branch(branch);
    }

    let mut handle = spawn(config, task, args.shape);

    let mut failed = false;
    while let Some(event) = handle.events.recv().await {
        render(&event, args.diffs);
        if let AgentEvent::Error { .. } = event {
            failed = true;
        }
    }

    // The worker already reported the outcome through the stream; the join
    // result only matters for panics.
    handle.join.await.context("pipeline worker panicked")?.ok();

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

fn render(event: &AgentEvent, diffs: bool) {
    match event {
        AgentEvent::Log(log) => {
            let tag = match log.level {
                LogLevel::Info => "info",
                LogLevel::Warn => "warn",
                LogLevel::Error => "error",
                LogLevel::Success => "ok",
            };
            println!("[{tag}] {}", log.message);
        }
        AgentEvent::Plan(plan) => {
            println!("plan: {}", plan.summary);
            for (i, step) in plan.steps.iter().enumerate() {
                println!("  {}. {}", i + 1, step.description);
            }
            if !plan.estimated_files.is_empty() {
                println!("  files: {}", plan.estimated_files.join(", "));
            }
        }
        AgentEvent::StepStart { .. } => {}
        AgentEvent::StepComplete { .. } => {}
        AgentEvent::StepError { error, .. } => println!("[step failed] {error}"),
        AgentEvent::FileChange(op) => {
            println!("~ {:?} {}", op.action, op.path);
            if diffs {
                if let Some(diff) = op.diff() {
                    println!("{diff}");
                }
            }
        }
        AgentEvent::PrCreated { url, number } => {
            println!("pull request #{number}: {url}");
        }
        AgentEvent::Complete { message, .. } => {
            println!("done: {message}");
        }
        AgentEvent::Error { message } => {
            eprintln!("failed: {message}");
        }
    }
}
