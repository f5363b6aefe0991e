//! Stagehand CLI - phased, concurrent setup batches
//!
//! Usage:
//!   stagehand init [path]         Write a default .stagehand/config.toml
//!   stagehand run <plan.toml>     Run a scripted setup plan

mod plan;
mod render;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use plan::{LocalElevation, Plan};
use stagehand_core::StagehandConfig;
use stagehand_orchestrator::{Orchestrator, State};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "stagehand")]
#[command(author, version, about = "Phased, concurrent machine setup")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration
    Init {
        /// Repository path (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Run a setup plan
    Run {
        /// Plan file (TOML)
        plan: PathBuf,

        /// Retry failed tasks automatically while retries remain
        #[arg(long)]
        retry: bool,

        /// Print the final summary as JSON
        #[arg(long)]
        json: bool,

        /// Run elevated tasks through a local elevated session
        #[arg(long)]
        elevated: bool,

        /// Maximum number of tasks running at once
        #[arg(long, value_name = "N")]
        max_concurrency: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging; RUST_LOG overrides the flag
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Init { path } => cmd_init(path),
        Commands::Run {
            plan,
            retry,
            json,
            elevated,
            max_concurrency,
        } => cmd_run(plan, retry, json, elevated, max_concurrency).await,
    }
}

fn cmd_init(path: PathBuf) -> Result<()> {
    info!("Initializing Stagehand in {:?}", path);

    StagehandConfig::write_default(&path).context("Failed to write configuration")?;

    println!("Initialized Stagehand in {:?}", path);
    println!("Created:");
    println!("  .stagehand/config.toml");
    Ok(())
}

async fn cmd_run(
    plan_path: PathBuf,
    retry: bool,
    json: bool,
    elevated: bool,
    max_concurrency: Option<usize>,
) -> Result<()> {
    let repo_root = std::env::current_dir()?;
    let settings = StagehandConfig::load_or_default(&repo_root)?;
    let plan = Plan::load(&plan_path)?;

    let mut config = settings.orchestrator_config(plan.setup_target());
    if let Some(max) = max_concurrency {
        config = config.with_max_concurrency(max);
    }

    let (mut orchestrator, rx) = Orchestrator::new(config, plan.into_tasks());
    if elevated {
        orchestrator = orchestrator.with_elevation(Arc::new(LocalElevation));
    }
    let renderer = tokio::spawn(render::render_events(rx, json));

    info!(batch = %orchestrator.id(), plan = ?plan_path, "Running plan");
    orchestrator.run().await?;

    while matches!(orchestrator.state(), State::AwaitingRetryDecision { .. }) {
        if retry {
            orchestrator.retry_failed_tasks().await?;
        } else {
            orchestrator.finish().await?;
        }
    }

    let summary = orchestrator.summary();

    // Closing the last event sender lets the renderer drain and exit
    drop(orchestrator);
    renderer.await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    if !summary.is_clean() {
        anyhow::bail!("{} task(s) did not complete", summary.unresolved.len());
    }
    Ok(())
}
