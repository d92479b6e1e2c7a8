//! cozmo-sim - run the behavior engine against a simulated robot.
//!
//! - `cozmo-sim run` - tick the engine through a scripted timeline
//! - `cozmo-sim check` - validate an engine config
//! - `cozmo-sim init` - write a starter config and timeline

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use cozmo_behavior::{BehaviorFactory, BehaviorManager, EngineConfig};
use cozmo_sim::{starter, JsonlTraceSink, Simulation, Timeline};

#[derive(Parser)]
#[command(name = "cozmo-sim")]
#[command(about = "Behavior engine simulator", version)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine against the simulated robot
    Run {
        /// Engine config (YAML)
        #[arg(short, long, default_value = "engine.yaml")]
        config: PathBuf,

        /// Scripted sensor timeline (YAML)
        #[arg(short, long)]
        timeline: Option<PathBuf>,

        /// Number of ticks to run
        #[arg(long, default_value_t = 300)]
        ticks: u64,

        /// Pace ticks at the configured rate instead of running flat out
        #[arg(long)]
        realtime: bool,

        /// Write trace events as JSON lines
        #[arg(long)]
        trace_out: Option<PathBuf>,

        /// Seed for behavior randomness
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },

    /// Validate an engine config
    Check {
        #[arg(short, long, default_value = "engine.yaml")]
        config: PathBuf,
    },

    /// Write a starter engine config and timeline
    Init {
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run {
            config,
            timeline,
            ticks,
            realtime,
            trace_out,
            seed,
        } => run(&config, timeline.as_deref(), ticks, realtime, trace_out.as_deref(), seed).await,
        Commands::Check { config } => check(&config),
        Commands::Init { dir } => init(&dir),
    }
}

async fn run(
    config_path: &Path,
    timeline_path: Option<&Path>,
    ticks: u64,
    realtime: bool,
    trace_out: Option<&Path>,
    seed: u64,
) -> Result<()> {
    let config = EngineConfig::load(config_path)?;
    let timeline = match timeline_path {
        Some(path) => Timeline::load(path)?,
        None => Timeline::default(),
    };
    tracing::info!(
        config = %config_path.display(),
        steps = timeline.steps.len(),
        ticks,
        "Starting simulation"
    );

    let mut sim = Simulation::new(&config, timeline, seed).context("Failed to build engine")?;
    if let Some(path) = trace_out {
        sim.set_trace_sink(Box::new(JsonlTraceSink::create(path)?));
    }

    let mut interval = tokio::time::interval(Duration::from_secs_f32(config.scheduler.tick_seconds()));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut active: Option<String> = None;
    while sim.tick() < ticks {
        if realtime {
            tokio::select! {
                _ = interval.tick() => {}
                _ = &mut ctrl_c => {
                    tracing::info!(tick = sim.tick(), "Interrupted");
                    break;
                }
            }
        }

        let report = sim.step();
        let now = report.active.as_ref().map(|id| id.to_string());
        if now != active {
            tracing::info!(
                tick = report.tick,
                behavior = now.as_deref().unwrap_or("-"),
                reaction = report.reaction.as_deref().unwrap_or("-"),
                "Active behavior changed"
            );
            active = now;
        }
    }

    let summary = sim.finish();
    println!("{summary}");
    if let Some(path) = trace_out {
        println!("Trace written to {}", path.display());
    }
    Ok(())
}

fn check(config_path: &Path) -> Result<()> {
    let config = EngineConfig::load(config_path)?;
    let manager = BehaviorManager::from_config(&config, &BehaviorFactory::with_builtins())
        .with_context(|| format!("Failed to build engine from {}", config_path.display()))?;

    println!("{} is valid", config_path.display());
    println!();
    println!("Behaviors: {}", manager.container().len());
    for behavior in manager.container().iter() {
        println!("  - {} ({})", behavior.id(), behavior.class());
    }
    println!("Triggers: {}", manager.triggers().len());
    for name in manager.triggers().names() {
        let priority = manager.triggers().priority_of(name).unwrap_or_default();
        println!("  - {name} (priority {priority})");
    }
    Ok(())
}

fn init(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut created = Vec::new();
    for (name, contents) in [
        ("engine.yaml", starter::ENGINE_CONFIG),
        ("timeline.yaml", starter::TIMELINE),
    ] {
        let path = dir.join(name);
        if path.exists() {
            tracing::info!(path = %path.display(), "Keeping existing file");
            continue;
        }
        std::fs::write(&path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
        created.push(name);
    }

    println!("Initialized simulator files in {}", dir.display());
    println!();
    println!("Created:");
    for name in &created {
        println!("  {name}");
    }
    println!();
    println!("Next steps:");
    println!("  cozmo-sim check --config engine.yaml");
    println!("  cozmo-sim run --config engine.yaml --timeline timeline.yaml");
    Ok(())
}
