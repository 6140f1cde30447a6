//! SwarmCog launcher — seeds agents from config and runs their cognitive cycles
//!
//! Usage:
//!   swarmcog --config swarmcog.toml --duration-secs 30
//!
//! Runs until the duration elapses or Ctrl-C, then prints the system
//! snapshot as JSON on stdout.

use clap::Parser;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use swarmcog_core::SwarmConfig;
use swarmcog_kernel::Scheduler;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "swarmcog", about = "Cognitive agent swarm over a shared knowledge graph")]
struct Cli {
    /// Path to config file (TOML). Missing or invalid files fall back to defaults.
    #[arg(long, default_value = "swarmcog.toml")]
    config: PathBuf,

    /// Stop after this many seconds. Default: run until Ctrl-C.
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Override the scheduler's cycle interval (milliseconds).
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Dump default config as TOML and exit.
    #[arg(long)]
    dump_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.dump_config {
        println!("{}", SwarmConfig::default().to_toml());
        return Ok(());
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "swarmcog=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = SwarmConfig::load(&cli.config);
    if let Some(ms) = cli.interval_ms {
        anyhow::ensure!(ms > 0, "--interval-ms must be positive");
        config.scheduler.cycle_interval_ms = ms;
    }

    let scheduler = Scheduler::from_config(&config);
    seed_agents(&scheduler, &config)?;

    let interval = config.scheduler.cycle_interval();
    info!(
        "SwarmCog v{} — graph '{}', {} agents, cycle every {:?}",
        env!("CARGO_PKG_VERSION"),
        config.graph.name,
        scheduler.len(),
        interval
    );
    scheduler.start_all(interval);

    match cli.duration_secs {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                    info!("Run duration of {}s elapsed", secs);
                }
                _ = tokio::signal::ctrl_c() => info!("Interrupted"),
            }
        }
        None => {
            tokio::signal::ctrl_c().await?;
            info!("Interrupted");
        }
    }

    scheduler.stop_all().await;

    let snapshot = scheduler.snapshot();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

/// Agent nodes with capabilities go into the graph first, so registration
/// finds them instead of creating bare nodes.
fn seed_agents(scheduler: &Scheduler, config: &SwarmConfig) -> anyhow::Result<()> {
    if config.agents.is_empty() {
        warn!("No [[agents]] configured; the swarm will idle");
    }
    for seed in &config.agents {
        if scheduler.graph().find_agent(&seed.name).is_none() {
            scheduler
                .graph()
                .add_agent_node(&seed.name, seed.capabilities.as_slice())?;
        }
        scheduler.register(seed.name.as_str(), seed.goals.clone(), BTreeMap::new())?;
    }
    Ok(())
}
