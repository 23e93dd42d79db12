//! NR Slot Scheduler Simulator
//!
//! Loads a scenario, attaches its UEs to the MAC scheduler and runs it slot
//! by slot until the configured number of slots or Ctrl-C.

mod config;
mod sim;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::SimConfig;
use crate::sim::Simulation;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scenario file (YAML, or TOML with a .toml extension)
    #[arg(short, long, default_value = "simulator/config/sim.yml")]
    config: PathBuf,

    /// Log level, overrides the scenario
    #[arg(short, long)]
    log_level: Option<String>,

    /// Number of slots to run, overrides the scenario
    #[arg(short, long)]
    num_slots: Option<u64>,

    /// Pace slots at their air duration
    #[arg(short, long)]
    realtime: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = SimConfig::from_file(&args.config)?;
    if let Some(num_slots) = args.num_slots {
        config.simulation.num_slots = num_slots;
    }
    if args.realtime {
        config.simulation.realtime = true;
    }

    // RUST_LOG wins over the command line and the scenario
    let level = args.log_level.clone().unwrap_or_else(|| config.log.level.clone());
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));

    fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Starting NR slot scheduler simulation");
    info!("Scenario: {}", args.config.display());
    info!(
        "{} UEs, {} slots of {} us, policy {:?}, access {:?}",
        config.ues.len(),
        config.simulation.num_slots,
        config.scheduler.scs.slot_duration_us(),
        config.scheduler.policy,
        config.scheduler.access
    );

    let mut sim = Simulation::new(config)?;

    let outcome = tokio::select! {
        result = sim.run() => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    match outcome {
        Some(Ok(())) => info!("Simulation completed"),
        Some(Err(e)) => {
            error!("Simulation aborted: {:#}", e);
            sim.log_stats();
            return Err(e);
        }
        None => warn!("Received shutdown signal, stopping"),
    }

    sim.log_stats();
    info!("Simulator shutdown complete");
    Ok(())
}
