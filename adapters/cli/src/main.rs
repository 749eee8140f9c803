#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that runs the CVD walkthrough headless and logs its
//! progress.

use std::{path::PathBuf, time::Duration};

use anyhow::{bail, ensure, Context, Result};
use clap::Parser;
use cvd_walkthrough_core::{ChamberId, Event, Stage};
use cvd_walkthrough_headless::{Simulation, SimulationConfig};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "cvd-walkthrough")]
#[command(about = "Runs the chemical vapour deposition walkthrough without a renderer")]
struct Cli {
    /// TOML configuration file; built-in defaults apply when omitted
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Overrides the configured random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Simulated seconds to run before giving up
    #[arg(long, default_value_t = 7_200)]
    duration_secs: u64,

    /// Length of one simulated frame in milliseconds
    #[arg(long, default_value_t = 50)]
    frame_ms: u64,

    /// Enable debug logging
    #[arg(long, short)]
    verbose: bool,
}

/// Entry point for the CVD walkthrough command-line interface.
fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    ensure!(cli.frame_ms > 0, "--frame-ms must be greater than zero");

    let mut config = match &cli.config {
        Some(path) => SimulationConfig::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => SimulationConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }

    let mut simulation = Simulation::new(&config).context("invalid simulation configuration")?;
    let frame = Duration::from_millis(cli.frame_ms);
    let frames = cli.duration_secs.saturating_mul(1_000) / cli.frame_ms;
    info!(
        seed = config.seed,
        frames,
        frame_ms = cli.frame_ms,
        "starting walkthrough"
    );

    simulation.start();
    report(&mut simulation);

    let mut elapsed = Duration::ZERO;
    for _ in 0..frames {
        simulation.tick(frame);
        elapsed += frame;
        report(&mut simulation);
        if simulation.stage() == Stage::Complete {
            break;
        }
    }

    println!("simulated time: {:.1}s", elapsed.as_secs_f32());
    println!("stage: {:?}", simulation.stage());
    println!("coating: {:?}", simulation.coating());
    for chamber in ChamberId::ALL {
        println!(
            "{chamber:?}: particles={} settled={} converged={}",
            simulation.particle_count(chamber),
            simulation.settled_count(chamber),
            simulation.is_converged(chamber),
        );
    }

    if simulation.stage() != Stage::Complete {
        bail!(
            "walkthrough did not complete within {}s of simulated time",
            cli.duration_secs
        );
    }
    Ok(())
}

fn report(simulation: &mut Simulation) {
    let mut absorbed = 0_usize;
    for event in simulation.events() {
        match event {
            Event::SubstrateCoated { coating } => info!(?coating, "substrate coated"),
            Event::WalkthroughFinished => info!("walkthrough finished"),
            Event::CarrierEmitted { chamber, .. } => debug!(?chamber, "carrier emitted"),
            Event::DepositsFaded { chamber, removed } => {
                debug!(?chamber, removed, "deposits faded out");
            }
            Event::GasAbsorbed { .. } => absorbed += 1,
            _ => {}
        }
    }
    if absorbed > 0 {
        debug!(absorbed, "gas absorbed by the vacuum");
    }
}
