//! Command-line driver for the four consensus algorithms in this workspace:
//! classical Two- and Three-Phase Commit, the signed-message Byzantine
//! Three-Phase Commit, and Byzantine Generals / Oral Messages. Each
//! subcommand builds a topology, seeds one [`consensus_sim::Kernel`] run,
//! and prints the resulting [`consensus_sim::RunReport`].
//!
//! Configuration is layered the way the rest of the workspace layers it:
//! built-in defaults, an optional `--config` TOML file, `CONSENSUS_LAB_*`
//! environment variables, then CLI flags, in ascending precedence.
//!
//! `--repeat N` runs N independent seeds of the same scenario concurrently
//! via `tokio::task::spawn_blocking` — the kernel's own event loop is
//! synchronous and CPU-bound, so tokio's role here is purely to fan out
//! independent runs, not to drive the simulation itself.
//!
//! [`run`] is the entry point both this crate's own binary and the
//! workspace's root binary call into, so there is exactly one place that
//! owns argument parsing and dispatch.

pub mod args;
mod scenarios;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use args::RunArgs;
use consensus_sim::{RunReport, ScenarioConfig};

#[derive(Parser)]
#[command(name = "consensus-lab")]
#[command(about = "Run distributed-consensus algorithm simulations")]
struct Cli {
    /// Enable debug-level logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classical Two-Phase Commit.
    TwoPc(RunArgs),
    /// Classical Three-Phase Commit.
    ThreePc(RunArgs),
    /// Signed-message Byzantine-tolerant Three-Phase Commit.
    ByzantineThreePc(RunArgs),
    /// Byzantine Generals / Oral Messages.
    OralMessages(RunArgs),
}

fn merge_config(args: &RunArgs) -> Result<ScenarioConfig> {
    let mut cfg = ScenarioConfig::load(args.config.as_deref())?;
    if let Some(n) = args.n {
        cfg.n = n;
    }
    if let Some(m) = args.m {
        cfg.m = m;
    }
    if let Some(decision) = args.decision {
        cfg.decision = decision;
    }
    if args.coordinator_id.is_some() {
        cfg.coordinator_id = args.coordinator_id;
    }
    if let Some(topology) = args.topology {
        cfg.topology = topology.into();
    }
    if let Some(chords) = args.chords {
        cfg.chords = chords;
    }
    if let Some(drop_rate) = args.drop_rate {
        cfg.drop_rate = drop_rate;
    }
    if let Some(seed) = args.seed {
        cfg.seed = seed;
    }
    if let Some(max_ticks) = args.max_ticks {
        cfg.max_ticks = max_ticks;
    }
    Ok(cfg)
}

async fn run_repeated(
    base: ScenarioConfig,
    repeat: u32,
    run_once: fn(&ScenarioConfig) -> Result<RunReport>,
) -> Result<()> {
    let mut handles = Vec::with_capacity(repeat as usize);
    for offset in 0..repeat {
        let mut cfg = base.clone();
        cfg.seed = base.seed.wrapping_add(offset as u64);
        handles.push(tokio::task::spawn_blocking(move || run_once(&cfg)));
    }
    for (offset, handle) in handles.into_iter().enumerate() {
        match handle.await {
            Ok(Ok(report)) => {
                println!("--- run {offset} ---");
                println!("{report}");
            }
            Ok(Err(err)) => error!(run = offset, %err, "scenario run failed"),
            Err(join_err) => error!(run = offset, %join_err, "run task panicked"),
        }
    }
    Ok(())
}

/// Parses `std::env::args`, configures tracing, and runs the requested
/// scenario(s) to completion. Shared by `consensus-cli`'s own binary and
/// the workspace root binary, so both present the same command surface.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("consensus_cli={level},consensus_sim={level},consensus_protocols={level}"))
        .init();

    let (args, run_once): (&RunArgs, fn(&ScenarioConfig) -> Result<RunReport>) = match &cli.command {
        Command::TwoPc(args) => (args, scenarios::run_two_pc),
        Command::ThreePc(args) => (args, scenarios::run_three_pc),
        Command::ByzantineThreePc(args) => (args, scenarios::run_byzantine_three_pc),
        Command::OralMessages(args) => (args, scenarios::run_oral_messages),
    };

    let cfg = merge_config(args)?;
    info!(?cfg, "scenario configured");

    run_repeated(cfg, args.repeat.max(1), run_once).await
}
