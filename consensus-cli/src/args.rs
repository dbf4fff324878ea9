//! Command-line argument structs for each protocol subcommand. All four
//! protocols share the same scenario knobs (topology, seed, tick budget);
//! `m` and `decision` only matter to the two that use them.

use clap::Args;
use consensus_sim::TopologyChoice;

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Total node count.
    #[arg(long)]
    pub n: Option<usize>,

    /// Traitor/fault bound. Ignored by 2PC and 3PC.
    #[arg(long)]
    pub m: Option<usize>,

    /// The value the coordinator/commander seeds the run with.
    #[arg(long)]
    pub decision: Option<bool>,

    /// Slot to start as coordinator/commander. Defaults to slot 0.
    #[arg(long)]
    pub coordinator_id: Option<usize>,

    /// "complete-graph" or "ring-with-chords".
    #[arg(long, value_enum)]
    pub topology: Option<TopologyArg>,

    /// Extra chords per node when using ring-with-chords.
    #[arg(long)]
    pub chords: Option<usize>,

    /// Fraction of messages a faulty link drops, in [0, 1).
    #[arg(long)]
    pub drop_rate: Option<f64>,

    /// RNG seed; same seed plus same args reproduces the same run.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Tick budget before a stuck run is reported rather than awaited forever.
    #[arg(long)]
    pub max_ticks: Option<u64>,

    /// Run this many independent seeds concurrently and print one report per run.
    #[arg(long, default_value_t = 1)]
    pub repeat: u32,

    /// Optional TOML file read before CLI flags and CONSENSUS_LAB_* env vars.
    #[arg(long)]
    pub config: Option<String>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum TopologyArg {
    CompleteGraph,
    RingWithChords,
}

impl From<TopologyArg> for TopologyChoice {
    fn from(value: TopologyArg) -> Self {
        match value {
            TopologyArg::CompleteGraph => TopologyChoice::CompleteGraph,
            TopologyArg::RingWithChords => TopologyChoice::RingWithChords,
        }
    }
}
