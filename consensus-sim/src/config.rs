use serde::{Deserialize, Serialize};

use consensus_core::ConsensusError;

use crate::kernel::LinkFault;

/// Which topology generator a scenario run should use. Mirrors the two
/// generators in [`crate::topology`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TopologyChoice {
    CompleteGraph,
    RingWithChords,
}

impl Default for TopologyChoice {
    fn default() -> Self {
        TopologyChoice::CompleteGraph
    }
}

/// Layered scenario configuration: typed defaults via `Default`,
/// overridable by an optional TOML file, then by `CONSENSUS_LAB_*`
/// environment variables, with CLI flags (applied by `consensus-cli`)
/// taking final precedence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Total node count.
    pub n: usize,
    /// Algorithm-specific secondary size parameter (traitor count bound for
    /// Oral Messages, unused by the commit protocols).
    pub m: usize,
    /// The commit/attack decision a scenario seeds its initiator with.
    pub decision: bool,
    /// Which node (by slot) plays coordinator/commander. For 2PC and 3PC,
    /// `None` draws a uniformly random slot from the run's own RNG,
    /// matching the Python reference's `coordinatorID == 0` ("pick
    /// randomly"). Byzantine-3PC and Oral Messages don't expose a
    /// `coordinatorID` parameter of their own, so their scenario builders
    /// resolve `None` to slot 0.
    pub coordinator_id: Option<usize>,
    pub topology: TopologyChoice,
    pub chords: usize,
    pub drop_rate: f64,
    pub seed: u64,
    pub max_ticks: u64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            n: 4,
            m: 1,
            decision: true,
            coordinator_id: None,
            topology: TopologyChoice::default(),
            chords: 1,
            drop_rate: 0.0,
            seed: 42,
            max_ticks: 1000,
        }
    }
}

impl ScenarioConfig {
    pub fn link_fault(&self) -> LinkFault {
        if self.drop_rate <= 0.0 {
            LinkFault::Reliable
        } else {
            LinkFault::DropRate(self.drop_rate)
        }
    }

    /// Loads configuration from (in ascending precedence) built-in
    /// defaults, an optional TOML file at `path`, and `CONSENSUS_LAB_*`
    /// environment variables. CLI overrides are applied by the caller on
    /// top of the returned value.
    pub fn load(path: Option<&str>) -> Result<Self, ConsensusError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default()).map_err(|e| {
                ConsensusError::Configuration(format!("could not seed defaults: {e}"))
            })?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("CONSENSUS_LAB").separator("__"),
        );

        let built = builder
            .build()
            .map_err(|e| ConsensusError::Configuration(format!("failed to load config: {e}")))?;

        built
            .try_deserialize()
            .map_err(|e| ConsensusError::Configuration(format!("failed to deserialize config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        let cfg = ScenarioConfig::default();
        assert!(cfg.n > 0);
        assert!(matches!(cfg.link_fault(), LinkFault::Reliable));
    }

    #[test]
    fn nonzero_drop_rate_yields_drop_rate_fault() {
        let cfg = ScenarioConfig {
            drop_rate: 0.25,
            ..ScenarioConfig::default()
        };
        assert!(matches!(cfg.link_fault(), LinkFault::DropRate(r) if (r - 0.25).abs() < f64::EPSILON));
    }
}
