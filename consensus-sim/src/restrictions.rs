use std::collections::HashSet;

use consensus_core::ConsensusError;

use crate::kernel::LinkFault;
use crate::Topology;

/// A structural precondition a scenario can declare on its topology before
/// a run starts. Violating one is a configuration error, not a protocol
/// outcome, so it's surfaced as a `ConsensusError` before the kernel ever
/// processes an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyRestriction {
    /// Every link must be usable in both directions.
    BidirectionalLinks,
    /// The graph must be connected as an undirected graph.
    Connectivity,
    /// No two nodes may share an application-level id.
    InitialDistinctValues,
    /// The run's link fault policy must never drop a message, and every
    /// node must have at least one neighbor — a scenario that tolerates
    /// dropped messages or partitioned nodes cannot claim total
    /// reliability.
    TotalReliability,
}

pub fn check(
    topology: &Topology,
    link_fault: LinkFault,
    restriction: TopologyRestriction,
) -> Result<(), ConsensusError> {
    match restriction {
        TopologyRestriction::BidirectionalLinks => {
            if topology.is_bidirectional() {
                Ok(())
            } else {
                Err(ConsensusError::RestrictionViolation(
                    "topology has a one-directional link".into(),
                ))
            }
        }
        TopologyRestriction::Connectivity => {
            if topology.is_connected() {
                Ok(())
            } else {
                Err(ConsensusError::RestrictionViolation(
                    "topology is not connected".into(),
                ))
            }
        }
        TopologyRestriction::InitialDistinctValues => {
            let ids: HashSet<_> = topology.node_ids().iter().collect();
            if ids.len() == topology.node_ids().len() {
                Ok(())
            } else {
                Err(ConsensusError::RestrictionViolation(
                    "two or more nodes share an application-level id".into(),
                ))
            }
        }
        TopologyRestriction::TotalReliability => {
            if matches!(link_fault, LinkFault::DropRate(rate) if rate > 0.0) {
                Err(ConsensusError::RestrictionViolation(
                    "link fault policy drops messages, violating total reliability".into(),
                ))
            } else if (0..topology.node_count()).all(|slot| !topology.neighbors(slot).is_empty()) {
                Ok(())
            } else {
                Err(ConsensusError::RestrictionViolation(
                    "topology has an isolated node".into(),
                ))
            }
        }
    }
}

pub fn check_all(
    topology: &Topology,
    link_fault: LinkFault,
    restrictions: &[TopologyRestriction],
) -> Result<(), ConsensusError> {
    for &r in restrictions {
        check(topology, link_fault, r)?;
    }
    Ok(())
}
