//! Builds and runs one [`consensus_sim::Kernel`] per protocol from a
//! [`ScenarioConfig`]. Each function owns exactly the setup its protocol
//! needs: topology restrictions to apply, per-node memory to seed before
//! the first tick, and which slot is the initiator.

use anyhow::{bail, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use consensus_core::signature::private_key_for;
use consensus_sim::{Kernel, RunReport, ScenarioConfig, Topology, TopologyChoice, TopologyRestriction};

use consensus_protocols::byzantine_three_pc::{self, ByzantineThreePc};
use consensus_protocols::oral_messages::{self, OralMessages};
use consensus_protocols::three_pc::{self, ThreePc};
use consensus_protocols::two_pc::{self, TwoPc};

fn build_topology(cfg: &ScenarioConfig, rng: &mut ChaCha8Rng) -> Topology {
    match cfg.topology {
        TopologyChoice::CompleteGraph => Topology::complete_graph(cfg.n, rng),
        TopologyChoice::RingWithChords => Topology::ring_with_chords(cfg.n, cfg.chords, rng),
    }
}

const BASE_RESTRICTIONS: [TopologyRestriction; 3] = [
    TopologyRestriction::BidirectionalLinks,
    TopologyRestriction::Connectivity,
    TopologyRestriction::InitialDistinctValues,
];

pub fn run_two_pc(cfg: &ScenarioConfig) -> Result<RunReport> {
    let mut rng = ChaCha8Rng::seed_from_u64(cfg.seed);
    let topology = build_topology(cfg, &mut rng);
    let coordinator = cfg.coordinator_id.unwrap_or_else(|| rng.gen_range(0..cfg.n));
    if coordinator >= cfg.n {
        bail!("coordinator_id {coordinator} out of range for n={}", cfg.n);
    }

    let mut kernel: Kernel<TwoPc> = Kernel::new(
        topology,
        |slot| if slot == coordinator { two_pc::Status::Coordinator } else { two_pc::Status::Sleep },
        rng,
        cfg.link_fault(),
        cfg.max_ticks,
    );
    let mut restrictions = BASE_RESTRICTIONS.to_vec();
    restrictions.push(TopologyRestriction::TotalReliability);
    kernel.apply_restrictions(&restrictions)?;

    kernel.spontaneously_start(coordinator, two_pc::Payload::Prepare);
    Ok(kernel.run()?)
}

pub fn run_three_pc(cfg: &ScenarioConfig) -> Result<RunReport> {
    let mut rng = ChaCha8Rng::seed_from_u64(cfg.seed);
    let topology = build_topology(cfg, &mut rng);
    let coordinator = cfg.coordinator_id.unwrap_or_else(|| rng.gen_range(0..cfg.n));
    if coordinator >= cfg.n {
        bail!("coordinator_id {coordinator} out of range for n={}", cfg.n);
    }

    let mut kernel: Kernel<ThreePc> = Kernel::new(
        topology,
        |slot| if slot == coordinator { three_pc::Status::Coordinator } else { three_pc::Status::Sleep },
        rng,
        cfg.link_fault(),
        cfg.max_ticks,
    );
    kernel.apply_restrictions(&BASE_RESTRICTIONS)?;

    kernel.spontaneously_start(coordinator, three_pc::Payload::Prepare);
    Ok(kernel.run()?)
}

pub fn run_byzantine_three_pc(cfg: &ScenarioConfig) -> Result<RunReport> {
    let mut rng = ChaCha8Rng::seed_from_u64(cfg.seed);
    let topology = build_topology(cfg, &mut rng);
    let coordinator = cfg.coordinator_id.unwrap_or(0);
    if coordinator >= cfg.n {
        bail!("coordinator_id {coordinator} out of range for n={}", cfg.n);
    }
    if cfg.n < 3 * cfg.m + 1 {
        bail!("n={} cannot tolerate m={} faulty nodes (need n >= 3m+1)", cfg.n, cfg.m);
    }

    let faulty_slots: Vec<usize> = (0..cfg.n).filter(|&s| s != coordinator).take(cfg.m).collect();
    let mut kernel: Kernel<ByzantineThreePc> = Kernel::new(
        topology,
        |slot| {
            if slot == coordinator {
                byzantine_three_pc::Status::Coordinator
            } else if faulty_slots.contains(&slot) {
                byzantine_three_pc::Status::Faulty
            } else {
                byzantine_three_pc::Status::Sleep
            }
        },
        rng,
        cfg.link_fault(),
        cfg.max_ticks,
    );
    kernel.apply_restrictions(&BASE_RESTRICTIONS)?;

    for node in kernel.nodes_mut() {
        node.memory.m = cfg.m;
        node.memory.n = cfg.n;
        node.memory.private_key = private_key_for(node.unique_value);
    }

    kernel.spontaneously_start(coordinator, byzantine_three_pc::Payload::TimeoutPrepared);
    Ok(kernel.run()?)
}

pub fn run_oral_messages(cfg: &ScenarioConfig) -> Result<RunReport> {
    let mut rng = ChaCha8Rng::seed_from_u64(cfg.seed);
    let topology = build_topology(cfg, &mut rng);
    let commander = cfg.coordinator_id.unwrap_or(0);
    if commander >= cfg.n {
        bail!("coordinator_id {commander} out of range for n={}", cfg.n);
    }
    if cfg.n < 3 * cfg.m + 1 {
        bail!("n={} cannot tolerate m={} traitors (need n >= 3m+1)", cfg.n, cfg.m);
    }

    let traitor_slots: Vec<usize> = (0..cfg.n).filter(|&s| s != commander).take(cfg.m).collect();
    let mut kernel: Kernel<OralMessages> = Kernel::new(
        topology,
        |slot| {
            if slot == commander {
                oral_messages::Status::Commander
            } else if traitor_slots.contains(&slot) {
                oral_messages::Status::Traitor
            } else {
                oral_messages::Status::Lieutenant
            }
        },
        rng,
        cfg.link_fault(),
        cfg.max_ticks,
    );
    let mut restrictions = BASE_RESTRICTIONS.to_vec();
    restrictions.push(TopologyRestriction::TotalReliability);
    kernel.apply_restrictions(&restrictions)?;

    for node in kernel.nodes_mut() {
        node.memory.m = cfg.m;
        node.memory.global_decision = cfg.decision;
        if node.slot == commander {
            node.memory.decision = cfg.decision;
        }
    }

    // Oral Messages has no standalone "start" payload; the commander's
    // `on_spontaneous` reads memory it was just seeded with above.
    kernel.spontaneously_start(commander, oral_messages::Payload::Decision {
        id: 0,
        decision: cfg.decision,
        m: cfg.m,
        path: vec![],
        n: 0,
    });
    Ok(kernel.run()?)
}
