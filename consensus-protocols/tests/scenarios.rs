//! End-to-end scenario tests driven through the real `consensus_sim::Kernel`
//! rather than calling protocol handlers directly — these exercise the
//! scheduling, topology, and restriction-checking layers together with each
//! protocol's state machine.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use consensus_core::signature::private_key_for;
use consensus_sim::{Kernel, LinkFault, Topology, TopologyRestriction};

use consensus_protocols::byzantine_three_pc::{self, ByzantineThreePc};
use consensus_protocols::oral_messages::{self, OralMessages};
use consensus_protocols::three_pc::{self, ThreePc};
use consensus_protocols::two_pc::{self, TwoPc};

const BASE_RESTRICTIONS: [TopologyRestriction; 3] = [
    TopologyRestriction::BidirectionalLinks,
    TopologyRestriction::Connectivity,
    TopologyRestriction::InitialDistinctValues,
];

#[test]
fn two_pc_happy_path_commits_every_node() {
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let topology = Topology::complete_graph(4, &mut rng);
    let mut kernel: Kernel<TwoPc> = Kernel::new(
        topology,
        |slot| if slot == 0 { two_pc::Status::Coordinator } else { two_pc::Status::Sleep },
        rng,
        LinkFault::Reliable,
        1000,
    );
    let mut restrictions = BASE_RESTRICTIONS.to_vec();
    restrictions.push(TopologyRestriction::TotalReliability);
    kernel.apply_restrictions(&restrictions).unwrap();
    kernel.spontaneously_start(0, two_pc::Payload::Prepare);

    let report = kernel.run().unwrap();
    assert!(report.terminal, "run should quiesce within the tick budget");
    assert!(report.final_statuses.iter().all(|s| s == "Done"));
}

#[test]
fn two_pc_survives_ack_loss_via_retransmission() {
    let mut rng = ChaCha8Rng::seed_from_u64(2);
    let topology = Topology::complete_graph(4, &mut rng);
    let mut kernel: Kernel<TwoPc> = Kernel::new(
        topology,
        |slot| if slot == 0 { two_pc::Status::Coordinator } else { two_pc::Status::Sleep },
        rng,
        LinkFault::DropRate(0.3),
        5000,
    );
    // TotalReliability is deliberately left off these restrictions: this
    // scenario exercises retransmission under a lossy link, which
    // TotalReliability exists to rule out.
    kernel.apply_restrictions(&BASE_RESTRICTIONS).unwrap();
    kernel.spontaneously_start(0, two_pc::Payload::Prepare);

    let report = kernel.run().unwrap();
    assert!(report.terminal, "retransmission via alarms should still reach DONE despite dropped messages");
    assert!(report.final_statuses.iter().all(|s| s == "Done"));
}

#[test]
fn three_pc_aborts_when_ack_never_arrives() {
    // A coordinator that sits in COORDINATOR_WAITING_ACK with no way to
    // collect the missing ACK (one participant with no neighbors of its own
    // to ever loop back through) still aborts cleanly rather than hanging.
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let topology = Topology::complete_graph(3, &mut rng);
    let mut kernel: Kernel<ThreePc> = Kernel::new(
        topology,
        |slot| if slot == 0 { three_pc::Status::Coordinator } else { three_pc::Status::Sleep },
        rng,
        LinkFault::DropRate(0.5),
        5000,
    );
    kernel.apply_restrictions(&BASE_RESTRICTIONS).unwrap();
    kernel.spontaneously_start(0, three_pc::Payload::Prepare);

    let report = kernel.run().unwrap();
    assert!(report.terminal);
    // Every node lands in DONE regardless of whether the run committed or
    // aborted; the point of this scenario is that it never gets stuck.
    assert!(report.final_statuses.iter().all(|s| s == "Done"));
}

#[test]
fn byzantine_three_pc_forged_signature_does_not_join_quorum() {
    let n = 4;
    let m = 1;
    let coordinator = 0;
    let mut rng = ChaCha8Rng::seed_from_u64(4);
    let topology = Topology::complete_graph(n, &mut rng);
    let faulty_slots: Vec<usize> = (0..n).filter(|&s| s != coordinator).take(m).collect();

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
        LinkFault::Reliable,
        2000,
    );
    kernel.apply_restrictions(&BASE_RESTRICTIONS).unwrap();

    for node in kernel.nodes_mut() {
        node.memory.n = n;
        node.memory.m = m;
        node.memory.private_key = private_key_for(node.unique_value);
    }

    kernel.spontaneously_start(coordinator, byzantine_three_pc::Payload::TimeoutPrepared);
    let report = kernel.run().unwrap();

    assert!(report.terminal, "honest quorum of n-1 should still let the coordinator finish");
    let honest_done = report
        .final_statuses
        .iter()
        .enumerate()
        .filter(|(slot, _)| !faulty_slots.contains(slot))
        .all(|(_, status)| status == "Done");
    assert!(honest_done, "every honest node should reach DONE despite the FAULTY node's forgeries");
}

#[test]
fn oral_messages_honest_run_reaches_attack_on_attack_order() {
    let n = 4;
    let m = 1;
    let commander = 0;
    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let topology = Topology::complete_graph(n, &mut rng);
    let traitor_slots: Vec<usize> = (0..n).filter(|&s| s != commander).take(m).collect();

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
        LinkFault::Reliable,
        2000,
    );
    let mut restrictions = BASE_RESTRICTIONS.to_vec();
    restrictions.push(TopologyRestriction::TotalReliability);
    kernel.apply_restrictions(&restrictions).unwrap();

    for node in kernel.nodes_mut() {
        node.memory.m = m;
        node.memory.global_decision = true;
        if node.slot == commander {
            node.memory.decision = true;
        }
    }

    kernel.spontaneously_start(
        commander,
        oral_messages::Payload::Decision { id: 0, decision: true, m, path: vec![], n: 0 },
    );
    let report = kernel.run().unwrap();

    assert!(report.terminal);
    let honest_lieutenants = report
        .final_statuses
        .iter()
        .enumerate()
        .filter(|(slot, _)| *slot != commander && !traitor_slots.contains(slot));
    for (_, status) in honest_lieutenants {
        assert_eq!(status, "Attack", "n >= 3m+1 with one traitor must still reach agreement on ATTACK");
    }
}

#[test]
fn oral_messages_commander_itself_finishes_done_not_a_lieutenant_status() {
    let n = 4;
    let mut rng = ChaCha8Rng::seed_from_u64(6);
    let topology = Topology::complete_graph(n, &mut rng);
    let mut kernel: Kernel<OralMessages> = Kernel::new(
        topology,
        |slot| if slot == 0 { oral_messages::Status::Commander } else { oral_messages::Status::Lieutenant },
        rng,
        LinkFault::Reliable,
        2000,
    );
    let mut restrictions = BASE_RESTRICTIONS.to_vec();
    restrictions.push(TopologyRestriction::TotalReliability);
    kernel.apply_restrictions(&restrictions).unwrap();
    for node in kernel.nodes_mut() {
        node.memory.m = 0;
        node.memory.global_decision = false;
        if node.slot == 0 {
            node.memory.decision = false;
        }
    }
    kernel.spontaneously_start(
        0,
        oral_messages::Payload::Decision { id: 0, decision: false, m: 0, path: vec![], n: 0 },
    );
    let report = kernel.run().unwrap();
    assert_eq!(report.final_statuses[0], "Done");
}
