//! Signed-message Byzantine-tolerant Three-Phase Commit. Every honest send
//! carries a signature over a canonical string; every honest receive
//! verifies it against the asserted sender id and silently drops forgeries.
//! `FAULTY` nodes equivocate: split the rest of their neighbors in half,
//! send a signed Commit to one half and a signed Abort to the other, forge
//! a message to the coordinator claiming to be node id 3, and still answer
//! the actual sender with a protocol-conformant reply.
//!
//! Two quirks are reproduced rather than fixed: the quorum constant is
//! `n - 1`, not `n - m - 1`, and the FAULTY handler's Abort-headed payload
//! carries `decision: true` — the same value as its Commit-headed payload —
//! rather than `false`, an inconsistency between `header` and
//! `data.decision`.

use std::collections::HashMap;

use consensus_core::signature::sign;
use consensus_core::{ConsensusError, Envelope, Node, NodeAlgorithm, NodeId, Runtime, SlotId};
use tracing::{debug, info, warn};

use crate::ALARM_DELAY_TICKS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Coordinator,
    CoordinatorWaitingPrepared,
    CoordinatorWaitingAck,
    CoordinatorWaitingDone,
    CoordinatorAborting,
    Sleep,
    WaitingPrecommit,
    WaitingCommit,
    Faulty,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Vote {
    Sleep,
    Prepared,
    Ack,
    Done,
    Aborted,
}

#[derive(Debug, Clone, Default)]
pub struct Memory {
    pub m: usize,
    pub n: usize,
    pub prepare_votes: HashMap<NodeId, (bool, String)>,
    pub ack_votes: HashMap<NodeId, String>,
    node_status: HashMap<SlotId, Vote>,
    pub private_key: String,
}

#[derive(Debug, Clone)]
pub enum Payload {
    Prepare { coordinator_id: NodeId, signature: String },
    Prepared { id: NodeId, decision: bool, signature: String },
    PreCommit { coordinator_id: NodeId, signature: String },
    Ack { id: NodeId, signature: String },
    Commit { coordinator_id: NodeId, signature: String, decision: bool },
    Done { id: NodeId, signature: String },
    Abort { coordinator_id: NodeId, signature: String, decision: bool },
    Aborted { id: NodeId, signature: String },
    TimeoutPrepared,
    TimeoutAck { neighbor: SlotId },
    TimeoutDone { neighbor: SlotId },
    TimeoutAbort { neighbor: SlotId },
}

fn bit(decision: bool) -> u8 {
    if decision {
        1
    } else {
        0
    }
}

pub struct ByzantineThreePc;

fn send_abort(node: &mut Node<ByzantineThreePc>, rt: &mut dyn Runtime<Payload>) {
    let id = node.unique_value;
    let signature = sign(&format!("abort:{id}"), &node.memory.private_key);
    let neighbors = node.neighbor_slots();
    info!(node = id, "sending signed ABORT to all replicas");
    rt.send(
        node.slot,
        Envelope::new(
            Payload::Abort { coordinator_id: id, signature, decision: false },
            neighbors.clone(),
        ),
    );
    for &n in &neighbors {
        rt.set_alarm(node.slot, ALARM_DELAY_TICKS, Envelope::reply_to(Payload::TimeoutAbort { neighbor: n }, node.slot));
    }
    node.status = Status::CoordinatorAborting;
}

/// The FAULTY adversary's response to any protocol message: split the
/// remaining neighbors in half, send each half a differently signed
/// decision, and separately forge a message to the coordinator claiming to
/// be node id 3.
fn faulty_equivocate(node: &mut Node<ByzantineThreePc>, source: SlotId, rt: &mut dyn Runtime<Payload>) {
    let id = node.unique_value;
    let key = node.memory.private_key.clone();

    let mut neighbors = node.neighbor_slots();
    neighbors.retain(|&s| s != source);
    let half = neighbors.len() / 2;
    let (first_half, second_half) = neighbors.split_at(half);

    let commit_signature = sign(&format!("commit:{id}:1"), &key);
    rt.send(
        node.slot,
        Envelope::new(
            Payload::Commit { coordinator_id: id, signature: commit_signature, decision: true },
            first_half.to_vec(),
        ),
    );

    let abort_signature = sign(&format!("abort:{id}:0"), &key);
    rt.send(
        node.slot,
        Envelope::new(
            Payload::Abort { coordinator_id: id, signature: abort_signature, decision: true },
            second_half.to_vec(),
        ),
    );

    let forged_signature = sign("abort:3:0", &key);
    rt.send(
        node.slot,
        Envelope::reply_to(Payload::Abort { coordinator_id: id, signature: forged_signature, decision: true }, source),
    );

    warn!(node = id, "FAULTY node sent conflicting signed responses");
}

impl NodeAlgorithm for ByzantineThreePc {
    type Payload = Payload;
    type Status = Status;
    type Memory = Memory;

    fn is_terminal(status: Status) -> bool {
        status == Status::Done
    }

    fn on_spontaneous(
        node: &mut Node<Self>,
        rt: &mut dyn Runtime<Payload>,
    ) -> Result<(), ConsensusError> {
        let neighbors = node.neighbor_slots();
        node.memory.node_status = neighbors.iter().map(|&s| (s, Vote::Sleep)).collect();

        let id = node.unique_value;
        let signature = sign(&format!("prepare:{id}"), &node.memory.private_key);
        info!(node = id, quorum = node.memory.n.saturating_sub(1), "coordinator sending signed PREPARE");
        rt.send(node.slot, Envelope::new(Payload::Prepare { coordinator_id: id, signature }, neighbors));
        rt.set_alarm(node.slot, ALARM_DELAY_TICKS, Envelope::reply_to(Payload::TimeoutPrepared, node.slot));
        node.status = Status::CoordinatorWaitingPrepared;
        Ok(())
    }

    fn on_message(
        node: &mut Node<Self>,
        source: SlotId,
        payload: Payload,
        rt: &mut dyn Runtime<Payload>,
    ) -> Result<(), ConsensusError> {
        let quorum = node.memory.n.saturating_sub(1);

        match (node.status, payload) {
            (Status::CoordinatorWaitingPrepared, Payload::Prepared { id, decision, signature }) => {
                let data_str = format!("prepared:{id}:{}", bit(decision));
                if !consensus_core::signature::verify(&data_str, &signature, id) {
                    warn!(node = node.unique_value, claimed = id, "rejecting PREPARED: invalid signature");
                    return Ok(());
                }
                node.memory.prepare_votes.insert(id, (decision, signature));
                node.memory.node_status.insert(source, Vote::Prepared);
                info!(node = node.unique_value, from = id, decision, "valid signed PREPARED");

                if !decision {
                    info!(node = node.unique_value, "ABORT vote received, aborting transaction");
                    send_abort(node, rt);
                    return Ok(());
                }

                if node.memory.prepare_votes.len() >= quorum {
                    let commit_votes = node.memory.prepare_votes.values().filter(|(d, _)| *d).count();
                    if commit_votes >= quorum {
                        info!(node = node.unique_value, commit_votes, quorum, "QUORUM achieved, sending PRECOMMIT");
                        let coord_id = node.unique_value;
                        let signature = sign(&format!("precommit:{coord_id}"), &node.memory.private_key);
                        let neighbors = node.neighbor_slots();
                        rt.send(node.slot, Envelope::new(Payload::PreCommit { coordinator_id: coord_id, signature }, neighbors.clone()));
                        for &n in &neighbors {
                            rt.set_alarm(node.slot, ALARM_DELAY_TICKS, Envelope::reply_to(Payload::TimeoutAck { neighbor: n }, node.slot));
                        }
                        node.status = Status::CoordinatorWaitingAck;
                    } else {
                        info!(node = node.unique_value, "quorum reached but not enough commits, aborting");
                        send_abort(node, rt);
                    }
                }
                Ok(())
            }
            (Status::CoordinatorWaitingAck, Payload::Ack { id, signature }) => {
                let data_str = format!("ack:{id}");
                if !consensus_core::signature::verify(&data_str, &signature, id) {
                    warn!(node = node.unique_value, claimed = id, "rejecting ACK: invalid signature");
                    return Ok(());
                }
                node.memory.ack_votes.insert(id, signature);
                node.memory.node_status.insert(source, Vote::Ack);
                info!(node = node.unique_value, from = id, "valid signed ACK");

                if node.memory.ack_votes.len() >= quorum {
                    info!(node = node.unique_value, quorum, "ACK QUORUM achieved, sending COMMIT");
                    let coord_id = node.unique_value;
                    let signature = sign(&format!("commit:{coord_id}"), &node.memory.private_key);
                    let neighbors = node.neighbor_slots();
                    rt.send(node.slot, Envelope::new(Payload::Commit { coordinator_id: coord_id, signature, decision: true }, neighbors.clone()));
                    for &n in &neighbors {
                        rt.set_alarm(node.slot, ALARM_DELAY_TICKS, Envelope::reply_to(Payload::TimeoutDone { neighbor: n }, node.slot));
                    }
                    node.status = Status::CoordinatorWaitingDone;
                }
                Ok(())
            }
            (Status::CoordinatorWaitingDone, Payload::Done { id, signature }) => {
                let data_str = format!("done:{id}");
                if !consensus_core::signature::verify(&data_str, &signature, id) {
                    warn!(node = node.unique_value, claimed = id, "rejecting DONE: invalid signature");
                    return Ok(());
                }
                node.memory.node_status.insert(source, Vote::Done);
                let done_count = node.memory.node_status.values().filter(|v| **v == Vote::Done).count();
                info!(node = node.unique_value, from = id, "valid signed DONE");
                if done_count >= quorum {
                    info!(node = node.unique_value, "CONSENSUS ACHIEVED, all honest replicas committed");
                    node.status = Status::Done;
                }
                Ok(())
            }
            (Status::CoordinatorAborting, Payload::Aborted { .. }) => {
                node.memory.node_status.insert(source, Vote::Aborted);
                let aborted_count = node.memory.node_status.values().filter(|v| **v == Vote::Aborted).count();
                if aborted_count >= quorum {
                    info!(node = node.unique_value, "abort confirmations received, transaction aborted");
                    node.status = Status::Done;
                }
                Ok(())
            }
            (Status::Sleep, Payload::Prepare { coordinator_id, signature }) => {
                let data_str = format!("prepare:{coordinator_id}");
                if !consensus_core::signature::verify(&data_str, &signature, coordinator_id) {
                    warn!(node = node.unique_value, claimed = coordinator_id, "rejecting PREPARE: invalid signature");
                    return Ok(());
                }
                let id = node.unique_value;
                let signature = sign(&format!("prepared:{id}:1"), &node.memory.private_key);
                info!(node = id, from = coordinator_id, "valid signed PREPARE, sending signed PREPARED");
                rt.send(node.slot, Envelope::reply_to(Payload::Prepared { id, decision: true, signature }, source));
                node.status = Status::WaitingPrecommit;
                Ok(())
            }
            (Status::WaitingPrecommit, Payload::PreCommit { coordinator_id, signature }) => {
                let data_str = format!("precommit:{coordinator_id}");
                if !consensus_core::signature::verify(&data_str, &signature, coordinator_id) {
                    warn!(node = node.unique_value, claimed = coordinator_id, "rejecting PRECOMMIT: invalid signature");
                    return Ok(());
                }
                let id = node.unique_value;
                let signature = sign(&format!("ack:{id}"), &node.memory.private_key);
                rt.send(node.slot, Envelope::reply_to(Payload::Ack { id, signature }, source));
                node.status = Status::WaitingCommit;
                Ok(())
            }
            (Status::WaitingPrecommit, Payload::Abort { coordinator_id, signature, .. }) => {
                let data_str = format!("abort:{coordinator_id}");
                if !consensus_core::signature::verify(&data_str, &signature, coordinator_id) {
                    warn!(node = node.unique_value, claimed = coordinator_id, "rejecting ABORT: invalid signature");
                    return Ok(());
                }
                let id = node.unique_value;
                let signature = sign(&format!("aborted:{id}"), &node.memory.private_key);
                rt.send(node.slot, Envelope::reply_to(Payload::Aborted { id, signature }, source));
                node.status = Status::Done;
                Ok(())
            }
            (Status::WaitingPrecommit, Payload::Prepare { .. }) => {
                debug!(node = node.unique_value, "duplicate PREPARE, resending PREPARED");
                let id = node.unique_value;
                let signature = sign(&format!("prepared:{id}:1"), &node.memory.private_key);
                rt.send(node.slot, Envelope::reply_to(Payload::Prepared { id, decision: true, signature }, source));
                Ok(())
            }
            (Status::WaitingCommit, Payload::Commit { coordinator_id, signature, .. }) => {
                let data_str = format!("commit:{coordinator_id}");
                if !consensus_core::signature::verify(&data_str, &signature, coordinator_id) {
                    warn!(node = node.unique_value, claimed = coordinator_id, "rejecting COMMIT: invalid signature");
                    return Ok(());
                }
                let id = node.unique_value;
                info!(node = id, "valid signed COMMIT, committing");
                let signature = sign(&format!("done:{id}"), &node.memory.private_key);
                rt.send(node.slot, Envelope::reply_to(Payload::Done { id, signature }, source));
                node.status = Status::Done;
                Ok(())
            }
            (Status::WaitingCommit, Payload::Abort { coordinator_id, signature, .. }) => {
                let data_str = format!("abort:{coordinator_id}");
                if !consensus_core::signature::verify(&data_str, &signature, coordinator_id) {
                    warn!(node = node.unique_value, claimed = coordinator_id, "rejecting ABORT: invalid signature");
                    return Ok(());
                }
                let id = node.unique_value;
                let signature = sign(&format!("aborted:{id}"), &node.memory.private_key);
                rt.send(node.slot, Envelope::reply_to(Payload::Aborted { id, signature }, source));
                node.status = Status::Done;
                Ok(())
            }
            (Status::WaitingCommit, Payload::PreCommit { .. }) => {
                debug!(node = node.unique_value, "duplicate PRECOMMIT, resending ACK");
                let id = node.unique_value;
                let signature = sign(&format!("ack:{id}"), &node.memory.private_key);
                rt.send(node.slot, Envelope::reply_to(Payload::Ack { id, signature }, source));
                Ok(())
            }
            (Status::Faulty, Payload::Prepare { .. }) => {
                faulty_equivocate(node, source, rt);
                let id = node.unique_value;
                let signature = sign(&format!("prepared:{id}:1"), &node.memory.private_key);
                rt.send(node.slot, Envelope::reply_to(Payload::Prepared { id, decision: true, signature }, source));
                Ok(())
            }
            (Status::Faulty, Payload::PreCommit { .. }) => {
                faulty_equivocate(node, source, rt);
                let id = node.unique_value;
                let signature = sign(&format!("ack:{id}"), &node.memory.private_key);
                rt.send(node.slot, Envelope::reply_to(Payload::Ack { id, signature }, source));
                Ok(())
            }
            (Status::Faulty, Payload::Commit { .. }) => {
                node.status = Status::Done;
                faulty_equivocate(node, source, rt);
                let id = node.unique_value;
                let signature = sign(&format!("done:{id}"), &node.memory.private_key);
                rt.send(node.slot, Envelope::reply_to(Payload::Done { id, signature }, source));
                Ok(())
            }
            (Status::Faulty, Payload::Abort { .. }) => {
                node.status = Status::Done;
                faulty_equivocate(node, source, rt);
                let id = node.unique_value;
                let signature = sign(&format!("aborted:{id}"), &node.memory.private_key);
                rt.send(node.slot, Envelope::reply_to(Payload::Aborted { id, signature }, source));
                Ok(())
            }
            (Status::Faulty, Payload::Aborted { .. }) => {
                node.status = Status::Done;
                faulty_equivocate(node, source, rt);
                Ok(())
            }
            (Status::Done, Payload::Commit { .. }) => {
                debug!(node = node.unique_value, "duplicate COMMIT in DONE, resending DONE");
                let id = node.unique_value;
                let signature = sign(&format!("done:{id}"), &node.memory.private_key);
                rt.send(node.slot, Envelope::reply_to(Payload::Done { id, signature }, source));
                Ok(())
            }
            (Status::Done, Payload::Abort { .. }) => {
                debug!(node = node.unique_value, "duplicate ABORT in DONE, resending ABORTED");
                let id = node.unique_value;
                let signature = sign(&format!("aborted:{id}"), &node.memory.private_key);
                rt.send(node.slot, Envelope::reply_to(Payload::Aborted { id, signature }, source));
                Ok(())
            }
            (Status::Done, _) => Err(ConsensusError::UnexpectedMessage(node.slot)),
            (status, _) => {
                warn!(node = node.unique_value, ?status, from = source, "unexpected header in state, dropping");
                Ok(())
            }
        }
    }

    fn on_alarm(
        node: &mut Node<Self>,
        payload: Payload,
        rt: &mut dyn Runtime<Payload>,
    ) -> Result<(), ConsensusError> {
        match (node.status, payload) {
            (Status::CoordinatorWaitingPrepared, Payload::TimeoutPrepared) => {
                let mut pending = false;
                for (&neighbor, vote) in node.memory.node_status.clone().iter() {
                    if *vote == Vote::Sleep {
                        pending = true;
                        let id = node.unique_value;
                        let signature = sign(&format!("prepare:{id}"), &node.memory.private_key);
                        info!(node = id, neighbor, "no PREPARED yet, resending signed PREPARE");
                        rt.send(node.slot, Envelope::reply_to(Payload::Prepare { coordinator_id: id, signature }, neighbor));
                    }
                }
                if pending {
                    rt.set_alarm(node.slot, ALARM_DELAY_TICKS, Envelope::reply_to(Payload::TimeoutPrepared, node.slot));
                }
                Ok(())
            }
            (Status::CoordinatorWaitingAck, Payload::TimeoutAck { neighbor }) => {
                if node.memory.node_status.get(&neighbor) != Some(&Vote::Ack) {
                    info!(node = node.unique_value, neighbor, "timed out waiting for ACK, aborting");
                    send_abort(node, rt);
                }
                Ok(())
            }
            (Status::CoordinatorWaitingDone, Payload::TimeoutDone { neighbor }) => {
                if node.memory.node_status.get(&neighbor) != Some(&Vote::Done) {
                    let id = node.unique_value;
                    let signature = sign(&format!("commit:{id}"), &node.memory.private_key);
                    info!(node = id, neighbor, "timed out waiting for DONE, resending signed COMMIT");
                    rt.send(node.slot, Envelope::reply_to(Payload::Commit { coordinator_id: id, signature, decision: true }, neighbor));
                    rt.set_alarm(node.slot, ALARM_DELAY_TICKS, Envelope::reply_to(Payload::TimeoutDone { neighbor }, node.slot));
                }
                Ok(())
            }
            (Status::CoordinatorAborting, Payload::TimeoutAbort { neighbor }) => {
                if node.memory.node_status.get(&neighbor) != Some(&Vote::Aborted) {
                    let id = node.unique_value;
                    let signature = sign(&format!("abort:{id}"), &node.memory.private_key);
                    info!(node = id, neighbor, "resending signed ABORT");
                    rt.send(node.slot, Envelope::reply_to(Payload::Abort { coordinator_id: id, signature, decision: false }, neighbor));
                    rt.set_alarm(node.slot, ALARM_DELAY_TICKS, Envelope::reply_to(Payload::TimeoutAbort { neighbor }, node.slot));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consensus_core::signature::{private_key_for, verify};

    struct NullRuntime {
        neighbors: Vec<SlotId>,
        sent: Vec<(Vec<SlotId>, Payload)>,
    }

    impl Runtime<Payload> for NullRuntime {
        fn current_tick(&self) -> u64 {
            0
        }
        fn neighbor_slots(&self, _of: SlotId) -> Vec<SlotId> {
            self.neighbors.clone()
        }
        fn send(&mut self, _from: SlotId, msg: Envelope<Payload>) {
            self.sent.push((msg.destination.targets(), msg.data));
        }
        fn set_alarm(&mut self, _target: SlotId, _delay_ticks: u64, _msg: Envelope<Payload>) {}
    }

    #[test]
    fn forged_signature_is_rejected() {
        let mut node: Node<ByzantineThreePc> = Node::new(0, 1, Status::CoordinatorWaitingPrepared);
        node.memory.n = 4;
        node.memory.private_key = private_key_for(1);
        let mut rt = NullRuntime { neighbors: vec![1, 2, 3], sent: vec![] };

        let forged_sig = sign("prepared:3:1", &private_key_for(99));
        ByzantineThreePc::on_message(
            &mut node,
            2,
            Payload::Prepared { id: 3, decision: true, signature: forged_sig },
            &mut rt,
        )
        .unwrap();

        assert!(!node.memory.prepare_votes.contains_key(&3));
    }

    #[test]
    fn valid_signature_is_accepted_into_quorum() {
        let mut node: Node<ByzantineThreePc> = Node::new(0, 1, Status::CoordinatorWaitingPrepared);
        node.memory.n = 4;
        node.memory.private_key = private_key_for(1);
        let mut rt = NullRuntime { neighbors: vec![1, 2, 3], sent: vec![] };

        let sig = sign("prepared:2:1", &private_key_for(2));
        ByzantineThreePc::on_message(
            &mut node,
            0,
            Payload::Prepared { id: 2, decision: true, signature: sig },
            &mut rt,
        )
        .unwrap();

        assert!(node.memory.prepare_votes.contains_key(&2));
    }

    #[test]
    fn faulty_abort_payload_carries_inconsistent_decision() {
        let mut node: Node<ByzantineThreePc> = Node::new(1, 2, Status::Faulty);
        node.memory.private_key = private_key_for(2);
        let mut rt = NullRuntime { neighbors: vec![0, 3, 4, 5], sent: vec![] };

        let coord_sig = sign("prepare:1", &private_key_for(1));
        ByzantineThreePc::on_message(
            &mut node,
            0,
            Payload::Prepare { coordinator_id: 1, signature: coord_sig },
            &mut rt,
        )
        .unwrap();

        let abort_sent = rt.sent.iter().find(|(_, p)| matches!(p, Payload::Abort { decision: true, .. }));
        assert!(abort_sent.is_some(), "FAULTY's abort-directed payload should still carry decision=true, matching the source quirk");
    }

    #[test]
    fn round_trip_signature_still_verifies() {
        let key = private_key_for(7);
        let sig = sign("done:7", &key);
        assert!(verify("done:7", &sig, 7));
    }
}
