//! Classical Two-Phase Commit. Participants always vote commit in this
//! model; the `decision: 0` branch in the coordinator's `Prepared` handler
//! is kept anyway, preserved for the day a participant implementation votes
//! otherwise.

use std::collections::HashMap;

use consensus_core::{ConsensusError, Envelope, Node, NodeAlgorithm, Runtime, SlotId};
use tracing::{debug, info, warn};

use crate::ALARM_DELAY_TICKS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Coordinator,
    CoordinatorWaitingPrepared,
    CoordinatorWaitingAck,
    Sleep,
    Waiting,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Commit,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Vote {
    Sleep,
    Prepared,
    Ack,
}

#[derive(Debug, Clone, Default)]
pub struct Memory {
    count: usize,
    node_status: HashMap<SlotId, Vote>,
    pub decision: Option<Decision>,
}

#[derive(Debug, Clone)]
pub enum Payload {
    Prepare,
    Prepared { decision: bool },
    Commit,
    Abort,
    Ack,
    TimeoutPrepared,
    TimeoutAck { neighbor: SlotId },
}

pub struct TwoPc;

impl NodeAlgorithm for TwoPc {
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
        node.memory.count = neighbors.len();
        node.memory.node_status = neighbors.iter().map(|&s| (s, Vote::Sleep)).collect();

        info!(node = node.unique_value, "coordinator sending Prepare to all neighbors");
        rt.send(node.slot, Envelope::new(Payload::Prepare, neighbors));
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
        match (node.status, payload) {
            (Status::CoordinatorWaitingPrepared, Payload::Prepared { decision }) => {
                node.memory.count -= 1;
                if !decision {
                    node.memory.decision = Some(Decision::Abort);
                    info!(node = node.unique_value, from = source, "received PREPARED(abort)");
                    let neighbors = node.neighbor_slots();
                    rt.send(node.slot, Envelope::new(Payload::Abort, neighbors.clone()));
                    for &n in &neighbors {
                        rt.set_alarm(node.slot, ALARM_DELAY_TICKS, Envelope::reply_to(Payload::TimeoutAck { neighbor: n }, node.slot));
                    }
                    node.memory.count = neighbors.len();
                    node.status = Status::CoordinatorWaitingAck;
                    return Ok(());
                }

                debug!(node = node.unique_value, from = source, "received PREPARED(commit)");
                node.memory.node_status.insert(source, Vote::Prepared);

                if node.memory.count == 0 {
                    node.memory.decision = Some(Decision::Commit);
                    info!(node = node.unique_value, "all PREPARED received, sending COMMIT");
                    let neighbors = node.neighbor_slots();
                    rt.send(node.slot, Envelope::new(Payload::Commit, neighbors.clone()));
                    for &n in &neighbors {
                        rt.set_alarm(node.slot, ALARM_DELAY_TICKS, Envelope::reply_to(Payload::TimeoutAck { neighbor: n }, node.slot));
                    }
                    node.memory.count = neighbors.len();
                    node.status = Status::CoordinatorWaitingAck;
                }
                Ok(())
            }
            (Status::CoordinatorWaitingAck, Payload::Ack) => {
                node.memory.count -= 1;
                node.memory.node_status.insert(source, Vote::Ack);
                if node.memory.count == 0 {
                    info!(node = node.unique_value, "all ACK received, DONE");
                    node.status = Status::Done;
                }
                Ok(())
            }
            (Status::Sleep, Payload::Prepare) => {
                info!(node = node.unique_value, from = source, "received PREPARE, sending PREPARED");
                rt.send(node.slot, Envelope::reply_to(Payload::Prepared { decision: true }, source));
                node.status = Status::Waiting;
                Ok(())
            }
            (Status::Waiting, Payload::Commit) | (Status::Waiting, Payload::Abort) => {
                debug!(node = node.unique_value, from = source, "received final decision, sending ACK");
                rt.send(node.slot, Envelope::reply_to(Payload::Ack, source));
                node.status = Status::Done;
                Ok(())
            }
            (Status::Waiting, Payload::Prepare) => {
                debug!(node = node.unique_value, "duplicate PREPARE, resending PREPARED");
                rt.send(node.slot, Envelope::reply_to(Payload::Prepared { decision: true }, source));
                Ok(())
            }
            (Status::Done, Payload::Commit) | (Status::Done, Payload::Abort) => {
                debug!(node = node.unique_value, "duplicate decision in DONE, resending ACK");
                rt.send(node.slot, Envelope::reply_to(Payload::Ack, source));
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
                        info!(node = node.unique_value, neighbor, "no PREPARED yet, resending PREPARE");
                        rt.send(node.slot, Envelope::reply_to(Payload::Prepare, neighbor));
                    }
                }
                if pending {
                    rt.set_alarm(node.slot, ALARM_DELAY_TICKS, Envelope::reply_to(Payload::TimeoutPrepared, node.slot));
                }
                Ok(())
            }
            (Status::CoordinatorWaitingAck, Payload::TimeoutAck { neighbor }) => {
                if node.memory.node_status.get(&neighbor) != Some(&Vote::Ack) {
                    let decision = node.memory.decision.expect("decision set before COORDINATOR_WAITING_ACK");
                    info!(node = node.unique_value, neighbor, "timed out waiting for ACK, resending decision");
                    let payload = match decision {
                        Decision::Commit => Payload::Commit,
                        Decision::Abort => Payload::Abort,
                    };
                    rt.send(node.slot, Envelope::reply_to(payload, neighbor));
                    rt.set_alarm(node.slot, ALARM_DELAY_TICKS, Envelope::reply_to(Payload::TimeoutAck { neighbor }, node.slot));
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

    struct NullRuntime {
        neighbors: Vec<SlotId>,
    }

    impl Runtime<Payload> for NullRuntime {
        fn current_tick(&self) -> u64 {
            0
        }
        fn neighbor_slots(&self, _of: SlotId) -> Vec<SlotId> {
            self.neighbors.clone()
        }
        fn send(&mut self, _from: SlotId, _msg: Envelope<Payload>) {}
        fn set_alarm(&mut self, _target: SlotId, _delay_ticks: u64, _msg: Envelope<Payload>) {}
    }

    #[test]
    fn coordinator_spontaneous_start_arms_timeout_and_waits() {
        let mut node: Node<TwoPc> = Node::new(0, 1, Status::Coordinator);
        node.add_neighbor(1);
        node.add_neighbor(2);
        let mut rt = NullRuntime { neighbors: vec![1, 2] };
        TwoPc::on_spontaneous(&mut node, &mut rt).unwrap();
        assert_eq!(node.status, Status::CoordinatorWaitingPrepared);
        assert_eq!(node.memory.count, 2);
    }

    #[test]
    fn participant_votes_commit_on_prepare() {
        let mut node: Node<TwoPc> = Node::new(1, 2, Status::Sleep);
        node.add_neighbor(0);
        let mut rt = NullRuntime { neighbors: vec![0] };
        TwoPc::on_message(&mut node, 0, Payload::Prepare, &mut rt).unwrap();
        assert_eq!(node.status, Status::Waiting);
    }

    #[test]
    fn done_rejects_unrelated_message() {
        let mut node: Node<TwoPc> = Node::new(1, 2, Status::Done);
        let mut rt = NullRuntime { neighbors: vec![] };
        let err = TwoPc::on_message(&mut node, 0, Payload::Prepare, &mut rt);
        assert!(err.is_err());
    }

    #[test]
    fn done_resends_ack_on_duplicate_commit() {
        let mut node: Node<TwoPc> = Node::new(1, 2, Status::Done);
        let mut rt = NullRuntime { neighbors: vec![] };
        TwoPc::on_message(&mut node, 0, Payload::Commit, &mut rt).unwrap();
        assert_eq!(node.status, Status::Done);
    }
}
