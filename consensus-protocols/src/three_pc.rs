//! Classical Three-Phase Commit. Adds a PreCommit round over [`two_pc`] so
//! the coordinator can safely abort on a missing ACK instead of retrying
//! forever: once every participant has acknowledged PreCommit, no
//! participant has committed yet, so a stalled coordinator can still pull
//! the whole transaction back.

use std::collections::HashMap;

use consensus_core::{ConsensusError, Envelope, Node, NodeAlgorithm, Runtime, SlotId};
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
    Waiting,
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
    count: usize,
    node_status: HashMap<SlotId, Vote>,
}

#[derive(Debug, Clone)]
pub enum Payload {
    Prepare,
    Prepared { decision: bool },
    PreCommit,
    Ack,
    Commit,
    Done,
    Abort,
    Aborted,
    TimeoutPrepared,
    TimeoutAck { neighbor: SlotId },
    TimeoutDone { neighbor: SlotId },
    TimeoutAbort { neighbor: SlotId },
}

pub struct ThreePc;

fn broadcast_abort(node: &mut Node<ThreePc>, rt: &mut dyn Runtime<Payload>) {
    let neighbors = node.neighbor_slots();
    info!(node = node.unique_value, "broadcasting ABORT");
    rt.send(node.slot, Envelope::new(Payload::Abort, neighbors.clone()));
    for &n in &neighbors {
        rt.set_alarm(node.slot, ALARM_DELAY_TICKS, Envelope::reply_to(Payload::TimeoutAbort { neighbor: n }, node.slot));
    }
    node.memory.count = neighbors.len();
    node.status = Status::CoordinatorAborting;
}

impl NodeAlgorithm for ThreePc {
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
                    info!(node = node.unique_value, from = source, "received PREPARED(abort)");
                    broadcast_abort(node, rt);
                    return Ok(());
                }

                debug!(node = node.unique_value, from = source, "received PREPARED(commit)");
                node.memory.node_status.insert(source, Vote::Prepared);

                if node.memory.count == 0 {
                    info!(node = node.unique_value, "all PREPARED received, sending PRECOMMIT");
                    let neighbors = node.neighbor_slots();
                    rt.send(node.slot, Envelope::new(Payload::PreCommit, neighbors.clone()));
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
                    info!(node = node.unique_value, "all ACK received, sending COMMIT");
                    let neighbors = node.neighbor_slots();
                    rt.send(node.slot, Envelope::new(Payload::Commit, neighbors.clone()));
                    for &n in &neighbors {
                        rt.set_alarm(node.slot, ALARM_DELAY_TICKS, Envelope::reply_to(Payload::TimeoutDone { neighbor: n }, node.slot));
                    }
                    node.memory.count = neighbors.len();
                    node.status = Status::CoordinatorWaitingDone;
                }
                Ok(())
            }
            (Status::CoordinatorWaitingDone, Payload::Done) => {
                node.memory.count -= 1;
                node.memory.node_status.insert(source, Vote::Done);
                if node.memory.count == 0 {
                    info!(node = node.unique_value, "all DONE received, DONE");
                    node.status = Status::Done;
                }
                Ok(())
            }
            (Status::CoordinatorAborting, Payload::Aborted) => {
                node.memory.count -= 1;
                node.memory.node_status.insert(source, Vote::Aborted);
                if node.memory.count == 0 {
                    info!(node = node.unique_value, "all ABORTED received, DONE");
                    node.status = Status::Done;
                }
                Ok(())
            }
            (Status::Sleep, Payload::Prepare) => {
                info!(node = node.unique_value, from = source, "received PREPARE, sending PREPARED");
                rt.send(node.slot, Envelope::reply_to(Payload::Prepared { decision: true }, source));
                node.status = Status::WaitingPrecommit;
                Ok(())
            }
            (Status::WaitingPrecommit, Payload::PreCommit) => {
                debug!(node = node.unique_value, from = source, "received PRECOMMIT, sending ACK");
                rt.send(node.slot, Envelope::reply_to(Payload::Ack, source));
                node.status = Status::Waiting;
                Ok(())
            }
            (Status::WaitingPrecommit, Payload::Abort) => {
                debug!(node = node.unique_value, from = source, "received ABORT, sending ABORTED");
                rt.send(node.slot, Envelope::reply_to(Payload::Aborted, source));
                node.status = Status::Done;
                Ok(())
            }
            (Status::WaitingPrecommit, Payload::Prepare) => {
                debug!(node = node.unique_value, "duplicate PREPARE, resending PREPARED");
                rt.send(node.slot, Envelope::reply_to(Payload::Prepared { decision: true }, source));
                Ok(())
            }
            (Status::Waiting, Payload::Commit) => {
                debug!(node = node.unique_value, from = source, "received COMMIT, sending DONE");
                rt.send(node.slot, Envelope::reply_to(Payload::Done, source));
                node.status = Status::Done;
                Ok(())
            }
            (Status::Waiting, Payload::Abort) => {
                debug!(node = node.unique_value, from = source, "received ABORT, sending ABORTED");
                rt.send(node.slot, Envelope::reply_to(Payload::Aborted, source));
                node.status = Status::Done;
                Ok(())
            }
            (Status::Waiting, Payload::PreCommit) => {
                debug!(node = node.unique_value, "duplicate PRECOMMIT, resending ACK");
                rt.send(node.slot, Envelope::reply_to(Payload::Ack, source));
                Ok(())
            }
            (Status::Done, Payload::Commit) => {
                debug!(node = node.unique_value, "duplicate COMMIT in DONE, resending DONE");
                rt.send(node.slot, Envelope::reply_to(Payload::Done, source));
                Ok(())
            }
            (Status::Done, Payload::Abort) => {
                debug!(node = node.unique_value, "duplicate ABORT in DONE, resending ABORTED");
                rt.send(node.slot, Envelope::reply_to(Payload::Aborted, source));
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
                    info!(node = node.unique_value, neighbor, "timed out waiting for ACK, aborting");
                    broadcast_abort(node, rt);
                }
                Ok(())
            }
            (Status::CoordinatorWaitingDone, Payload::TimeoutDone { neighbor }) => {
                if node.memory.node_status.get(&neighbor) != Some(&Vote::Done) {
                    info!(node = node.unique_value, neighbor, "timed out waiting for DONE, resending COMMIT");
                    rt.send(node.slot, Envelope::reply_to(Payload::Commit, neighbor));
                }
                Ok(())
            }
            (Status::CoordinatorAborting, Payload::TimeoutAbort { neighbor }) => {
                if node.memory.node_status.get(&neighbor) != Some(&Vote::Aborted) {
                    info!(node = node.unique_value, neighbor, "timed out waiting for ABORTED, resending ABORT");
                    rt.send(node.slot, Envelope::reply_to(Payload::Abort, neighbor));
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
    fn missing_ack_aborts_instead_of_retrying() {
        let mut node: Node<ThreePc> = Node::new(0, 1, Status::CoordinatorWaitingAck);
        node.memory.node_status.insert(2, Vote::Ack);
        node.memory.node_status.insert(3, Vote::Sleep);
        node.memory.count = 1;
        let mut rt = NullRuntime { neighbors: vec![2, 3] };
        ThreePc::on_alarm(&mut node, Payload::TimeoutAck { neighbor: 3 }, &mut rt).unwrap();
        assert_eq!(node.status, Status::CoordinatorAborting);
    }

    #[test]
    fn participant_prepared_then_precommit_then_commit() {
        let mut node: Node<ThreePc> = Node::new(1, 2, Status::Sleep);
        let mut rt = NullRuntime { neighbors: vec![] };
        ThreePc::on_message(&mut node, 0, Payload::Prepare, &mut rt).unwrap();
        assert_eq!(node.status, Status::WaitingPrecommit);
        ThreePc::on_message(&mut node, 0, Payload::PreCommit, &mut rt).unwrap();
        assert_eq!(node.status, Status::Waiting);
        ThreePc::on_message(&mut node, 0, Payload::Commit, &mut rt).unwrap();
        assert_eq!(node.status, Status::Done);
    }

    #[test]
    fn participant_aborts_from_waiting_precommit() {
        let mut node: Node<ThreePc> = Node::new(1, 2, Status::WaitingPrecommit);
        let mut rt = NullRuntime { neighbors: vec![] };
        ThreePc::on_message(&mut node, 0, Payload::Abort, &mut rt).unwrap();
        assert_eq!(node.status, Status::Done);
    }
}
