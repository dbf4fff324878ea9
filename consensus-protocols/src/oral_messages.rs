//! Byzantine Generals / Oral Messages (Lamport-Shostak-Pease).
//! The commander broadcasts an order; every lieutenant relays it to every
//! other lieutenant and recurses `m` levels deep acting as sub-commander;
//! the recursion unwinds bottom-up by majority folding. Tolerates `m`
//! traitors given `n >= 3m + 1`.
//!
//! State is keyed by the variable-length path a `Decision` message has
//! traveled — several recursions at different subtrees coexist in one
//! node's `saved_decisions` at once, and a single incoming message may
//! complete zero, one, or a whole chain of folds.

use std::collections::HashMap;

use consensus_core::{ConsensusError, Envelope, Node, NodeAlgorithm, NodeId, Runtime, SlotId};
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Commander,
    Lieutenant,
    Traitor,
    Attack,
    Retreat,
    Done,
}

#[derive(Debug, Clone, Default)]
struct PathEntry {
    decisions: HashMap<NodeId, bool>,
    total: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Memory {
    /// Commander-only: the order to broadcast.
    pub decision: bool,
    pub m: usize,
    /// Visible to every node — the traitor's lying direction is computed
    /// from this original broadcast value, not from whatever decision the
    /// currently-processed message happens to carry.
    pub global_decision: bool,
    saved_decisions: HashMap<Vec<NodeId>, PathEntry>,
}

#[derive(Debug, Clone)]
pub enum Payload {
    Decision { id: NodeId, decision: bool, m: usize, path: Vec<NodeId>, n: usize },
}

pub struct OralMessages;

fn fold_into_parent(
    node: &mut Node<OralMessages>,
    path: &[NodeId],
    decisions: HashMap<NodeId, bool>,
) -> Result<(), ConsensusError> {
    let majority = majority_decision(&decisions);

    if path.len() == 1 {
        if node.status == Status::Traitor {
            info!(node = node.unique_value, "traitor lieutenant ends its algorithm without deciding");
            return Ok(());
        }
        info!(node = node.unique_value, ?majority, "top-level decision reached");
        node.status = if majority { Status::Attack } else { Status::Retreat };
        return Ok(());
    }

    let father = *path.last().expect("path non-empty, checked above");
    let parent_key = path[..path.len() - 1].to_vec();
    let entry = node
        .memory
        .saved_decisions
        .get_mut(&parent_key)
        .expect("parent path entry must exist: it was created when this recursion was spawned");
    entry.decisions.insert(father, majority);

    if has_all_decisions(&entry.decisions, entry.total)? {
        let decisions = entry.decisions.clone();
        fold_into_parent(node, &parent_key, decisions)?;
    }
    Ok(())
}

/// `|decisions| <= total` must hold at every moment (invariant 5); folding
/// fires exactly when the two are equal.
fn has_all_decisions(decisions: &HashMap<NodeId, bool>, total: usize) -> Result<bool, ConsensusError> {
    if decisions.len() > total {
        return Err(ConsensusError::InvariantViolation(format!(
            "received {} decisions but expected at most {total}",
            decisions.len()
        )));
    }
    Ok(decisions.len() == total)
}

fn majority_decision(decisions: &HashMap<NodeId, bool>) -> bool {
    let attack_count = decisions.values().filter(|&&d| d).count();
    let retreat_count = decisions.values().filter(|&&d| !d).count();
    attack_count > retreat_count
}

fn record_decision(
    node: &mut Node<OralMessages>,
    path: Vec<NodeId>,
    key_id: NodeId,
    decision: bool,
    total: usize,
) -> &mut PathEntry {
    let entry = node.memory.saved_decisions.entry(path).or_insert_with(|| PathEntry {
        decisions: HashMap::new(),
        total,
    });
    entry.decisions.insert(key_id, decision);
    entry
}

fn send_recursion_start(
    node: &mut Node<OralMessages>,
    rt: &mut dyn Runtime<Payload>,
    forward: Payload,
    destinations: Vec<SlotId>,
) {
    if node.status == Status::Traitor {
        let Payload::Decision { id, decision, m, path, n } = forward;
        let half = destinations.len() / 2;
        let (first_half, second_half) = destinations.split_at(half);
        let lied_decision = !node.memory.global_decision;
        info!(
            node = node.unique_value,
            honest = decision,
            lied = lied_decision,
            "traitor lies to second half of recursion targets"
        );
        rt.send(
            node.slot,
            Envelope::new(
                Payload::Decision { id, decision, m, path: path.clone(), n },
                first_half.to_vec(),
            ),
        );
        rt.send(
            node.slot,
            Envelope::new(
                Payload::Decision { id, decision: lied_decision, m, path, n },
                second_half.to_vec(),
            ),
        );
    } else {
        rt.send(node.slot, Envelope::new(forward, destinations));
    }
}

fn receiving(node: &mut Node<OralMessages>, source: SlotId, payload: Payload, rt: &mut dyn Runtime<Payload>) -> Result<(), ConsensusError> {
    let Payload::Decision { id, decision, m, path, n } = payload;
    node.learn_neighbor_id(source, id);

    match m {
        0 => received_zero(node, id, decision, path, n),
        1 => received_one(node, id, decision, path, n, rt),
        _ => received_more_than_one(node, id, decision, m, path, n, rt),
    }
}

fn received_more_than_one(
    node: &mut Node<OralMessages>,
    id: NodeId,
    decision: bool,
    m: usize,
    path: Vec<NodeId>,
    n: usize,
    rt: &mut dyn Runtime<Payload>,
) -> Result<(), ConsensusError> {
    info!(node = node.unique_value, from = id, m, "recursing as sub-commander for m-1");
    let entry = record_decision(node, path.clone(), node.unique_value, decision, n);
    let total = entry.total;

    let mut forward_path = path.clone();
    forward_path.push(node.unique_value);
    let forward = Payload::Decision { id: node.unique_value, decision, m: m - 1, path: forward_path, n: n - 1 };

    let destinations: Vec<SlotId> = node
        .neighbors
        .iter()
        .filter(|slot| slot.id.map(|learned| !path.contains(&learned)).unwrap_or(true))
        .map(|slot| slot.slot)
        .collect();

    send_recursion_start(node, rt, forward, destinations);

    let entry = node.memory.saved_decisions.get(&path).expect("just inserted above");
    if has_all_decisions(&entry.decisions, total)? {
        let decisions = entry.decisions.clone();
        fold_into_parent(node, &path, decisions)?;
    }
    Ok(())
}

fn received_one(
    node: &mut Node<OralMessages>,
    id: NodeId,
    decision: bool,
    path: Vec<NodeId>,
    n: usize,
    rt: &mut dyn Runtime<Payload>,
) -> Result<(), ConsensusError> {
    info!(node = node.unique_value, from = id, "recursing as sub-commander for m=0, path unchanged");
    let entry = record_decision(node, path.clone(), node.unique_value, decision, n);
    let total = entry.total;

    let forward = Payload::Decision { id: node.unique_value, decision, m: 0, path: path.clone(), n };

    let destinations: Vec<SlotId> = node
        .neighbors
        .iter()
        .filter(|slot| slot.id.map(|learned| !path.contains(&learned)).unwrap_or(true))
        .map(|slot| slot.slot)
        .collect();

    send_recursion_start(node, rt, forward, destinations);

    let entry = node.memory.saved_decisions.get(&path).expect("just inserted above");
    if has_all_decisions(&entry.decisions, total)? {
        let decisions = entry.decisions.clone();
        fold_into_parent(node, &path, decisions)?;
    }
    Ok(())
}

fn received_zero(
    node: &mut Node<OralMessages>,
    id: NodeId,
    decision: bool,
    path: Vec<NodeId>,
    n: usize,
) -> Result<(), ConsensusError> {
    info!(node = node.unique_value, from = id, "direct observation, saving decision under sender's claimed id");
    let entry = record_decision(node, path.clone(), id, decision, n);
    let total = entry.total;

    let entry = node.memory.saved_decisions.get(&path).expect("just inserted above");
    if has_all_decisions(&entry.decisions, total)? {
        let decisions = entry.decisions.clone();
        fold_into_parent(node, &path, decisions)?;
    }
    Ok(())
}

impl NodeAlgorithm for OralMessages {
    type Payload = Payload;
    type Status = Status;
    type Memory = Memory;

    fn is_terminal(status: Status) -> bool {
        matches!(status, Status::Done | Status::Attack | Status::Retreat | Status::Traitor)
    }

    fn on_spontaneous(
        node: &mut Node<Self>,
        rt: &mut dyn Runtime<Payload>,
    ) -> Result<(), ConsensusError> {
        let decision = node.memory.decision;
        let m = node.memory.m;
        let neighbors = node.neighbor_slots();
        let n = if m == 0 { 1 } else { neighbors.len().saturating_sub(1) };

        info!(node = node.unique_value, decision, m, "commander broadcasting order");
        let data = Payload::Decision { id: node.unique_value, decision, m, path: vec![node.unique_value], n };
        rt.send(node.slot, Envelope::new(data, neighbors));
        node.status = Status::Done;
        Ok(())
    }

    fn on_message(
        node: &mut Node<Self>,
        source: SlotId,
        payload: Payload,
        rt: &mut dyn Runtime<Payload>,
    ) -> Result<(), ConsensusError> {
        match node.status {
            Status::Traitor | Status::Lieutenant => receiving(node, source, payload, rt),
            Status::Done => {
                info!(node = node.unique_value, "DONE, ignoring message");
                Ok(())
            }
            status => {
                error!(node = node.unique_value, ?status, "unexpected Decision message in terminal decision state");
                Ok(())
            }
        }
    }

    fn on_alarm(
        _node: &mut Node<Self>,
        _payload: Payload,
        _rt: &mut dyn Runtime<Payload>,
    ) -> Result<(), ConsensusError> {
        // This algorithm never arms alarms; recursion is driven entirely by
        // Decision messages and folds synchronously on receipt.
        Ok(())
    }
}
