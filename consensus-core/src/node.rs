use crate::{NodeAlgorithm, NodeId, SlotId};

/// One entry in a node's neighbor table. `id` starts as `None` and is
/// filled in the first time a message actually arrives from that slot —
/// algorithms must not assume the application-level identity of a peer is
/// known before they've heard from it at least once (see [`crate::NodeId`]).
#[derive(Debug, Clone, Copy)]
pub struct NeighborSlot {
    pub slot: SlotId,
    pub id: Option<NodeId>,
}

impl NeighborSlot {
    pub fn new(slot: SlotId) -> Self {
        Self { slot, id: None }
    }
}

/// A single participant in a run, parameterized over the algorithm it is
/// executing. The kernel owns a `Vec<Node<A>>` and indexes it by `SlotId`;
/// nothing outside this struct tracks where a node's status or memory
/// lives.
#[derive(Debug, Clone)]
pub struct Node<A: NodeAlgorithm> {
    pub unique_value: NodeId,
    pub slot: SlotId,
    pub status: A::Status,
    pub memory: A::Memory,
    pub neighbors: Vec<NeighborSlot>,
}

impl<A: NodeAlgorithm> Node<A> {
    pub fn new(slot: SlotId, unique_value: NodeId, initial_status: A::Status) -> Self {
        Self {
            unique_value,
            slot,
            status: initial_status,
            memory: A::Memory::default(),
            neighbors: Vec::new(),
        }
    }

    pub fn add_neighbor(&mut self, slot: SlotId) {
        if !self.neighbors.iter().any(|n| n.slot == slot) {
            self.neighbors.push(NeighborSlot::new(slot));
        }
    }

    pub fn neighbor_slots(&self) -> Vec<SlotId> {
        self.neighbors.iter().map(|n| n.slot).collect()
    }

    /// Records the application identity of whoever sent from `source`, the
    /// first time it's observed. Subsequent messages from the same slot are
    /// expected to carry the same id; algorithms that care about detecting a
    /// mismatch (equivocation) compare explicitly rather than relying on
    /// this bookkeeping to flag it.
    pub fn learn_neighbor_id(&mut self, source: SlotId, id: NodeId) {
        if let Some(slot) = self.neighbors.iter_mut().find(|n| n.slot == source) {
            if slot.id.is_none() {
                slot.id = Some(id);
            }
        }
    }
}
