use consensus_core::{NodeId, SlotId};
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

/// A connectivity graph plus the application-level identities assigned to
/// each slot. Built once per run and handed to [`crate::Kernel::new`];
/// never mutated afterward — topology is fixed for the duration of a run.
#[derive(Debug, Clone)]
pub struct Topology {
    adjacency: Vec<Vec<SlotId>>,
    node_ids: Vec<NodeId>,
}

impl Topology {
    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn neighbors(&self, slot: SlotId) -> &[SlotId] {
        &self.adjacency[slot]
    }

    pub fn node_id(&self, slot: SlotId) -> NodeId {
        self.node_ids[slot]
    }

    pub fn is_bidirectional(&self) -> bool {
        self.adjacency.iter().enumerate().all(|(slot, peers)| {
            peers
                .iter()
                .all(|&p| self.adjacency[p].contains(&slot))
        })
    }

    /// True if the graph is connected when treated as undirected, via a
    /// plain breadth-first walk from slot 0.
    pub fn is_connected(&self) -> bool {
        let n = self.node_count();
        if n == 0 {
            return true;
        }
        let mut seen = vec![false; n];
        let mut queue = std::collections::VecDeque::from([0usize]);
        seen[0] = true;
        let mut visited = 1;
        while let Some(slot) = queue.pop_front() {
            for &peer in &self.adjacency[slot] {
                if !seen[peer] {
                    seen[peer] = true;
                    visited += 1;
                    queue.push_back(peer);
                }
            }
        }
        visited == n
    }

    pub fn node_ids(&self) -> &[NodeId] {
        &self.node_ids
    }

    /// Fully connected mesh of `n` nodes, ids `1..=n` shuffled with `rng`
    /// so slot order doesn't leak identity order.
    pub fn complete_graph(n: usize, rng: &mut ChaCha8Rng) -> Self {
        let mut node_ids: Vec<NodeId> = (1..=n as NodeId).collect();
        node_ids.shuffle(rng);
        let adjacency = (0..n)
            .map(|slot| (0..n).filter(|&other| other != slot).collect())
            .collect();
        Self {
            adjacency,
            node_ids,
        }
    }

    /// Ring of `n` nodes, each additionally connected to `chords` evenly
    /// spaced non-adjacent peers. Used by scenarios that need a connected
    /// but non-complete graph to exercise multi-hop broadcast relay.
    pub fn ring_with_chords(n: usize, chords: usize, rng: &mut ChaCha8Rng) -> Self {
        let mut node_ids: Vec<NodeId> = (1..=n as NodeId).collect();
        node_ids.shuffle(rng);
        let mut adjacency: Vec<Vec<SlotId>> = (0..n)
            .map(|slot| vec![(slot + n - 1) % n, (slot + 1) % n])
            .collect();
        for slot in 0..n {
            for c in 1..=chords {
                let step = n / (chords + 2).max(1);
                let target = (slot + step * (c + 1)) % n;
                if target != slot && !adjacency[slot].contains(&target) {
                    adjacency[slot].push(target);
                    adjacency[target].push(slot);
                }
            }
        }
        Self {
            adjacency,
            node_ids,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn complete_graph_is_connected_and_bidirectional() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let topo = Topology::complete_graph(5, &mut rng);
        assert!(topo.is_connected());
        assert!(topo.is_bidirectional());
        assert_eq!(topo.node_ids().len(), 5);
    }

    #[test]
    fn ring_with_chords_is_connected() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let topo = Topology::ring_with_chords(8, 1, &mut rng);
        assert!(topo.is_connected());
        assert!(topo.is_bidirectional());
    }
}
