use std::fmt::Debug;

use crate::{ConsensusError, Envelope, Node, Runtime, SlotId};

/// The per-node state machine contract every protocol in this workspace
/// implements. A kernel drives instances of this trait through three entry
/// points — a spontaneous kickoff, an inbound message, a fired alarm — and
/// never inspects `Status`/`Memory` itself; all protocol-specific behavior
/// lives behind these three methods.
pub trait NodeAlgorithm: Sized {
    /// The wire payload carried in this algorithm's envelopes.
    type Payload: Clone + Debug;

    /// The finite set of states a node can be in. Kept `Copy` since
    /// handlers read and overwrite it freely without needing to borrow.
    type Status: Copy + Eq + Debug;

    /// Per-node scratch state beyond `status` — vote tallies, received
    /// values, ack counters. `Default` gives every node a well-defined
    /// starting point before `initializer` runs.
    type Memory: Default + Clone + Debug;

    /// Whether a node in `status` has nothing left to do. The kernel polls
    /// this across all nodes to decide when a run has quiesced.
    fn is_terminal(status: Self::Status) -> bool;

    /// Fired exactly once per node at the start of a run, for the node(s)
    /// the scenario designates to kick things off (e.g. the commander, or
    /// the 2PC coordinator). Most nodes never receive this call.
    fn on_spontaneous(
        node: &mut Node<Self>,
        rt: &mut dyn Runtime<Self::Payload>,
    ) -> Result<(), ConsensusError>;

    /// Fired when an envelope addressed to `node.slot` is delivered.
    /// `source` is the slot it arrived from, already resolved by the
    /// kernel from the envelope's `source` field.
    fn on_message(
        node: &mut Node<Self>,
        source: SlotId,
        payload: Self::Payload,
        rt: &mut dyn Runtime<Self::Payload>,
    ) -> Result<(), ConsensusError>;

    /// Fired when a previously armed alarm reaches its deadline. `payload`
    /// is whatever the handler passed to `set_alarm` when arming it.
    fn on_alarm(
        node: &mut Node<Self>,
        payload: Self::Payload,
        rt: &mut dyn Runtime<Self::Payload>,
    ) -> Result<(), ConsensusError>;
}
