/// Application-level stable identity of a node, distinct across the whole
/// network and immutable once assigned.
///
/// This is the value algorithms exchange in message payloads (`data.id` in
/// the original protocol traces) and key their bookkeeping maps by. It is
/// deliberately a different type than [`SlotId`] even though both are small
/// integers in this implementation: conflating "who the runtime says sent
/// this" with "who the application believes sent this" is exactly the bug
/// class a two-namespace design exists to prevent.
pub type NodeId = u64;

/// The runtime-visible neighbor index for a node. Two different nodes may
/// use different `SlotId`s to refer to the same peer only in the sense that
/// slot assignment is kernel-global, not that it is renegotiated per
/// observer; what matters is that a handler must not assume
/// `SlotId == NodeId` and must instead learn the mapping the first time a
/// neighbor's message arrives.
pub type SlotId = usize;
