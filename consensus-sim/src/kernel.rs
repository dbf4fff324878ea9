use std::cmp::Ordering;
use std::collections::BinaryHeap;

use consensus_core::{ConsensusError, Envelope, MetaHeader, Node, NodeAlgorithm, Runtime, SlotId};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use crate::report::RunReport;
use crate::restrictions::{self, TopologyRestriction};
use crate::topology::Topology;

/// How a link between two nodes behaves. `Reliable` never drops;
/// `DropRate(f)` drops a fraction `f` of messages (not alarms — alarms are
/// self-addressed and always fire), letting scenario tests model the
/// message-loss cases in the testable-properties scenarios without
/// special-casing the kernel.
#[derive(Debug, Clone, Copy)]
pub enum LinkFault {
    Reliable,
    DropRate(f64),
}

impl Default for LinkFault {
    fn default() -> Self {
        LinkFault::Reliable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    Message,
    Alarm,
}

struct Event<P> {
    tick: u64,
    seq: u64,
    target: SlotId,
    source: Option<SlotId>,
    kind: EventKind,
    envelope: Envelope<P>,
}

impl<P> PartialEq for Event<P> {
    fn eq(&self, other: &Self) -> bool {
        self.tick == other.tick && self.seq == other.seq
    }
}
impl<P> Eq for Event<P> {}

impl<P> PartialOrd for Event<P> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<P> Ord for Event<P> {
    // `BinaryHeap` is a max-heap; reversing the comparison makes the
    // earliest (tick, seq) pair the one popped first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .tick
            .cmp(&self.tick)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// The mutable scheduling state a running handler can reach through
/// `Runtime`, split out from `nodes` so the kernel can hand a handler both
/// `&mut Node<A>` and `&mut dyn Runtime<P>` without aliasing the same
/// field twice (see `Kernel::dispatch`).
struct RuntimeCtx<'a, P> {
    topology: &'a Topology,
    tick: u64,
    next_seq: &'a mut u64,
    queue: &'a mut BinaryHeap<Event<P>>,
    link_fault: LinkFault,
    rng: &'a mut ChaCha8Rng,
    messages_sent: &'a mut u64,
    messages_dropped: &'a mut u64,
    alarms_set: &'a mut u64,
}

impl<'a, P: Clone + std::fmt::Debug> Runtime<P> for RuntimeCtx<'a, P> {
    fn current_tick(&self) -> u64 {
        self.tick
    }

    fn neighbor_slots(&self, of: SlotId) -> Vec<SlotId> {
        self.topology.neighbors(of).to_vec()
    }

    fn send(&mut self, from: SlotId, msg: Envelope<P>) {
        for target in msg.destination.targets() {
            if let LinkFault::DropRate(rate) = self.link_fault {
                if self.rng.gen::<f64>() < rate {
                    *self.messages_dropped += 1;
                    warn!(from, target, "message dropped by link fault policy");
                    continue;
                }
            }
            let seq = *self.next_seq;
            *self.next_seq += 1;
            *self.messages_sent += 1;
            self.queue.push(Event {
                tick: self.tick + 1,
                seq,
                target,
                source: Some(from),
                kind: EventKind::Message,
                envelope: Envelope {
                    data: msg.data.clone(),
                    source: Some(from),
                    destination: target.into(),
                    meta_header: msg.meta_header,
                },
            });
        }
    }

    fn set_alarm(&mut self, target: SlotId, delay_ticks: u64, msg: Envelope<P>) {
        let seq = *self.next_seq;
        *self.next_seq += 1;
        *self.alarms_set += 1;
        self.queue.push(Event {
            tick: self.tick + delay_ticks.max(1),
            seq,
            target,
            source: None,
            kind: EventKind::Alarm,
            envelope: msg,
        });
    }
}

/// The discrete-event host for a single run of algorithm `A`. Owns the
/// nodes and the topology they're connected over; everything else a
/// handler needs during dispatch is reached through a transient
/// [`RuntimeCtx`] built for the duration of that one call.
pub struct Kernel<A: NodeAlgorithm> {
    nodes: Vec<Node<A>>,
    topology: Topology,
    tick: u64,
    next_seq: u64,
    queue: BinaryHeap<Event<A::Payload>>,
    rng: ChaCha8Rng,
    link_fault: LinkFault,
    max_ticks: u64,
    messages_sent: u64,
    messages_dropped: u64,
    alarms_set: u64,
}

impl<A: NodeAlgorithm> Kernel<A> {
    pub fn new(
        topology: Topology,
        initial_status: impl Fn(SlotId) -> A::Status,
        rng: ChaCha8Rng,
        link_fault: LinkFault,
        max_ticks: u64,
    ) -> Self {
        let mut nodes = Vec::with_capacity(topology.node_count());
        for slot in 0..topology.node_count() {
            let mut node = Node::new(slot, topology.node_id(slot), initial_status(slot));
            for &peer in topology.neighbors(slot) {
                node.add_neighbor(peer);
            }
            nodes.push(node);
        }
        Self {
            nodes,
            topology,
            tick: 0,
            next_seq: 0,
            queue: BinaryHeap::new(),
            rng,
            link_fault,
            max_ticks,
            messages_sent: 0,
            messages_dropped: 0,
            alarms_set: 0,
        }
    }

    pub fn apply_restrictions(
        &self,
        restrictions: &[TopologyRestriction],
    ) -> Result<(), ConsensusError> {
        restrictions::check_all(&self.topology, self.link_fault, restrictions)
    }

    pub fn nodes(&self) -> &[Node<A>] {
        &self.nodes
    }

    /// Mutable node access for scenario setup — seeding `memory` fields
    /// (private keys, `m`/`n`, the commander's decision) between
    /// `Kernel::new` and `spontaneously_start`/`run`. The kernel itself
    /// never needs this; only callers assembling a run do.
    pub fn nodes_mut(&mut self) -> &mut [Node<A>] {
        &mut self.nodes
    }

    /// Pushes the initializing `Ini` envelope to `slot`'s inbox at tick 0,
    /// triggering `on_spontaneous` the first time the run loop advances.
    pub fn spontaneously_start(&mut self, slot: SlotId, seed: A::Payload) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(Event {
            tick: 0,
            seq,
            target: slot,
            source: None,
            kind: EventKind::Message,
            envelope: Envelope {
                data: seed,
                source: None,
                destination: slot.into(),
                meta_header: Some(MetaHeader::Ini),
            },
        });
    }

    fn all_terminal(&self) -> bool {
        self.nodes.iter().all(|n| A::is_terminal(n.status))
    }

    /// Runs events until the queue drains or every node reaches a terminal
    /// status, whichever comes first, then returns a summary. Exceeding
    /// `max_ticks` without quiescing is reported, not treated as an error —
    /// a caller may legitimately want to inspect a stuck run. A handler
    /// returning `Err` is a protocol-invariant violation, not a recoverable
    /// local condition; it aborts the whole run immediately rather than
    /// leaving the offending node stuck and continuing everyone else.
    pub fn run(mut self) -> Result<RunReport, ConsensusError> {
        info!(nodes = self.nodes.len(), "starting run");
        while let Some(event) = self.queue.pop() {
            if event.tick > self.max_ticks {
                warn!(tick = event.tick, max_ticks = self.max_ticks, "run exceeded tick budget");
                break;
            }
            self.tick = event.tick;
            self.dispatch(event)?;
            if self.all_terminal() {
                break;
            }
        }
        let statuses: Vec<_> = self
            .nodes
            .iter()
            .map(|n| format!("{:?}", n.status))
            .collect();
        info!(ticks = self.tick, terminal = self.all_terminal(), "run finished");
        Ok(RunReport {
            ticks: self.tick,
            terminal: self.all_terminal(),
            final_statuses: statuses,
            messages_sent: self.messages_sent,
            messages_dropped: self.messages_dropped,
            alarms_set: self.alarms_set,
        })
    }

    fn dispatch(&mut self, event: Event<A::Payload>) -> Result<(), ConsensusError> {
        let tick = event.tick;
        // Destructuring through `&mut self` borrows each field independently,
        // so `nodes` and the rest of the scheduling state can be held mutably
        // at the same time without the borrow checker treating this as one
        // conflicting borrow of `self`.
        let Kernel {
            nodes,
            topology,
            next_seq,
            queue,
            link_fault,
            rng,
            messages_sent,
            messages_dropped,
            alarms_set,
            ..
        } = self;

        let node = nodes
            .get_mut(event.target)
            .ok_or(ConsensusError::UnknownNeighbor(event.target, event.target))?;

        let mut ctx = RuntimeCtx {
            topology: &*topology,
            tick,
            next_seq,
            queue,
            link_fault: *link_fault,
            rng,
            messages_sent,
            messages_dropped,
            alarms_set,
        };

        match (event.kind, event.envelope.meta_header) {
            (EventKind::Message, Some(MetaHeader::Ini)) => {
                debug!(slot = node.slot, "spontaneous start");
                A::on_spontaneous(node, &mut ctx)
            }
            (EventKind::Message, None) => {
                let source = event.source.ok_or(ConsensusError::UnexpectedMessage(node.slot))?;
                if let Some(id) = ctx.topology.node_ids().get(source).copied() {
                    node.learn_neighbor_id(source, id);
                }
                debug!(slot = node.slot, source, "message delivered");
                A::on_message(node, source, event.envelope.data, &mut ctx)
            }
            (EventKind::Alarm, _) => {
                debug!(slot = node.slot, "alarm fired");
                A::on_alarm(node, event.envelope.data, &mut ctx)
            }
        }
    }
}
