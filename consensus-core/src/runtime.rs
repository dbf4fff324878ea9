use crate::{Envelope, SlotId};

/// The host interface a `NodeAlgorithm` handler is given. Implemented by
/// `consensus-sim`'s kernel; algorithms never see the kernel type itself,
/// only this trait, which is what keeps `consensus-protocols` free of any
/// dependency on how scheduling actually works.
pub trait Runtime<P> {
    /// The tick the kernel is currently processing. Handlers use this to
    /// compute absolute alarm deadlines when they need to reason about one,
    /// though `set_alarm` itself takes a relative delay.
    fn current_tick(&self) -> u64;

    /// The slots this node is connected to, as currently known by the
    /// kernel's topology (stable for the lifetime of a run).
    fn neighbor_slots(&self, of: SlotId) -> Vec<SlotId>;

    /// Queues an outbound message. Delivery order between independently
    /// queued messages destined for different nodes is not guaranteed;
    /// messages to the same node preserve send order.
    fn send(&mut self, from: SlotId, msg: Envelope<P>);

    /// Arms a one-shot alarm for `target`, firing `delay_ticks` after the
    /// current tick with `msg` as its payload. Alarms do not repeat — a
    /// handler that wants a retry loop must re-arm explicitly each time its
    /// `on_alarm` runs.
    fn set_alarm(&mut self, target: SlotId, delay_ticks: u64, msg: Envelope<P>);
}
