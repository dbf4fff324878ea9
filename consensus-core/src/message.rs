use crate::SlotId;

/// Marks the one self-delivered message every run begins with: the
/// initializer pushes it into the designated commander/coordinator's inbox
/// to fire that node's `spontaneously` handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaHeader {
    Ini,
}

/// Where an outbound envelope is headed. Most protocol messages target a
/// single peer (a reply) or the full neighbor set (a broadcast); the two
/// variants keep call sites from allocating a one-element `Vec` for the
/// common reply case.
#[derive(Debug, Clone)]
pub enum Destination {
    One(SlotId),
    Many(Vec<SlotId>),
}

impl Destination {
    pub fn targets(&self) -> Vec<SlotId> {
        match self {
            Destination::One(slot) => vec![*slot],
            Destination::Many(slots) => slots.clone(),
        }
    }
}

impl From<SlotId> for Destination {
    fn from(slot: SlotId) -> Self {
        Destination::One(slot)
    }
}

impl From<Vec<SlotId>> for Destination {
    fn from(slots: Vec<SlotId>) -> Self {
        Destination::Many(slots)
    }
}

/// The envelope every algorithm in this workspace exchanges. `data` carries
/// the algorithm-specific payload (`P` is a per-protocol enum rather than a
/// loosely-typed map, matching "tagged variants over status strings" in the
/// design notes); `source` is `None` until the runtime stamps it on
/// delivery and `Some(slot)` for every handler-visible message thereafter.
#[derive(Debug, Clone)]
pub struct Envelope<P> {
    pub data: P,
    pub source: Option<SlotId>,
    pub destination: Destination,
    pub meta_header: Option<MetaHeader>,
}

impl<P> Envelope<P> {
    pub fn new(data: P, destination: impl Into<Destination>) -> Self {
        Self {
            data,
            source: None,
            destination: destination.into(),
            meta_header: None,
        }
    }

    pub fn reply_to(data: P, destination: SlotId) -> Self {
        Self::new(data, destination)
    }

    pub fn ini(destination: SlotId, data: P) -> Self {
        Self {
            data,
            source: None,
            destination: Destination::One(destination),
            meta_header: Some(MetaHeader::Ini),
        }
    }
}
