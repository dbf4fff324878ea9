//! # Consensus Core
//!
//! Shared primitives for the consensus-lab workspace: the message envelope,
//! the keyed-hash signature stub, the node/neighbor bookkeeping that every
//! protocol reuses, and the `NodeAlgorithm` / `Runtime` trait pair that
//! decouples the protocol state machines (`consensus-protocols`) from the
//! discrete-event kernel that hosts them (`consensus-sim`).
//!
//! ## Architecture
//!
//! Every algorithm in this workspace is a per-node state machine reacting to
//! three event kinds: a spontaneous start, an inbound message, and an alarm
//! firing. `NodeAlgorithm` models that contract as a trait with associated
//! `Status`, `Memory`, and `Payload` types; `Runtime` is the narrow interface
//! a handler gets back to talk to the host (send a message, arm an alarm,
//! enumerate neighbors). Nothing in this crate knows how messages are
//! actually scheduled or delivered — that is `consensus-sim`'s job.

mod algorithm;
mod error;
mod ids;
mod message;
mod node;
mod runtime;
pub mod signature;

pub use algorithm::NodeAlgorithm;
pub use error::ConsensusError;
pub use ids::{NodeId, SlotId};
pub use message::{Destination, Envelope, MetaHeader};
pub use node::{NeighborSlot, Node};
pub use runtime::Runtime;
