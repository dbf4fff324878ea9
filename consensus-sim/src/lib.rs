//! # Consensus Sim
//!
//! The discrete-event kernel that hosts [`consensus_core::NodeAlgorithm`]
//! implementations. Single-threaded, cooperative, deterministic given a
//! seed: every run processes events strictly in `(tick, sequence)` order,
//! which is what lets the scenario tests in `consensus-protocols` assert
//! exact outcomes rather than "eventually" properties.
//!
//! `kernel` is the event loop and scheduler; `topology` builds the
//! connectivity graphs a run executes over; `restrictions` checks the
//! structural preconditions a scenario can declare; `config` is the
//! layered scenario configuration surface; `report` is the structured run
//! summary handed back to callers.

pub mod config;
pub mod kernel;
pub mod report;
pub mod restrictions;
pub mod topology;

pub use config::{ScenarioConfig, TopologyChoice};
pub use kernel::{Kernel, LinkFault};
pub use report::RunReport;
pub use restrictions::TopologyRestriction;
pub use topology::Topology;
