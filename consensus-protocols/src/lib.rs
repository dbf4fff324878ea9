//! # Consensus Protocols
//!
//! The four algorithms themselves: [`two_pc`], [`three_pc`],
//! [`byzantine_three_pc`], and [`oral_messages`]. Each module is a
//! self-contained `NodeAlgorithm` implementation — status enum, memory
//! struct, payload enum, and the three handler entry points — with no
//! knowledge of how it's hosted beyond the `consensus_core` traits.

mod alarm;
pub mod byzantine_three_pc;
pub mod oral_messages;
pub mod three_pc;
pub mod two_pc;

pub use alarm::ALARM_DELAY_TICKS;
