use thiserror::Error;

use crate::SlotId;

/// Errors a handler or the hosting kernel can raise while running a
/// protocol. These are failures of the simulation itself (a malformed
/// topology, a broken invariant) rather than protocol-level outcomes like
/// "abort" or "traitor detected", which the algorithms represent as regular
/// status transitions, not errors.
#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("node slot {0} has no registered neighbor at index {1}")]
    UnknownNeighbor(SlotId, SlotId),

    #[error("node slot {0} received a message with no recognized variant for its current status")]
    UnexpectedMessage(SlotId),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("topology restriction violated: {0}")]
    RestrictionViolation(String),

    #[error("scenario configuration error: {0}")]
    Configuration(String),
}
