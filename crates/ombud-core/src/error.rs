//! # Error Types — Mediation Refusal Taxonomy
//!
//! The single error vocabulary for the mediation subsystem. All errors use
//! `thiserror` for derive-based `Display` and `Error` implementations.
//!
//! ## Design
//!
//! - State-machine refusals carry the current state, the attempted
//!   operation, and whether the state is terminal — so the surface can say
//!   "already closed, use reopen" instead of a generic error.
//! - Losing a race against a concurrent transition is its own variant
//!   (`StaleState`), distinct from attempting an operation that was never
//!   legal (`InvalidState`). Financial side effects depend on callers
//!   being able to tell these apart.
//! - Compression failures are scoped to one attachment and never abort an
//!   unrelated send.

use thiserror::Error;

/// Top-level error type for the mediation subsystem.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediationError {
    /// Operation is not legal from the current dispute or room state.
    #[error("{}", invalid_state_message(.entity, .current, .operation, *.terminal))]
    InvalidState {
        /// The entity being operated on (rendered identifier).
        entity: String,
        /// The state the entity is currently in.
        current: String,
        /// The operation that was attempted.
        operation: String,
        /// Whether the current state is terminal.
        terminal: bool,
    },

    /// Lost a race against a concurrent transition on the same entity.
    #[error("stale state for {entity}: expected version {expected}, found {actual}")]
    StaleState {
        /// The entity being operated on (rendered identifier).
        entity: String,
        /// The version the caller observed before the call.
        expected: u64,
        /// The version actually found.
        actual: u64,
    },

    /// A required input was missing or malformed.
    #[error("validation error: {0}")]
    Validation(String),

    /// The room is paused and the sender is not a mediator.
    #[error("room {room} is paused by a mediator")]
    RoomPaused {
        /// The paused room (rendered identifier).
        room: String,
    },

    /// The actor lacks the permission the operation requires.
    #[error("permission denied: {actor} lacks {permission}")]
    PermissionDenied {
        /// The refused actor (rendered identifier).
        actor: String,
        /// The permission slug that was required.
        permission: String,
    },

    /// Compressing one attachment failed; unrelated work is unaffected.
    #[error("compression failed for {attachment}: {reason}")]
    CompressionFailed {
        /// The failed attachment (rendered identifier).
        attachment: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// The attachment's compression was cancelled by its owner.
    #[error("compression cancelled for {attachment}")]
    Cancelled {
        /// The cancelled attachment (rendered identifier).
        attachment: String,
    },

    /// A referenced dispute, room, or attachment does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An external collaborator call failed.
    #[error("collaborator error: {0}")]
    Collaborator(String),
}

/// Render the `InvalidState` message, appending the reopen hint for
/// terminal states.
fn invalid_state_message(entity: &str, current: &str, operation: &str, terminal: bool) -> String {
    if terminal {
        format!("invalid state for {operation}: {entity} is {current} (already closed, use reopen)")
    } else {
        format!("invalid state for {operation}: {entity} is {current}")
    }
}

impl MediationError {
    /// Whether this refusal means the entity is in a terminal state and
    /// the caller should reopen rather than retry.
    pub fn is_terminal_refusal(&self) -> bool {
        matches!(self, Self::InvalidState { terminal: true, .. })
    }
}
