//! # ombud-dispute — Dispute Lifecycle
//!
//! Implements the dispute lifecycle for the Ombud mediation service:
//!
//! - **Dispute** (`dispute.rs`): the dispute entity with its status
//!   machine, structured meeting request, and append-only transition log.
//!
//! - **Resolution** (`resolution.rs`): the admin resolution actions and
//!   their note/order-status policies.
//!
//! - **Lifecycle** (`lifecycle.rs`): the linearized transition engine —
//!   per-dispute locking, version read-check-write, order-collaborator
//!   compensation, and notification fan-out.
//!
//! ## Crate Policy
//!
//! - Depends only on `ombud-core` internally.
//! - Every mutation goes through the engine; disputes are never edited
//!   in place by callers.
//! - Disputes are never deleted — terminal states are reopenable.

pub mod dispute;
pub mod lifecycle;
pub mod resolution;

pub use dispute::{Dispute, DisputeStatus, MeetingRequest, MeetingRequestStatus, TransitionRecord};
pub use lifecycle::{
    CollaboratorError, DisputeEvent, DisputeLifecycle, NoopNotifier, NotificationCollaborator,
    OrderCollaborator, OrderStatusOutcome, ResolveOutcome,
};
pub use resolution::{OrderStatus, ResolutionAction};
