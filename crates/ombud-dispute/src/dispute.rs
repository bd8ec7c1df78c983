//! # Dispute Entity
//!
//! Models a client/provider conflict over one marketplace order.
//!
//! ## States
//!
//! ```text
//! Open ──▶ UnderAnalysis ──▶ Resolved
//!   ▲           │
//!   │           ▼
//!   └──────  Cancelled
//!
//! Resolved ──▶ Open (reopen)
//! Cancelled ──▶ Open (reopen)
//! ```
//!
//! `Resolved` and `Cancelled` are terminal for messaging and resolution,
//! but both are reopenable — mediation outcomes can be revisited, so the
//! machine is not strictly forward-moving.
//!
//! ## Design Decision
//!
//! The source system embedded meeting requests as a bracketed marker
//! inside the free-text `details` field and recovered them by string
//! splitting. Here the meeting request is a structured optional field on
//! the entity; the complaint text stays untouched when a meeting is
//! rescheduled.

use serde::{Deserialize, Serialize};

use ombud_core::{DisputeId, OrderId, ParticipantId, Timestamp};

use crate::resolution::ResolutionAction;

// ─── Status ──────────────────────────────────────────────────────────

/// The status of a dispute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    /// Dispute has been raised and awaits a mediator.
    Open,
    /// A mediator has started analysis; the mediation room is active.
    UnderAnalysis,
    /// Dispute was closed by a resolution action (terminal, reopenable).
    Resolved,
    /// Dispute was cancelled by a mediator (terminal, reopenable).
    Cancelled,
}

impl DisputeStatus {
    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Cancelled)
    }

    /// Whether a resolution action may be applied from this status.
    pub fn accepts_resolution(&self) -> bool {
        matches!(self, Self::Open | Self::UnderAnalysis)
    }
}

impl std::fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Open => "OPEN",
            Self::UnderAnalysis => "UNDER_ANALYSIS",
            Self::Resolved => "RESOLVED",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

// ─── Meeting Request ─────────────────────────────────────────────────

/// The state of an embedded meeting request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingRequestStatus {
    /// A meeting date has been requested and awaits confirmation.
    Requested,
    /// The mediator confirmed the meeting (via dismiss).
    Confirmed,
    /// The date was rewritten after the original request.
    Rescheduled,
}

/// A structured meeting request attached to a dispute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingRequest {
    /// The requested meeting date, as supplied by the caller.
    pub requested_date: String,
    /// Where the request stands.
    pub status: MeetingRequestStatus,
}

impl MeetingRequest {
    /// A fresh request for the given date.
    pub fn new(requested_date: impl Into<String>) -> Self {
        Self {
            requested_date: requested_date.into(),
            status: MeetingRequestStatus::Requested,
        }
    }
}

// ─── Transition Log ──────────────────────────────────────────────────

/// One entry in a dispute's append-only transition log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// Status before the transition.
    pub from_status: DisputeStatus,
    /// Status after the transition.
    pub to_status: DisputeStatus,
    /// The actor who triggered the transition.
    pub actor: ParticipantId,
    /// When the transition occurred.
    pub at: Timestamp,
    /// Free-text note recorded with the transition.
    pub note: Option<String>,
}

// ─── Dispute ─────────────────────────────────────────────────────────

/// A dispute between the two parties of a marketplace order.
///
/// Mutated exclusively by [`crate::lifecycle::DisputeLifecycle`]; the
/// `version` field is bumped on every mutation and backs the
/// read-check-write protocol that serializes concurrent resolutions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dispute {
    /// Unique dispute identifier.
    pub id: DisputeId,
    /// The order this dispute refers to (owned externally).
    pub order_id: OrderId,
    /// The participant who raised the dispute.
    pub opener_id: ParticipantId,
    /// Short reason code (`"not_delivered"`, `"quality"`, ...).
    pub reason: String,
    /// Free-text complaint details.
    pub details: String,
    /// Structured meeting request, if this is a meeting dispute.
    pub meeting_request: Option<MeetingRequest>,
    /// Current status.
    pub status: DisputeStatus,
    /// Mutation counter for optimistic concurrency.
    pub version: u64,
    /// The mediator who started analysis, once mediation has begun.
    pub mediator: Option<ParticipantId>,
    /// When the dispute was raised.
    pub created_at: Timestamp,
    /// When the dispute was last resolved, if ever.
    pub resolved_at: Option<Timestamp>,
    /// The note recorded by the resolving mediator.
    pub resolution_note: Option<String>,
    /// The action that resolved the dispute.
    pub resolution_type: Option<ResolutionAction>,
    /// Ordered log of all status transitions.
    pub transitions: Vec<TransitionRecord>,
}

impl Dispute {
    /// Create a new dispute in the `Open` status.
    ///
    /// Disputes are raised by the external order collaborator when a
    /// party files a complaint; the lifecycle engine admits them.
    pub fn open(
        order_id: OrderId,
        opener_id: ParticipantId,
        reason: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            id: DisputeId::new(),
            order_id,
            opener_id,
            reason: reason.into(),
            details: details.into(),
            meeting_request: None,
            status: DisputeStatus::Open,
            version: 0,
            mediator: None,
            created_at: Timestamp::now(),
            resolved_at: None,
            resolution_note: None,
            resolution_type: None,
            transitions: Vec::new(),
        }
    }

    /// Attach a meeting request to a newly opened dispute.
    pub fn with_meeting_request(mut self, requested_date: impl Into<String>) -> Self {
        self.meeting_request = Some(MeetingRequest::new(requested_date));
        self
    }

    /// Whether this dispute carries a meeting request.
    pub fn is_meeting_dispute(&self) -> bool {
        self.meeting_request.is_some()
    }

    /// Record a status transition and bump the version.
    pub(crate) fn apply_transition(
        &mut self,
        to: DisputeStatus,
        actor: ParticipantId,
        note: Option<String>,
    ) {
        self.transitions.push(TransitionRecord {
            from_status: self.status,
            to_status: to,
            actor,
            at: Timestamp::now(),
            note,
        });
        self.status = to;
        self.version += 1;
    }

    /// Bump the version for a mutation that does not change status
    /// (meeting reschedule), still leaving an audit entry.
    pub(crate) fn record_in_place_change(&mut self, actor: ParticipantId, note: String) {
        self.transitions.push(TransitionRecord {
            from_status: self.status,
            to_status: self.status,
            actor,
            at: Timestamp::now(),
            note: Some(note),
        });
        self.version += 1;
    }
}
