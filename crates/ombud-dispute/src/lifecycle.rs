//! # Dispute Lifecycle Engine
//!
//! The single mutation path for disputes. Transitions are linearized per
//! dispute: each dispute sits behind its own mutex, and every mutating
//! operation is a read-check-write against the dispute's `version`.
//!
//! ## Concurrency Contract
//!
//! A `resolve` call carries the version its caller last observed. The
//! first of N concurrent callers to acquire the dispute lock wins and
//! bumps the version; every later caller finds a newer version and fails
//! with `StaleState` instead of double-applying a financial side effect.
//! The order collaborator is therefore invoked at most once per
//! resolution.
//!
//! ## Compensation
//!
//! `refund_client` and `release_provider` must leave the dispute and the
//! order consistent. The engine applies the dispute transition, calls the
//! order collaborator, and on collaborator failure reverts the transition
//! before surfacing the error. Notification failure, by contrast, never
//! rolls anything back.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use thiserror::Error;
use tracing::{info, warn};

use ombud_core::{Actor, Authorizer, DisputeId, MediationError, OrderId, Permission, Timestamp};

use crate::dispute::{Dispute, DisputeStatus, MeetingRequest, MeetingRequestStatus};
use crate::resolution::{OrderStatus, ResolutionAction};

// ─── Collaborators ───────────────────────────────────────────────────

/// Failure reported by an external collaborator.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct CollaboratorError {
    /// Human-readable failure description.
    pub message: String,
}

impl CollaboratorError {
    /// Build an error from any displayable cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Outcome of an order-status update, distinguishing idempotent repeats
/// from fresh updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatusOutcome {
    /// The order status was changed.
    Updated,
    /// The order was already in the requested status.
    AlreadySet,
}

/// External owner of marketplace orders.
pub trait OrderCollaborator: Send + Sync {
    /// Set the order's status. Must be idempotent: a repeat call reports
    /// [`OrderStatusOutcome::AlreadySet`] rather than failing.
    fn set_order_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<OrderStatusOutcome, CollaboratorError>;
}

/// A dispute transition event handed to the notification collaborator.
#[derive(Debug, Clone)]
pub struct DisputeEvent {
    /// The dispute that transitioned.
    pub dispute_id: DisputeId,
    /// The order the dispute refers to.
    pub order_id: OrderId,
    /// Status before the transition.
    pub from: DisputeStatus,
    /// Status after the transition.
    pub to: DisputeStatus,
    /// The resolution action, when the transition came from one.
    pub action: Option<ResolutionAction>,
    /// When the transition committed.
    pub at: Timestamp,
}

/// Fire-and-forget transition notifications.
///
/// Failures are the collaborator's problem; the engine never rolls back
/// a committed transition because a notification could not be sent.
pub trait NotificationCollaborator: Send + Sync {
    /// Deliver a transition event.
    fn notify(&self, event: &DisputeEvent);
}

/// Notification sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl NotificationCollaborator for NoopNotifier {
    fn notify(&self, _event: &DisputeEvent) {}
}

// ─── Outcomes ────────────────────────────────────────────────────────

/// The result of a successful `resolve` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOutcome {
    /// Dispute status after the action.
    pub status: DisputeStatus,
    /// The action that was applied, when it changed dispute state.
    pub resolution_type: Option<ResolutionAction>,
    /// Dispute version after the action.
    pub version: u64,
}

// ─── Engine ──────────────────────────────────────────────────────────

/// The dispute lifecycle engine.
///
/// Holds the registry of admitted disputes and serializes all mutations.
pub struct DisputeLifecycle {
    authorizer: Arc<dyn Authorizer>,
    orders: Arc<dyn OrderCollaborator>,
    notifier: Arc<dyn NotificationCollaborator>,
    disputes: RwLock<HashMap<DisputeId, Arc<Mutex<Dispute>>>>,
}

impl DisputeLifecycle {
    /// Create an engine wired to its collaborators.
    pub fn new(
        authorizer: Arc<dyn Authorizer>,
        orders: Arc<dyn OrderCollaborator>,
        notifier: Arc<dyn NotificationCollaborator>,
    ) -> Self {
        Self {
            authorizer,
            orders,
            notifier,
            disputes: RwLock::new(HashMap::new()),
        }
    }

    /// Admit an externally-opened dispute into the registry.
    ///
    /// The order collaborator guarantees at most one open dispute per
    /// order; this engine only tracks what it is handed.
    pub fn admit(&self, dispute: Dispute) -> DisputeId {
        let id = dispute.id;
        info!(dispute = %id, order = %dispute.order_id, "dispute admitted");
        self.disputes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(Mutex::new(dispute)));
        id
    }

    /// A point-in-time copy of a dispute.
    pub fn snapshot(&self, dispute_id: DisputeId) -> Result<Dispute, MediationError> {
        let entry = self.entry(dispute_id)?;
        let dispute = entry.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(dispute.clone())
    }

    /// Start mediation: `Open → UnderAnalysis`.
    ///
    /// Idempotent when the same mediator calls it twice; any other state
    /// is refused.
    pub fn start_mediation(
        &self,
        actor: &Actor,
        dispute_id: DisputeId,
    ) -> Result<DisputeStatus, MediationError> {
        self.require(actor, Permission::ManageDisputes)?;
        let entry = self.entry(dispute_id)?;
        let mut dispute = entry.lock().unwrap_or_else(PoisonError::into_inner);

        match dispute.status {
            DisputeStatus::Open => {
                dispute.mediator = Some(actor.id);
                dispute.apply_transition(DisputeStatus::UnderAnalysis, actor.id, None);
                info!(dispute = %dispute_id, mediator = %actor.id, "mediation started");
                self.notifier.notify(&transition_event(&dispute, DisputeStatus::Open, None));
                Ok(DisputeStatus::UnderAnalysis)
            }
            DisputeStatus::UnderAnalysis if dispute.mediator == Some(actor.id) => {
                // Repeat call by the mediator who started analysis.
                Ok(DisputeStatus::UnderAnalysis)
            }
            current => Err(MediationError::InvalidState {
                entity: dispute_id.to_string(),
                current: current.to_string(),
                operation: "start_mediation".into(),
                terminal: current.is_terminal(),
            }),
        }
    }

    /// Apply a resolution action.
    ///
    /// `expected_version` is the dispute version the caller observed; a
    /// mismatch means a concurrent transition won and yields
    /// [`MediationError::StaleState`]. For `change_meeting_date` the
    /// `note` carries the new date string.
    pub fn resolve(
        &self,
        actor: &Actor,
        dispute_id: DisputeId,
        expected_version: u64,
        action: ResolutionAction,
        note: Option<&str>,
    ) -> Result<ResolveOutcome, MediationError> {
        self.require(actor, Permission::ResolveDisputes)?;
        let entry = self.entry(dispute_id)?;
        let mut dispute = entry.lock().unwrap_or_else(PoisonError::into_inner);

        if dispute.version != expected_version {
            return Err(MediationError::StaleState {
                entity: dispute_id.to_string(),
                expected: expected_version,
                actual: dispute.version,
            });
        }
        if !dispute.status.accepts_resolution() {
            return Err(MediationError::InvalidState {
                entity: dispute_id.to_string(),
                current: dispute.status.to_string(),
                operation: format!("resolve({action})"),
                terminal: dispute.status.is_terminal(),
            });
        }

        match action {
            ResolutionAction::ChangeMeetingDate => self.change_meeting_date(actor, &mut dispute, note),
            _ => self.close_with(actor, &mut dispute, action, note),
        }
    }

    /// Reopen a resolved or cancelled dispute.
    ///
    /// Meeting disputes must re-request a date; other disputes require
    /// the caller to pass an explicit confirmation flag.
    pub fn reopen(
        &self,
        actor: &Actor,
        dispute_id: DisputeId,
        new_meeting_date: Option<&str>,
        confirmed: bool,
    ) -> Result<Dispute, MediationError> {
        self.require(actor, Permission::ManageDisputes)?;
        let entry = self.entry(dispute_id)?;
        let mut dispute = entry.lock().unwrap_or_else(PoisonError::into_inner);

        if !dispute.status.is_terminal() {
            return Err(MediationError::InvalidState {
                entity: dispute_id.to_string(),
                current: dispute.status.to_string(),
                operation: "reopen".into(),
                terminal: false,
            });
        }

        if dispute.is_meeting_dispute() {
            let date = new_meeting_date.unwrap_or("").trim();
            if date.is_empty() {
                return Err(MediationError::Validation(
                    "reopening a meeting dispute requires a new meeting date".into(),
                ));
            }
            dispute.meeting_request = Some(MeetingRequest::new(date));
        } else if !confirmed {
            return Err(MediationError::Validation(
                "reopening requires explicit confirmation".into(),
            ));
        }

        let from = dispute.status;
        dispute.resolved_at = None;
        dispute.resolution_note = None;
        dispute.resolution_type = None;
        dispute.mediator = None;
        dispute.apply_transition(DisputeStatus::Open, actor.id, Some("reopened".into()));
        info!(dispute = %dispute_id, from = %from, "dispute reopened");
        self.notifier.notify(&transition_event(&dispute, from, None));
        Ok(dispute.clone())
    }

    // ─── Internals ───────────────────────────────────────────────────

    /// Rewrite the meeting request date without touching dispute status.
    fn change_meeting_date(
        &self,
        actor: &Actor,
        dispute: &mut Dispute,
        new_date: Option<&str>,
    ) -> Result<ResolveOutcome, MediationError> {
        let date = new_date.unwrap_or("").trim();
        if date.is_empty() {
            return Err(MediationError::Validation(
                "change_meeting_date requires a new meeting date".into(),
            ));
        }
        if !dispute.is_meeting_dispute() {
            return Err(MediationError::Validation(
                "dispute carries no meeting request to reschedule".into(),
            ));
        }

        dispute.meeting_request = Some(MeetingRequest {
            requested_date: date.to_string(),
            status: MeetingRequestStatus::Rescheduled,
        });
        dispute.record_in_place_change(actor.id, format!("meeting rescheduled to {date}"));
        info!(dispute = %dispute.id, %date, "meeting date changed");
        Ok(ResolveOutcome {
            status: dispute.status,
            resolution_type: None,
            version: dispute.version,
        })
    }

    /// Apply a closing action (refund, release, dismiss, cancel), with
    /// compensation when the order collaborator refuses.
    fn close_with(
        &self,
        actor: &Actor,
        dispute: &mut Dispute,
        action: ResolutionAction,
        note: Option<&str>,
    ) -> Result<ResolveOutcome, MediationError> {
        let note = note.map(str::trim).filter(|n| !n.is_empty());
        if action.requires_note() && note.is_none() {
            return Err(MediationError::Validation(format!(
                "action {action} requires a non-empty resolution note"
            )));
        }
        let note = note
            .map(String::from)
            .or_else(|| action.default_note().map(String::from));

        // target_status is Some for every action except ChangeMeetingDate,
        // which is handled on its own path.
        let Some(target) = action.target_status() else {
            return Err(MediationError::Validation(format!(
                "action {action} does not close a dispute"
            )));
        };

        let from = dispute.status;
        let saved = (
            dispute.resolved_at,
            dispute.resolution_note.clone(),
            dispute.resolution_type,
            dispute.meeting_request.clone(),
        );

        dispute.resolved_at = Some(Timestamp::now());
        dispute.resolution_note = note.clone();
        dispute.resolution_type = Some(action);
        if action == ResolutionAction::Dismiss {
            // Dismissing a meeting dispute confirms the meeting.
            if let Some(mr) = dispute.meeting_request.as_mut() {
                mr.status = MeetingRequestStatus::Confirmed;
            }
        }
        dispute.apply_transition(target, actor.id, note);

        if let Some(order_status) = action.order_status() {
            match self.orders.set_order_status(dispute.order_id, order_status) {
                Ok(outcome) => {
                    info!(
                        dispute = %dispute.id,
                        order = %dispute.order_id,
                        status = %order_status,
                        ?outcome,
                        "order status updated"
                    );
                }
                Err(err) => {
                    // Compensate: revert the transition we just applied.
                    warn!(
                        dispute = %dispute.id,
                        order = %dispute.order_id,
                        error = %err,
                        "order collaborator refused; reverting dispute transition"
                    );
                    dispute.transitions.pop();
                    dispute.status = from;
                    dispute.version -= 1;
                    (
                        dispute.resolved_at,
                        dispute.resolution_note,
                        dispute.resolution_type,
                        dispute.meeting_request,
                    ) = saved;
                    return Err(MediationError::Collaborator(err.message));
                }
            }
        }

        info!(dispute = %dispute.id, %action, from = %from, to = %target, "dispute closed");
        self.notifier
            .notify(&transition_event(dispute, from, Some(action)));
        Ok(ResolveOutcome {
            status: dispute.status,
            resolution_type: Some(action),
            version: dispute.version,
        })
    }

    fn require(&self, actor: &Actor, permission: Permission) -> Result<(), MediationError> {
        if self.authorizer.has_permission(actor, permission) {
            Ok(())
        } else {
            Err(MediationError::PermissionDenied {
                actor: actor.id.to_string(),
                permission: permission.slug().to_string(),
            })
        }
    }

    fn entry(&self, dispute_id: DisputeId) -> Result<Arc<Mutex<Dispute>>, MediationError> {
        self.disputes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&dispute_id)
            .cloned()
            .ok_or_else(|| MediationError::NotFound(dispute_id.to_string()))
    }
}

/// Build the notification event for a committed transition.
fn transition_event(dispute: &Dispute, from: DisputeStatus, action: Option<ResolutionAction>) -> DisputeEvent {
    DisputeEvent {
        dispute_id: dispute.id,
        order_id: dispute.order_id,
        from,
        to: dispute.status,
        action,
        at: Timestamp::now(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
