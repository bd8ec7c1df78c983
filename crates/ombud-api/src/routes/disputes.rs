//! # Dispute Routes
//!
//! Dispute lifecycle operations: opening, starting mediation, resolving
//! with an optimistic version check, and reopening closed disputes. All
//! business rules live in `ombud-dispute`; handlers translate between
//! the wire and the engine.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ombud_core::{DisputeId, MediationError, OrderId};
use ombud_dispute::{Dispute, DisputeStatus, MeetingRequest, ResolutionAction};

use crate::auth::AuthActor;
use crate::error::AppError;
use crate::state::AppState;

// ─── Wire types ──────────────────────────────────────────────────────

/// Request body for opening a dispute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenDisputeRequest {
    /// The disputed order.
    pub order_id: Uuid,
    /// Short reason code.
    pub reason: String,
    /// Free-text complaint details.
    pub details: String,
    /// Requested meeting date, for meeting disputes.
    pub meeting_date: Option<String>,
}

/// Response for a newly opened dispute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenDisputeResponse {
    /// The new dispute id.
    pub dispute_id: Uuid,
    /// Status after opening (always `open`).
    pub status: DisputeStatus,
    /// Version to use for the first resolve call.
    pub version: u64,
}

/// Response for starting mediation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartMediationResponse {
    /// The dispute under mediation.
    pub dispute_id: Uuid,
    /// Status after the call.
    pub status: DisputeStatus,
    /// The room opened for this mediation.
    pub room_id: Uuid,
}

/// Request body for resolving a dispute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    /// The resolution action slug.
    pub action: String,
    /// Resolution note; required for financial actions, carries the new
    /// date for `change_meeting_date`.
    pub note: Option<String>,
    /// The dispute version the caller last observed.
    pub expected_version: u64,
}

/// Response for a successful resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResponse {
    /// The resolved dispute.
    pub dispute_id: Uuid,
    /// Status after the action.
    pub status: DisputeStatus,
    /// The applied action, when it closed the dispute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_type: Option<ResolutionAction>,
    /// Version after the action.
    pub version: u64,
}

/// Request body for reopening a dispute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReopenRequest {
    /// New meeting date; required for meeting disputes.
    pub new_meeting_date: Option<String>,
    /// Explicit confirmation; required for non-meeting disputes.
    #[serde(default)]
    pub confirmed: bool,
}

/// Response for a reopened dispute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReopenResponse {
    /// The reopened dispute.
    pub dispute_id: Uuid,
    /// Status after reopening (always `open`).
    pub status: DisputeStatus,
    /// Preserved complaint details.
    pub details: String,
    /// The meeting request after reopening, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meeting_request: Option<MeetingRequest>,
    /// Version after reopening.
    pub version: u64,
}

// ─── Router ──────────────────────────────────────────────────────────

/// The disputes router, nested under `/v1/disputes`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(open_dispute))
        .route("/{id}", get(get_dispute))
        .route("/{id}/start-mediation", post(start_mediation))
        .route("/{id}/resolve", post(resolve))
        .route("/{id}/reopen", post(reopen))
}

// ─── Handlers ────────────────────────────────────────────────────────

async fn open_dispute(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    Json(request): Json<OpenDisputeRequest>,
) -> Result<Json<OpenDisputeResponse>, AppError> {
    if request.reason.trim().is_empty() {
        return Err(MediationError::Validation("reason must not be empty".into()).into());
    }
    let mut dispute = Dispute::open(
        OrderId::from_uuid(request.order_id),
        actor.id,
        request.reason,
        request.details,
    );
    if let Some(date) = request.meeting_date.filter(|d| !d.trim().is_empty()) {
        dispute = dispute.with_meeting_request(date);
    }
    let version = dispute.version;
    let dispute_id = state.lifecycle.admit(dispute);
    Ok(Json(OpenDisputeResponse {
        dispute_id: *dispute_id.as_uuid(),
        status: DisputeStatus::Open,
        version,
    }))
}

async fn get_dispute(
    State(state): State<AppState>,
    AuthActor(_actor): AuthActor,
    Path(id): Path<Uuid>,
) -> Result<Json<Dispute>, AppError> {
    let dispute = state.lifecycle.snapshot(DisputeId::from_uuid(id))?;
    Ok(Json(dispute))
}

async fn start_mediation(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
) -> Result<Json<StartMediationResponse>, AppError> {
    let dispute_id = DisputeId::from_uuid(id);
    let status = state.lifecycle.start_mediation(&actor, dispute_id)?;
    // The mediation room opens alongside analysis; reopening an existing
    // room is a lookup, so the repeat-call path stays idempotent.
    let room = state.rooms.open_room(dispute_id)?;
    Ok(Json(StartMediationResponse {
        dispute_id: id,
        status,
        room_id: *room.id().as_uuid(),
    }))
}

async fn resolve(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<ResolveResponse>, AppError> {
    let action = parse_action(&request.action)?;
    let outcome = state.lifecycle.resolve(
        &actor,
        DisputeId::from_uuid(id),
        request.expected_version,
        action,
        request.note.as_deref(),
    )?;
    Ok(Json(ResolveResponse {
        dispute_id: id,
        status: outcome.status,
        resolution_type: outcome.resolution_type,
        version: outcome.version,
    }))
}

async fn reopen(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
    Json(request): Json<ReopenRequest>,
) -> Result<Json<ReopenResponse>, AppError> {
    let dispute = state.lifecycle.reopen(
        &actor,
        DisputeId::from_uuid(id),
        request.new_meeting_date.as_deref(),
        request.confirmed,
    )?;
    Ok(Json(ReopenResponse {
        dispute_id: id,
        status: dispute.status,
        details: dispute.details,
        meeting_request: dispute.meeting_request,
        version: dispute.version,
    }))
}

/// Validates the resolution action slug.
fn parse_action(action: &str) -> Result<ResolutionAction, AppError> {
    ResolutionAction::parse(action).ok_or_else(|| {
        MediationError::Validation(format!(
            "unknown resolution action {action:?}; expected one of refund_client, \
             release_provider, dismiss, cancel_dispute, change_meeting_date"
        ))
        .into()
    })
}
