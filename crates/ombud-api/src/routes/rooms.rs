//! # Room Routes
//!
//! Realtime mediation room endpoints: opening a room for a dispute,
//! subscribing over SSE (join + replay + live), sending messages,
//! moderation, and client decisions.
//!
//! The SSE stream emits the room's history first, then live events; both
//! carry the `{type, payload}` envelope and consumers dedupe by message
//! `seq`.

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use uuid::Uuid;

use ombud_core::{AttachmentId, DisputeId, MessageId, RoomId};
use ombud_room::{Message, RoomEvent};

use crate::auth::AuthActor;
use crate::error::AppError;
use crate::state::AppState;

// ─── Wire types ──────────────────────────────────────────────────────

/// Request body for opening a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenRoomRequest {
    /// The dispute to mediate.
    pub dispute_id: Uuid,
}

/// Response for an opened room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenRoomResponse {
    /// The room id.
    pub room_id: Uuid,
    /// The mediated dispute.
    pub dispute_id: Uuid,
    /// Whether the room is paused.
    pub paused: bool,
}

/// Request body for sending a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    /// Message text; may be omitted for attachment-only messages.
    pub body: Option<String>,
    /// Ids of attachments that finished compression.
    #[serde(default)]
    pub attachment_ids: Vec<Uuid>,
}

/// Request body for a client decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRequest {
    /// Whether the client accepts the proposed resolution.
    pub agreed: bool,
}

/// Acknowledgment for moderation calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationResponse {
    /// The moderated room.
    pub room_id: Uuid,
    /// Whether the room is now paused.
    pub paused: bool,
}

/// Acknowledgment for leaving a room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveResponse {
    /// The left room.
    pub room_id: Uuid,
    /// True when the room was released (last participant left).
    pub released: bool,
}

// ─── Router ──────────────────────────────────────────────────────────

/// The rooms router, nested under `/v1/rooms`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(open_room))
        .route("/{id}/subscribe", get(subscribe))
        .route("/{id}/messages", post(send_message))
        .route("/{id}/messages/{message_id}/read", post(mark_read))
        .route("/{id}/pause", post(pause))
        .route("/{id}/resume", post(resume))
        .route("/{id}/decision", post(decision))
        .route("/{id}/leave", post(leave))
}

// ─── Handlers ────────────────────────────────────────────────────────

async fn open_room(
    State(state): State<AppState>,
    AuthActor(_actor): AuthActor,
    Json(request): Json<OpenRoomRequest>,
) -> Result<Json<OpenRoomResponse>, AppError> {
    let room = state
        .rooms
        .open_room(DisputeId::from_uuid(request.dispute_id))?;
    Ok(Json(OpenRoomResponse {
        room_id: *room.id().as_uuid(),
        dispute_id: request.dispute_id,
        paused: room.is_paused(),
    }))
}

async fn subscribe(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let room = state.rooms.get(RoomId::from_uuid(id))?;
    let joined = room.join(&actor);

    let replay = tokio_stream::iter(joined.history.into_iter().map(RoomEvent::Message));
    // Lagged subscribers drop the error and rely on replay at reconnect.
    let live = BroadcastStream::new(joined.live).filter_map(|result| result.ok());
    let stream = replay
        .chain(live)
        .map(|event| Event::default().json_data(&event));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn send_message(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
    Json(request): Json<SendMessageRequest>,
) -> Result<Json<Message>, AppError> {
    let room = state.rooms.get(RoomId::from_uuid(id))?;
    let attachment_ids: Vec<AttachmentId> = request
        .attachment_ids
        .into_iter()
        .map(AttachmentId::from_uuid)
        .collect();
    let message = room.send(&actor, request.body, &attachment_ids).await?;
    Ok(Json(message))
}

async fn mark_read(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    Path((id, message_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<serde_json::Value>, AppError> {
    let room = state.rooms.get(RoomId::from_uuid(id))?;
    room.mark_read(actor.id, MessageId::from_uuid(message_id))?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

async fn pause(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
) -> Result<Json<ModerationResponse>, AppError> {
    let room = state.rooms.get(RoomId::from_uuid(id))?;
    room.pause(&actor).await?;
    Ok(Json(ModerationResponse {
        room_id: id,
        paused: true,
    }))
}

async fn resume(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
) -> Result<Json<ModerationResponse>, AppError> {
    let room = state.rooms.get(RoomId::from_uuid(id))?;
    room.resume(&actor).await?;
    Ok(Json(ModerationResponse {
        room_id: id,
        paused: false,
    }))
}

async fn decision(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
    Json(request): Json<DecisionRequest>,
) -> Result<Json<Message>, AppError> {
    let room = state.rooms.get(RoomId::from_uuid(id))?;
    let message = room.submit_decision(&actor, request.agreed).await?;
    Ok(Json(message))
}

async fn leave(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
    Path(id): Path<Uuid>,
) -> Result<Json<LeaveResponse>, AppError> {
    let released = state.rooms.leave(RoomId::from_uuid(id), actor.id)?;
    Ok(Json(LeaveResponse {
        room_id: id,
        released,
    }))
}
