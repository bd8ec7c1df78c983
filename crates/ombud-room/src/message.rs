//! # Room Messages
//!
//! The message entity for mediation rooms. Messages are immutable once
//! appended: moderation actions and client decisions are modeled as new
//! system messages rather than edits to existing ones.

use serde::{Deserialize, Serialize};

use ombud_core::{MessageId, ParticipantId, ParticipantRole, RoomId, Timestamp};
use ombud_media::AttachmentRecord;

/// A non-user event recorded in the room log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SystemEvent {
    /// A mediator paused the room.
    Paused {
        /// The pausing mediator.
        by: ParticipantId,
    },
    /// A mediator resumed the room.
    Resumed {
        /// The resuming mediator.
        by: ParticipantId,
    },
    /// The client formally accepted or rejected the proposed resolution.
    ///
    /// Advisory only; dispute state is never changed by a decision.
    Decision {
        /// The deciding client.
        participant: ParticipantId,
        /// Whether the client agreed.
        agreed: bool,
    },
}

/// Whether a message was typed by a participant or recorded by the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageKind {
    /// A participant-authored chat message.
    User,
    /// A room-recorded event.
    System(SystemEvent),
}

/// A message as persisted in the room log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Server-assigned identifier.
    pub id: MessageId,
    /// The room this message belongs to.
    pub room_id: RoomId,
    /// Who sent (or triggered) the message.
    pub sender_id: ParticipantId,
    /// The sender's role at send time.
    pub sender_role: ParticipantRole,
    /// User message or system event.
    pub kind: MessageKind,
    /// Message text. May be empty for attachment-only messages.
    pub body: String,
    /// Compressed attachments delivered with the message.
    pub attachments: Vec<AttachmentRecord>,
    /// Server-assigned creation time.
    pub created_at: Timestamp,
    /// Per-room sequence number, strictly increasing from 1.
    pub seq: u64,
    /// Whether the broadcast reached at least one live subscriber.
    pub delivered: bool,
    /// Participants who have acknowledged reading the message.
    pub read_by: Vec<ParticipantId>,
}

/// A message as handed to the store, before server-side fields exist.
#[derive(Debug, Clone)]
pub struct NewMessage {
    /// The room to append into.
    pub room_id: RoomId,
    /// Who is sending.
    pub sender_id: ParticipantId,
    /// The sender's role.
    pub sender_role: ParticipantRole,
    /// User message or system event.
    pub kind: MessageKind,
    /// Message text.
    pub body: String,
    /// Attachments that survived compression.
    pub attachments: Vec<AttachmentRecord>,
}

impl NewMessage {
    /// A plain user message.
    pub fn user(
        room_id: RoomId,
        sender_id: ParticipantId,
        sender_role: ParticipantRole,
        body: impl Into<String>,
    ) -> Self {
        Self {
            room_id,
            sender_id,
            sender_role,
            kind: MessageKind::User,
            body: body.into(),
            attachments: Vec::new(),
        }
    }

    /// A system message recording a room event.
    pub fn system(
        room_id: RoomId,
        sender_id: ParticipantId,
        sender_role: ParticipantRole,
        event: SystemEvent,
        body: impl Into<String>,
    ) -> Self {
        Self {
            room_id,
            sender_id,
            sender_role,
            kind: MessageKind::System(event),
            body: body.into(),
            attachments: Vec::new(),
        }
    }
}
