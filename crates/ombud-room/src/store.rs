//! # Message Store
//!
//! The append-only, per-room message log — the single source of truth for
//! room history. `append` assigns the server-side id, sequence number,
//! and timestamp atomically under the room's log lock, so two concurrent
//! appends can never interleave partial writes or share a sequence
//! number.
//!
//! The realtime channel is deliberately stateless; reconnect recovery is
//! `replay_since` against this store.
//!
//! Compressed attachment payloads live next to the log in an
//! [`AttachmentStore`]: the message carries the metadata record, the
//! blob store carries the bytes recipients download.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::debug;

use ombud_core::{AttachmentId, MediationError, MessageId, ParticipantId, RoomId, Timestamp};

use crate::message::{Message, NewMessage};

/// Persistence seam for room messages.
///
/// The in-memory implementation below is the default; a database-backed
/// store implements the same contract.
pub trait MessageStore: Send + Sync {
    /// Append a message, assigning id, seq, and timestamp server-side.
    fn append(&self, draft: NewMessage) -> Result<Message, MediationError>;

    /// Full history for a room, oldest first. Unknown rooms are empty.
    fn history(&self, room: RoomId) -> Vec<Message>;

    /// Messages with `seq` strictly greater than `after_seq`, oldest
    /// first. Reconnect recovery.
    fn replay_since(&self, room: RoomId, after_seq: u64) -> Vec<Message>;

    /// Record that the broadcast reached at least one live subscriber.
    fn mark_delivered(&self, room: RoomId, message: MessageId) -> Result<(), MediationError>;

    /// Record a per-participant read acknowledgment. Repeats are no-ops.
    fn mark_read(
        &self,
        room: RoomId,
        message: MessageId,
        participant: ParticipantId,
    ) -> Result<(), MediationError>;
}

/// Persistence seam for compressed attachment payloads.
///
/// Bytes are written once, when the message referencing them is sent,
/// and read on every download.
pub trait AttachmentStore: Send + Sync {
    /// Stores the compressed bytes for an attachment.
    fn put(&self, id: AttachmentId, bytes: Vec<u8>) -> Result<(), MediationError>;

    /// The compressed bytes of a delivered attachment.
    fn fetch(&self, id: AttachmentId) -> Result<Vec<u8>, MediationError>;
}

// ─── In-memory implementation ────────────────────────────────────────

struct RoomLog {
    next_seq: u64,
    messages: Vec<Message>,
}

impl RoomLog {
    fn new() -> Self {
        Self {
            next_seq: 1,
            messages: Vec::new(),
        }
    }
}

/// Process-local [`MessageStore`].
///
/// One mutex per room log; the outer map lock is held only long enough
/// to find or create the log.
#[derive(Default)]
pub struct InMemoryMessageStore {
    rooms: RwLock<HashMap<RoomId, Arc<Mutex<RoomLog>>>>,
}

impl InMemoryMessageStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self, room: RoomId) -> Arc<Mutex<RoomLog>> {
        if let Some(log) = self
            .rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&room)
        {
            return log.clone();
        }
        self.rooms
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(room)
            .or_insert_with(|| Arc::new(Mutex::new(RoomLog::new())))
            .clone()
    }

    fn existing_log(&self, room: RoomId) -> Result<Arc<Mutex<RoomLog>>, MediationError> {
        self.rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&room)
            .cloned()
            .ok_or_else(|| MediationError::NotFound(format!("room {room}")))
    }
}

impl MessageStore for InMemoryMessageStore {
    fn append(&self, draft: NewMessage) -> Result<Message, MediationError> {
        let log = self.log(draft.room_id);
        let mut log = log.lock().unwrap_or_else(PoisonError::into_inner);
        let message = Message {
            id: MessageId::new(),
            room_id: draft.room_id,
            sender_id: draft.sender_id,
            sender_role: draft.sender_role,
            kind: draft.kind,
            body: draft.body,
            attachments: draft.attachments,
            created_at: Timestamp::now(),
            seq: log.next_seq,
            delivered: false,
            read_by: Vec::new(),
        };
        log.next_seq += 1;
        log.messages.push(message.clone());
        metrics::counter!("ombud_messages_appended_total").increment(1);
        debug!(room = %message.room_id, seq = message.seq, "message appended");
        Ok(message)
    }

    fn history(&self, room: RoomId) -> Vec<Message> {
        match self.existing_log(room) {
            Ok(log) => log
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .messages
                .clone(),
            Err(_) => Vec::new(),
        }
    }

    fn replay_since(&self, room: RoomId, after_seq: u64) -> Vec<Message> {
        match self.existing_log(room) {
            Ok(log) => log
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .messages
                .iter()
                .filter(|m| m.seq > after_seq)
                .cloned()
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn mark_delivered(&self, room: RoomId, message: MessageId) -> Result<(), MediationError> {
        let log = self.existing_log(room)?;
        let mut log = log.lock().unwrap_or_else(PoisonError::into_inner);
        let found = log
            .messages
            .iter_mut()
            .rev()
            .find(|m| m.id == message)
            .ok_or_else(|| MediationError::NotFound(format!("message {message}")))?;
        found.delivered = true;
        Ok(())
    }

    fn mark_read(
        &self,
        room: RoomId,
        message: MessageId,
        participant: ParticipantId,
    ) -> Result<(), MediationError> {
        let log = self.existing_log(room)?;
        let mut log = log.lock().unwrap_or_else(PoisonError::into_inner);
        let found = log
            .messages
            .iter_mut()
            .rev()
            .find(|m| m.id == message)
            .ok_or_else(|| MediationError::NotFound(format!("message {message}")))?;
        if !found.read_by.contains(&participant) {
            found.read_by.push(participant);
        }
        Ok(())
    }
}

/// Process-local [`AttachmentStore`].
#[derive(Default)]
pub struct InMemoryAttachmentStore {
    blobs: RwLock<HashMap<AttachmentId, Arc<Vec<u8>>>>,
}

impl InMemoryAttachmentStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl AttachmentStore for InMemoryAttachmentStore {
    fn put(&self, id: AttachmentId, bytes: Vec<u8>) -> Result<(), MediationError> {
        self.blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(bytes));
        Ok(())
    }

    fn fetch(&self, id: AttachmentId) -> Result<Vec<u8>, MediationError> {
        self.blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .map(|bytes| bytes.as_ref().clone())
            .ok_or_else(|| MediationError::NotFound(format!("attachment {id}")))
    }
}
