//! # Mediation Rooms
//!
//! A [`MediationRoom`] is the realtime chat session attached to one
//! active dispute. It composes the message store (truth), the realtime
//! channel (fan-out), the attachment processor (deliverables), and the
//! dispute lifecycle (state gating). The room owns no messages itself.
//!
//! ## Ordering
//!
//! Every append+publish pair runs under the room's async send lock, so
//! the broadcast order seen by every subscriber is exactly the append
//! order of the log. Sends from different rooms never contend.
//!
//! ## Moderation
//!
//! A mediator may pause a room; while paused, non-mediator sends fail
//! with `RoomPaused`. Pause and resume are themselves recorded as system
//! messages and announced as `StatusChange` events.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio::sync::broadcast;
use tracing::{info, warn};

use ombud_core::{
    Actor, AttachmentId, Authorizer, DisputeId, MediationError, MessageId, ParticipantId,
    ParticipantRole, Permission, RoomId, Timestamp,
};
use ombud_dispute::DisputeLifecycle;
use ombud_media::{AttachmentProcessor, AttachmentRecord};

use crate::channel::{RealtimeChannel, RoomEvent, StatusChange};
use crate::message::{Message, MessageKind, NewMessage, SystemEvent};
use crate::store::{AttachmentStore, MessageStore};

// ─── Joined view ─────────────────────────────────────────────────────

/// What a participant gets back from joining a room: the full history
/// plus a live event receiver.
///
/// The receiver is subscribed before the history snapshot is taken, so
/// an event may appear in both; consumers dedupe by `seq`. Duplicates
/// are recoverable, gaps are not.
pub struct JoinedRoom {
    /// The joined room.
    pub room_id: RoomId,
    /// Everything appended so far, oldest first.
    pub history: Vec<Message>,
    /// Live events from this moment on.
    pub live: broadcast::Receiver<RoomEvent>,
}

// ─── Room ────────────────────────────────────────────────────────────

/// The chat session for one active dispute.
pub struct MediationRoom {
    id: RoomId,
    dispute_id: DisputeId,
    paused: AtomicBool,
    participants: Mutex<HashMap<ParticipantId, ParticipantRole>>,
    send_lock: tokio::sync::Mutex<()>,
    store: Arc<dyn MessageStore>,
    attachments: Arc<dyn AttachmentStore>,
    channel: Arc<RealtimeChannel>,
    lifecycle: Arc<DisputeLifecycle>,
    processor: Arc<AttachmentProcessor>,
    authorizer: Arc<dyn Authorizer>,
}

impl std::fmt::Debug for MediationRoom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediationRoom")
            .field("id", &self.id)
            .field("dispute_id", &self.dispute_id)
            .finish_non_exhaustive()
    }
}

impl MediationRoom {
    fn new(
        id: RoomId,
        dispute_id: DisputeId,
        store: Arc<dyn MessageStore>,
        attachments: Arc<dyn AttachmentStore>,
        channel: Arc<RealtimeChannel>,
        lifecycle: Arc<DisputeLifecycle>,
        processor: Arc<AttachmentProcessor>,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        Self {
            id,
            dispute_id,
            paused: AtomicBool::new(false),
            participants: Mutex::new(HashMap::new()),
            send_lock: tokio::sync::Mutex::new(()),
            store,
            attachments,
            channel,
            lifecycle,
            processor,
            authorizer,
        }
    }

    /// The room identifier.
    pub fn id(&self) -> RoomId {
        self.id
    }

    /// The dispute this room mediates.
    pub fn dispute_id(&self) -> DisputeId {
        self.dispute_id
    }

    /// Whether the room is currently paused.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Currently joined participants.
    pub fn participant_count(&self) -> usize {
        self.participants
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Joins the room: registers the participant, subscribes to live
    /// events, and returns the history.
    pub fn join(&self, actor: &Actor) -> JoinedRoom {
        self.participants
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(actor.id, actor.role());
        let live = self.channel.subscribe(self.id);
        let history = self.store.history(self.id);
        info!(room = %self.id, participant = %actor.id, role = %actor.role(), "participant joined");
        JoinedRoom {
            room_id: self.id,
            history,
            live,
        }
    }

    /// Removes a participant. Returns true when the room is now empty.
    pub fn leave(&self, participant: ParticipantId) -> bool {
        let mut participants = self
            .participants
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        participants.remove(&participant);
        participants.is_empty()
    }

    /// Pauses the room. Mediator-only; repeats are no-ops.
    pub async fn pause(&self, actor: &Actor) -> Result<(), MediationError> {
        self.set_paused(actor, true).await
    }

    /// Resumes the room. Mediator-only; repeats are no-ops.
    pub async fn resume(&self, actor: &Actor) -> Result<(), MediationError> {
        self.set_paused(actor, false).await
    }

    async fn set_paused(&self, actor: &Actor, paused: bool) -> Result<(), MediationError> {
        if !self.authorizer.has_permission(actor, Permission::ModerateRoom) {
            return Err(MediationError::PermissionDenied {
                actor: actor.id.to_string(),
                permission: Permission::ModerateRoom.slug().into(),
            });
        }

        let _guard = self.send_lock.lock().await;
        if self.paused.swap(paused, Ordering::SeqCst) == paused {
            return Ok(());
        }

        let (event, body) = if paused {
            (SystemEvent::Paused { by: actor.id }, "room paused by a mediator")
        } else {
            (SystemEvent::Resumed { by: actor.id }, "room resumed by a mediator")
        };
        let message = self.store.append(NewMessage::system(
            self.id,
            actor.id,
            actor.role(),
            event,
            body,
        ))?;
        self.channel.publish(self.id, RoomEvent::Message(message));
        self.channel.publish(
            self.id,
            RoomEvent::StatusChange(StatusChange {
                room_id: self.id,
                paused,
                by: actor.id,
                at: Timestamp::now(),
            }),
        );
        info!(room = %self.id, by = %actor.id, paused, "room status changed");
        Ok(())
    }

    /// Sends a message into the room.
    ///
    /// Attachments are referenced by id; the compressed bytes of every
    /// usable one are persisted for download, while entries whose
    /// compression was cancelled or failed are dropped from the message
    /// rather than failing the whole send. A send with no body and no
    /// usable attachment is refused. The call returns once the message
    /// is durably appended; fan-out to subscribers is not awaited.
    pub async fn send(
        &self,
        actor: &Actor,
        body: Option<String>,
        attachment_ids: &[AttachmentId],
    ) -> Result<Message, MediationError> {
        if !self
            .authorizer
            .has_permission(actor, Permission::SendRoomMessage)
        {
            return Err(MediationError::PermissionDenied {
                actor: actor.id.to_string(),
                permission: Permission::SendRoomMessage.slug().into(),
            });
        }
        self.ensure_dispute_active("send_message")?;

        let _guard = self.send_lock.lock().await;
        // Pauses commit under the send lock; the flag must be read under
        // it too, or a send queued behind a pending pause lands in the
        // log after the pause record.
        if self.is_paused() && !actor.role().is_mediator() {
            return Err(MediationError::RoomPaused {
                room: self.id.to_string(),
            });
        }

        let attachments = self.collect_attachments(attachment_ids)?;
        let body = body.map(|s| s.trim().to_string()).unwrap_or_default();
        if body.is_empty() && attachments.is_empty() {
            return Err(if attachment_ids.is_empty() {
                MediationError::Validation("message has no body and no attachments".into())
            } else {
                MediationError::Validation(
                    "no attachment finished compression and the message has no body".into(),
                )
            });
        }

        let mut message = self.store.append(NewMessage {
            room_id: self.id,
            sender_id: actor.id,
            sender_role: actor.role(),
            kind: MessageKind::User,
            body,
            attachments,
        })?;

        let reached = self
            .channel
            .publish(self.id, RoomEvent::Message(message.clone()));
        // The broadcast cannot attribute receivers, so the sender's own
        // subscription is excluded via the participant roster: delivery
        // means someone else was around to hear it.
        if reached > 0 && self.another_participant_joined(actor.id) {
            self.store.mark_delivered(self.id, message.id)?;
            message.delivered = true;
        }
        Ok(message)
    }

    /// Records the client's formal accept/reject of the proposed
    /// resolution as a system message. Advisory: dispute state is never
    /// changed here, a mediator acts on it via `resolve`.
    pub async fn submit_decision(
        &self,
        actor: &Actor,
        agreed: bool,
    ) -> Result<Message, MediationError> {
        if actor.role() != ParticipantRole::Client {
            return Err(MediationError::PermissionDenied {
                actor: actor.id.to_string(),
                permission: "rooms.decision".into(),
            });
        }
        self.ensure_dispute_active("submit_decision")?;

        let _guard = self.send_lock.lock().await;
        let body = if agreed {
            "client accepted the proposed resolution"
        } else {
            "client rejected the proposed resolution"
        };
        let message = self.store.append(NewMessage::system(
            self.id,
            actor.id,
            actor.role(),
            SystemEvent::Decision {
                participant: actor.id,
                agreed,
            },
            body,
        ))?;
        self.channel
            .publish(self.id, RoomEvent::Message(message.clone()));
        info!(room = %self.id, client = %actor.id, agreed, "decision submitted");
        Ok(message)
    }

    /// Per-participant read acknowledgment.
    pub fn mark_read(
        &self,
        participant: ParticipantId,
        message: MessageId,
    ) -> Result<(), MediationError> {
        self.store.mark_read(self.id, message, participant)
    }

    fn ensure_dispute_active(&self, operation: &str) -> Result<(), MediationError> {
        let dispute = self.lifecycle.snapshot(self.dispute_id)?;
        if dispute.status.is_terminal() {
            return Err(MediationError::InvalidState {
                entity: self.dispute_id.to_string(),
                current: dispute.status.to_string(),
                operation: operation.into(),
                terminal: true,
            });
        }
        Ok(())
    }

    /// Takes the output of every attachment that finished compression and
    /// persists the bytes for download; drops the rest with a warning.
    fn collect_attachments(
        &self,
        ids: &[AttachmentId],
    ) -> Result<Vec<AttachmentRecord>, MediationError> {
        let mut records = Vec::with_capacity(ids.len());
        for &id in ids {
            match self.processor.take_output(id) {
                Ok((record, bytes)) => {
                    self.attachments.put(record.id, bytes)?;
                    records.push(record);
                }
                Err(err) => {
                    warn!(room = %self.id, attachment = %id, %err, "attachment dropped from message");
                }
            }
        }
        Ok(records)
    }

    fn another_participant_joined(&self, sender: ParticipantId) -> bool {
        self.participants
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .any(|joined| *joined != sender)
    }
}

// ─── Manager ─────────────────────────────────────────────────────────

struct Registry {
    by_id: HashMap<RoomId, Arc<MediationRoom>>,
    by_dispute: HashMap<DisputeId, RoomId>,
}

/// Owns the active rooms, one per dispute under mediation.
///
/// Rooms are created on demand and released when their last participant
/// leaves; history stays in the store either way.
pub struct RoomManager {
    store: Arc<dyn MessageStore>,
    attachments: Arc<dyn AttachmentStore>,
    channel: Arc<RealtimeChannel>,
    lifecycle: Arc<DisputeLifecycle>,
    processor: Arc<AttachmentProcessor>,
    authorizer: Arc<dyn Authorizer>,
    registry: RwLock<Registry>,
}

impl RoomManager {
    /// Creates a manager wired to its collaborators.
    pub fn new(
        store: Arc<dyn MessageStore>,
        attachments: Arc<dyn AttachmentStore>,
        channel: Arc<RealtimeChannel>,
        lifecycle: Arc<DisputeLifecycle>,
        processor: Arc<AttachmentProcessor>,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        Self {
            store,
            attachments,
            channel,
            lifecycle,
            processor,
            authorizer,
            registry: RwLock::new(Registry {
                by_id: HashMap::new(),
                by_dispute: HashMap::new(),
            }),
        }
    }

    /// The room for a dispute, created on first use. The dispute must be
    /// admitted to the lifecycle engine.
    pub fn open_room(&self, dispute_id: DisputeId) -> Result<Arc<MediationRoom>, MediationError> {
        // Existence check doubles as NotFound for unknown disputes.
        self.lifecycle.snapshot(dispute_id)?;

        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(room_id) = registry.by_dispute.get(&dispute_id) {
            if let Some(room) = registry.by_id.get(room_id) {
                return Ok(room.clone());
            }
        }
        let room_id = RoomId::new();
        let room = Arc::new(MediationRoom::new(
            room_id,
            dispute_id,
            self.store.clone(),
            self.attachments.clone(),
            self.channel.clone(),
            self.lifecycle.clone(),
            self.processor.clone(),
            self.authorizer.clone(),
        ));
        registry.by_id.insert(room_id, room.clone());
        registry.by_dispute.insert(dispute_id, room_id);
        info!(room = %room_id, dispute = %dispute_id, "room opened");
        Ok(room)
    }

    /// Look up an active room by id.
    pub fn get(&self, room_id: RoomId) -> Result<Arc<MediationRoom>, MediationError> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_id
            .get(&room_id)
            .cloned()
            .ok_or_else(|| MediationError::NotFound(format!("room {room_id}")))
    }

    /// Look up the active room for a dispute, if one is open.
    pub fn room_for_dispute(&self, dispute_id: DisputeId) -> Option<Arc<MediationRoom>> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
        registry
            .by_dispute
            .get(&dispute_id)
            .and_then(|room_id| registry.by_id.get(room_id))
            .cloned()
    }

    /// Removes a participant from a room, releasing the room when it is
    /// now empty. Returns true when the room was released.
    pub fn leave(
        &self,
        room_id: RoomId,
        participant: ParticipantId,
    ) -> Result<bool, MediationError> {
        let room = self.get(room_id)?;
        if !room.leave(participant) {
            return Ok(false);
        }
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        // A participant may have joined between the emptiness check and
        // taking the registry lock; re-check under it.
        if room.participant_count() > 0 {
            return Ok(false);
        }
        registry.by_id.remove(&room_id);
        registry.by_dispute.remove(&room.dispute_id());
        drop(registry);
        self.channel.drop_topic(room_id);
        info!(room = %room_id, dispute = %room.dispute_id(), "room released");
        Ok(true)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
