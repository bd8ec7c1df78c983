//! # Realtime Channel
//!
//! Per-room fan-out over `tokio::sync::broadcast`. The channel is
//! stateless: it delivers at-least-once to whoever is subscribed at
//! publish time, and anyone who missed events recovers them from the
//! message store via `replay_since`. Strict per-room ordering is
//! guaranteed by the caller publishing under the room's send lock, in
//! append order.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use ombud_core::{ParticipantId, RoomId, Timestamp};

use crate::message::Message;

/// Buffered events per room topic. Slow subscribers that fall further
/// behind than this see a `Lagged` error and should re-join via replay.
const TOPIC_CAPACITY: usize = 256;

/// A room pause/resume announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    /// The room whose status changed.
    pub room_id: RoomId,
    /// True when the room is now paused.
    pub paused: bool,
    /// The mediator who changed the status.
    pub by: ParticipantId,
    /// When the change happened.
    pub at: Timestamp,
}

/// An event fanned out to room subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum RoomEvent {
    /// A message was appended to the room log.
    Message(Message),
    /// The room was paused or resumed.
    StatusChange(StatusChange),
}

/// Per-room broadcast topics.
#[derive(Default)]
pub struct RealtimeChannel {
    topics: RwLock<HashMap<RoomId, broadcast::Sender<RoomEvent>>>,
}

impl RealtimeChannel {
    /// Creates a channel with no topics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to a room, creating its topic on first use.
    pub fn subscribe(&self, room: RoomId) -> broadcast::Receiver<RoomEvent> {
        if let Some(sender) = self
            .topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&room)
        {
            return sender.subscribe();
        }
        self.topics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(room)
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe()
    }

    /// Publishes an event to a room's current subscribers. Returns how
    /// many subscribers received it; zero when nobody is listening.
    pub fn publish(&self, room: RoomId, event: RoomEvent) -> usize {
        let topics = self.topics.read().unwrap_or_else(PoisonError::into_inner);
        let reached = match topics.get(&room) {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => 0,
        };
        metrics::counter!("ombud_room_events_broadcast_total").increment(1);
        reached
    }

    /// Drops a room's topic once the room is released.
    pub fn drop_topic(&self, room: RoomId) {
        if self
            .topics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&room)
            .is_some()
        {
            debug!(room = %room, "room topic dropped");
        }
    }
}
