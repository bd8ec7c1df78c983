//! # ombud-room — Realtime Mediation Rooms
//!
//! The chat layer of the Ombud mediation service. Three pieces compose
//! into a room:
//!
//! ```text
//! MediationRoom ──▶ MessageStore      append-only per-room log (truth)
//!       │
//!       └─────────▶ RealtimeChannel   per-room broadcast fan-out
//! ```
//!
//! - **Messages** (`message.rs`): immutable message entity; moderation
//!   and client decisions are new system messages, never edits.
//! - **Store** (`store.rs`): single writer of truth; seq, id, and
//!   timestamp assigned atomically under the room log lock. Compressed
//!   attachment payloads live beside it in an `AttachmentStore`.
//! - **Channel** (`channel.rs`): stateless at-least-once fan-out; missed
//!   events are recovered by store replay.
//! - **Rooms** (`room.rs`): role-aware sessions gated on dispute state,
//!   with pause/resume moderation and attachment hand-off; `RoomManager`
//!   releases rooms when their last participant leaves.
//!
//! ## Ordering Contract
//!
//! Within one room every subscriber observes events in exactly the log's
//! append order: append and publish happen together under the room's
//! send lock.

pub mod channel;
pub mod message;
pub mod room;
pub mod store;

pub use channel::{RealtimeChannel, RoomEvent, StatusChange};
pub use message::{Message, MessageKind, NewMessage, SystemEvent};
pub use room::{JoinedRoom, MediationRoom, RoomManager};
pub use store::{AttachmentStore, InMemoryAttachmentStore, InMemoryMessageStore, MessageStore};
