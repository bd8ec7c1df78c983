//! # Domain Identity Newtypes
//!
//! Newtype wrappers for all identifiers in the mediation service. These
//! prevent accidental identifier confusion — you cannot pass a `RoomId`
//! where a `DisputeId` is expected, even though both wrap a `Uuid`.
//!
//! `AttachmentId` is deliberately constructible from a caller-supplied
//! uuid: attachment ids are generated client-side so that a retried
//! upload reuses the same identity instead of duplicating work.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing uuid (e.g. one parsed from a request path).
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Access the inner UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }
    };
}

id_newtype!(
    /// Unique identifier for a dispute between a client and a provider.
    DisputeId,
    "dispute"
);

id_newtype!(
    /// Identifier of the marketplace order a dispute refers to.
    ///
    /// Orders are owned by the external order collaborator; this service
    /// only ever references them.
    OrderId,
    "order"
);

id_newtype!(
    /// Unique identifier for a mediation chat room.
    RoomId,
    "room"
);

id_newtype!(
    /// Server-assigned identifier for a persisted chat message.
    MessageId,
    "message"
);

id_newtype!(
    /// Client-generated identifier for an attachment, stable across retries.
    AttachmentId,
    "attachment"
);

id_newtype!(
    /// Identifier for a participant (client, provider, or mediator).
    ParticipantId,
    "participant"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(DisputeId::new(), DisputeId::new());
        assert_ne!(MessageId::new(), MessageId::new());
    }

    #[test]
    fn test_display_prefixes() {
        let id = Uuid::nil();
        assert_eq!(
            DisputeId::from_uuid(id).to_string(),
            format!("dispute:{id}")
        );
        assert_eq!(RoomId::from_uuid(id).to_string(), format!("room:{id}"));
        assert_eq!(
            AttachmentId::from_uuid(id).to_string(),
            format!("attachment:{id}")
        );
    }

    #[test]
    fn test_from_uuid_is_stable() {
        // Client-generated attachment ids must survive a retry unchanged.
        let raw = Uuid::new_v4();
        assert_eq!(AttachmentId::from_uuid(raw), AttachmentId::from_uuid(raw));
    }

    #[test]
    fn test_serde_roundtrip() {
        let id = ParticipantId::new();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: ParticipantId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }
}
