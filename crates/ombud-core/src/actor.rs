//! # Actors, Roles, and Permissions
//!
//! The authorization model for the mediation subsystem. An [`Actor`] is an
//! identity plus a [`Grant`]: either a marketplace role or the `AllAccess`
//! capability. The capability is resolved **once** at the service boundary
//! and checked structurally — there is no bypass string compared deep
//! inside call sites.
//!
//! ## Permissions
//!
//! | Slug               | Gates                                   |
//! |--------------------|-----------------------------------------|
//! | `disputes.manage`  | `start_mediation`, `reopen`             |
//! | `disputes.resolve` | `resolve`                               |
//! | `rooms.message`    | sending messages in a mediation room    |
//! | `rooms.moderate`   | pausing/resuming a room                 |

use serde::{Deserialize, Serialize};

use crate::identity::ParticipantId;

// ─── Roles ───────────────────────────────────────────────────────────

/// The role a participant plays in a mediation room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    /// The customer side of the disputed order.
    Client,
    /// The service provider side of the disputed order.
    Provider,
    /// A marketplace mediator.
    Admin,
}

impl ParticipantRole {
    /// Whether this role mediates rather than litigates.
    pub fn is_mediator(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl std::fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Client => "client",
            Self::Provider => "provider",
            Self::Admin => "admin",
        };
        f.write_str(s)
    }
}

// ─── Permissions ─────────────────────────────────────────────────────

/// A permission required by a mediation operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Start mediation and reopen closed disputes.
    ManageDisputes,
    /// Issue resolution actions with financial side effects.
    ResolveDisputes,
    /// Send messages in a mediation room.
    SendRoomMessage,
    /// Pause and resume a mediation room.
    ModerateRoom,
}

impl Permission {
    /// The wire slug for this permission.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::ManageDisputes => "disputes.manage",
            Self::ResolveDisputes => "disputes.resolve",
            Self::SendRoomMessage => "rooms.message",
            Self::ModerateRoom => "rooms.moderate",
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}

// ─── Grants ──────────────────────────────────────────────────────────

/// The capability attached to an actor.
///
/// `AllAccess` replaces the super-admin bypass flag of older permission
/// layers: it is a tagged variant checked structurally, not a magic
/// string threaded through every check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grant {
    /// Permissions derived from a marketplace role.
    Role(ParticipantRole),
    /// Unconditional access (operations staff).
    AllAccess,
}

/// An authenticated actor: identity plus capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// The participant identity.
    pub id: ParticipantId,
    /// The capability this actor holds.
    pub grant: Grant,
}

impl Actor {
    /// An actor holding a role-derived grant.
    pub fn with_role(id: ParticipantId, role: ParticipantRole) -> Self {
        Self {
            id,
            grant: Grant::Role(role),
        }
    }

    /// An actor holding the `AllAccess` capability.
    pub fn all_access(id: ParticipantId) -> Self {
        Self {
            id,
            grant: Grant::AllAccess,
        }
    }

    /// The actor's room role, if the grant is role-derived.
    ///
    /// `AllAccess` actors act as mediators inside rooms.
    pub fn role(&self) -> ParticipantRole {
        match self.grant {
            Grant::Role(role) => role,
            Grant::AllAccess => ParticipantRole::Admin,
        }
    }

    /// Whether this actor holds the given permission.
    pub fn permits(&self, permission: Permission) -> bool {
        match self.grant {
            Grant::AllAccess => true,
            Grant::Role(role) => role_permits(role, permission),
        }
    }
}

/// The role → permission table.
fn role_permits(role: ParticipantRole, permission: Permission) -> bool {
    match permission {
        Permission::SendRoomMessage => true,
        Permission::ManageDisputes | Permission::ResolveDisputes | Permission::ModerateRoom => {
            role.is_mediator()
        }
    }
}

// ─── Authorizer ──────────────────────────────────────────────────────

/// External authorization collaborator.
///
/// The default implementation resolves permissions from the actor's own
/// grant; deployments with a central permission service implement this
/// trait over it.
pub trait Authorizer: Send + Sync {
    /// Whether the actor holds the permission.
    fn has_permission(&self, actor: &Actor, permission: Permission) -> bool;
}

/// Grant-backed [`Authorizer`] — the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrantAuthorizer;

impl Authorizer for GrantAuthorizer {
    fn has_permission(&self, actor: &Actor, permission: Permission) -> bool {
        actor.permits(permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> Actor {
        Actor::with_role(ParticipantId::new(), ParticipantRole::Client)
    }

    fn admin() -> Actor {
        Actor::with_role(ParticipantId::new(), ParticipantRole::Admin)
    }

    #[test]
    fn test_all_roles_may_send() {
        for role in [
            ParticipantRole::Client,
            ParticipantRole::Provider,
            ParticipantRole::Admin,
        ] {
            let actor = Actor::with_role(ParticipantId::new(), role);
            assert!(actor.permits(Permission::SendRoomMessage));
        }
    }

    #[test]
    fn test_only_admin_manages_and_resolves() {
        assert!(!client().permits(Permission::ManageDisputes));
        assert!(!client().permits(Permission::ResolveDisputes));
        assert!(!client().permits(Permission::ModerateRoom));
        assert!(admin().permits(Permission::ManageDisputes));
        assert!(admin().permits(Permission::ResolveDisputes));
        assert!(admin().permits(Permission::ModerateRoom));
    }

    #[test]
    fn test_all_access_passes_everything() {
        let actor = Actor::all_access(ParticipantId::new());
        for permission in [
            Permission::ManageDisputes,
            Permission::ResolveDisputes,
            Permission::SendRoomMessage,
            Permission::ModerateRoom,
        ] {
            assert!(actor.permits(permission));
        }
        assert_eq!(actor.role(), ParticipantRole::Admin);
    }

    #[test]
    fn test_permission_slugs() {
        assert_eq!(Permission::ManageDisputes.slug(), "disputes.manage");
        assert_eq!(Permission::ResolveDisputes.slug(), "disputes.resolve");
        assert_eq!(Permission::SendRoomMessage.slug(), "rooms.message");
        assert_eq!(Permission::ModerateRoom.slug(), "rooms.moderate");
    }

    #[test]
    fn test_grant_authorizer_delegates_to_grant() {
        let authz = GrantAuthorizer;
        assert!(!authz.has_permission(&client(), Permission::ResolveDisputes));
        assert!(authz.has_permission(&admin(), Permission::ResolveDisputes));
    }

    #[test]
    fn test_role_serde_wire_format() {
        assert_eq!(
            serde_json::to_string(&ParticipantRole::Provider).unwrap(),
            "\"provider\""
        );
    }
}
