//! # ombud-core — Foundational Types for the Mediation Service
//!
//! This crate is the bedrock of the Ombud dispute mediation service. It
//! defines the primitives every other crate in the workspace builds on;
//! it depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for domain identifiers.** `DisputeId`, `OrderId`,
//!    `RoomId`, `MessageId`, `AttachmentId`, `ParticipantId` — all newtypes
//!    over `Uuid`. No bare strings or raw uuids cross a crate boundary.
//!
//! 2. **UTC-only timestamps.** The `Timestamp` type enforces UTC with
//!    seconds precision so the audit trail of a dispute reads identically
//!    everywhere it is rendered.
//!
//! 3. **One error taxonomy.** `MediationError` is the single vocabulary of
//!    refusals for the whole subsystem. Every variant carries enough
//!    structure for a caller to explain the refusal without string parsing.
//!
//! 4. **Capability-checked actors.** Authorization is a tagged capability
//!    (`Grant::Role` / `Grant::AllAccess`) resolved once at the boundary.
//!    There is no magic bypass string threaded through call sites.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `ombud-*` crates (this is the leaf of the DAG).
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.
//! - All public types derive `Debug`, `Clone`, and implement
//!   `Serialize`/`Deserialize` where they cross the wire.

pub mod actor;
pub mod error;
pub mod identity;
pub mod temporal;

// Re-export primary types for ergonomic imports.
pub use actor::{Actor, Authorizer, Grant, GrantAuthorizer, ParticipantRole, Permission};
pub use error::MediationError;
pub use identity::{AttachmentId, DisputeId, MessageId, OrderId, ParticipantId, RoomId};
pub use temporal::Timestamp;
