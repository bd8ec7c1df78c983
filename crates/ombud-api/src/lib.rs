//! # ombud-api — Axum HTTP Surface
//!
//! The transport layer of the Ombud mediation service, built on
//! Axum/Tower/Tokio. Assembles the dispute, room, and attachment routers
//! into a single application with shared tracing and CORS middleware.
//!
//! ## Routes
//!
//! - `/v1/disputes/*` — open, inspect, start mediation, resolve, reopen
//! - `/v1/rooms/*` — open, SSE subscribe, send, moderate, decide, leave
//! - `/v1/attachments/*` — submit, cancel, progress, download
//! - `/health` — liveness probe (unauthenticated)
//!
//! ## Architecture
//!
//! Request/response types are compile-time contracts via serde derive.
//! No business logic lives in handlers — they translate between the wire
//! and the domain crates, and every domain refusal maps to a structured
//! HTTP response via [`AppError`].

pub mod auth;
pub mod error;
pub mod routes;
pub mod state;

pub use error::AppError;
pub use state::AppState;
