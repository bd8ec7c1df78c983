//! # Actor Extraction
//!
//! Resolves the authenticated [`Actor`] from request headers. Token
//! verification itself lives at the gateway; this layer trusts the
//! forwarded identity headers and turns them into a structured actor
//! whose capability is checked once, at the handler boundary.
//!
//! Headers:
//!
//! - `X-Ombud-Actor`: participant UUID (required).
//! - `X-Ombud-Grant`: `client`, `provider`, `admin`, or `all_access`
//!   (required).

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use ombud_core::{Actor, Grant, ParticipantId, ParticipantRole};

use crate::error::AppError;

/// Header carrying the participant id.
pub const ACTOR_HEADER: &str = "x-ombud-actor";
/// Header carrying the capability grant.
pub const GRANT_HEADER: &str = "x-ombud-grant";

/// Extractor wrapping the authenticated actor.
pub struct AuthActor(pub Actor);

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, AppError> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized(format!("missing {name} header")))
}

fn parse_grant(value: &str) -> Result<Grant, AppError> {
    match value {
        "client" => Ok(Grant::Role(ParticipantRole::Client)),
        "provider" => Ok(Grant::Role(ParticipantRole::Provider)),
        "admin" => Ok(Grant::Role(ParticipantRole::Admin)),
        "all_access" => Ok(Grant::AllAccess),
        other => Err(AppError::Unauthorized(format!("unknown grant {other:?}"))),
    }
}

impl<S> FromRequestParts<S> for AuthActor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = header(parts, ACTOR_HEADER)?
            .parse::<Uuid>()
            .map_err(|_| AppError::Unauthorized("malformed actor id".into()))?;
        let grant = parse_grant(header(parts, GRANT_HEADER)?)?;
        Ok(AuthActor(Actor {
            id: ParticipantId::from_uuid(id),
            grant,
        }))
    }
}
