//! # Application Error
//!
//! Maps the mediation error taxonomy to structured HTTP responses with
//! proper status codes and error bodies.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use ombud_core::MediationError;

/// Application-level error type that maps to HTTP responses.
#[derive(Error, Debug)]
pub enum AppError {
    /// A domain refusal from the mediation subsystem.
    #[error(transparent)]
    Domain(#[from] MediationError),

    /// Missing or malformed actor credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Domain(err) => match err {
                MediationError::Validation(_) => StatusCode::BAD_REQUEST,
                MediationError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
                MediationError::NotFound(_) => StatusCode::NOT_FOUND,
                // Conflicts with the current state of the resource: retry
                // with a fresh read, or reopen.
                MediationError::InvalidState { .. }
                | MediationError::StaleState { .. }
                | MediationError::Cancelled { .. } => StatusCode::CONFLICT,
                MediationError::CompressionFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                MediationError::RoomPaused { .. } => StatusCode::LOCKED,
                MediationError::Collaborator(_) => StatusCode::BAD_GATEWAY,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::json!({
            "error": {
                "code": status.as_u16(),
                "message": self.to_string(),
            }
        });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: MediationError) -> StatusCode {
        AppError::Domain(err).status()
    }

    #[test]
    fn test_taxonomy_to_status_mapping() {
        assert_eq!(
            status_of(MediationError::Validation("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(MediationError::PermissionDenied {
                actor: "participant:x".into(),
                permission: "disputes.resolve".into(),
            }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(MediationError::NotFound("dispute x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(MediationError::StaleState {
                entity: "dispute:x".into(),
                expected: 1,
                actual: 2,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(MediationError::InvalidState {
                entity: "dispute:x".into(),
                current: "RESOLVED".into(),
                operation: "resolve".into(),
                terminal: true,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(MediationError::RoomPaused {
                room: "room:x".into()
            }),
            StatusCode::LOCKED
        );
        assert_eq!(
            status_of(MediationError::CompressionFailed {
                attachment: "attachment:x".into(),
                reason: "codec".into(),
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(MediationError::Collaborator("orders down".into())),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_terminal_refusal_keeps_reopen_hint_in_message() {
        let err = AppError::Domain(MediationError::InvalidState {
            entity: "dispute:x".into(),
            current: "RESOLVED".into(),
            operation: "resolve".into(),
            terminal: true,
        });
        assert!(err.to_string().contains("already closed, use reopen"));
    }
}
