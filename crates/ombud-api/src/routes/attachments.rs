//! # Attachment Routes
//!
//! Attachment compression endpoints. Files are submitted as raw request
//! bodies (no multipart layer); metadata rides in headers:
//!
//! - `Content-Type`: the file's mime type (drives strategy selection).
//! - `X-Attachment-Name`: original file name.
//! - `X-Attachment-Id`: optional client-generated UUID, stable across
//!   retries.
//! - `X-Attachment-Duration-Secs`: optional probed duration for
//!   video/audio cap checks.
//!
//! Progress polling never blocks: the snapshot endpoint reads the
//! latest watch-channel value. Once an attachment has been delivered on
//! a message, its compressed bytes are served from the blob store via
//! the download endpoint.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use uuid::Uuid;

use ombud_core::AttachmentId;
use ombud_media::{AttachmentSnapshot, SourceFile};
use ombud_room::AttachmentStore;

use crate::auth::AuthActor;
use crate::error::AppError;
use crate::state::AppState;

/// The attachments router, nested under `/v1/attachments`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(submit))
        .route("/{id}/cancel", post(cancel))
        .route("/{id}/progress", get(progress))
        .route("/{id}/download", get(download))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

async fn submit(
    State(state): State<AppState>,
    AuthActor(_actor): AuthActor,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<AttachmentSnapshot>, AppError> {
    let id = match header_str(&headers, "x-attachment-id") {
        Some(raw) => AttachmentId::from_uuid(raw.parse::<Uuid>().map_err(|_| {
            ombud_core::MediationError::Validation("malformed x-attachment-id header".into())
        })?),
        None => AttachmentId::new(),
    };
    let mime_type = header_str(&headers, "content-type")
        .unwrap_or("application/octet-stream")
        .to_string();
    let name = header_str(&headers, "x-attachment-name")
        .unwrap_or("attachment")
        .to_string();
    let duration_secs =
        header_str(&headers, "x-attachment-duration-secs").and_then(|v| v.parse::<f64>().ok());

    let handle = state.processor.submit(SourceFile {
        id,
        name,
        mime_type,
        bytes: body.to_vec(),
        duration_secs,
    })?;
    Ok(Json(handle.snapshot()))
}

async fn cancel(
    State(state): State<AppState>,
    AuthActor(_actor): AuthActor,
    Path(id): Path<Uuid>,
) -> Result<Json<AttachmentSnapshot>, AppError> {
    let id = AttachmentId::from_uuid(id);
    state.processor.cancel(id)?;
    Ok(Json(state.processor.snapshot(id)?))
}

async fn progress(
    State(state): State<AppState>,
    AuthActor(_actor): AuthActor,
    Path(id): Path<Uuid>,
) -> Result<Json<AttachmentSnapshot>, AppError> {
    Ok(Json(state.processor.snapshot(AttachmentId::from_uuid(id))?))
}

async fn download(
    State(state): State<AppState>,
    AuthActor(_actor): AuthActor,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let bytes = state.attachments.fetch(AttachmentId::from_uuid(id))?;
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        bytes,
    ))
}
