//! # Route Modules
//!
//! Each module defines an Axum Router for one API surface area; they are
//! assembled here into the application router with the shared middleware
//! stack (TraceLayer → CORS).

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod attachments;
pub mod disputes;
pub mod rooms;

/// Assemble the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/v1/disputes", disputes::router())
        .nest("/v1/rooms", rooms::router())
        .nest("/v1/attachments", attachments::router())
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Liveness probe; unauthenticated.
async fn health() -> &'static str {
    "ok"
}
