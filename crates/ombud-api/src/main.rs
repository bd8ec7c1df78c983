//! # ombud-server
//!
//! Binary entry point: tracing and metrics initialization, in-process
//! service wiring, and the Axum serve loop.

use ombud_api::{routes, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Prometheus exporter on its default scrape endpoint
    metrics_exporter_prometheus::PrometheusBuilder::new().install()?;

    let state = AppState::in_memory();
    let app = routes::router(state);

    let addr = std::env::var("OMBUD_LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "ombud server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
