//! HTTP endpoints for the relay.
//!
//! Provides health checks and Prometheus metrics.

pub mod health;
mod metrics;

use crate::server::RelayServer;
use axum::{routing::get, Extension, Router};
use std::sync::Arc;

pub use health::HealthStatus;

/// Build the HTTP router with all endpoints.
pub fn build_router(relay: Arc<RelayServer>) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/metrics", get(metrics::metrics_handler))
        .layer(Extension(relay))
}

/// Serve the HTTP endpoints until the relay shuts down.
pub async fn serve(
    relay: Arc<RelayServer>,
    listener: tokio::net::TcpListener,
) -> std::io::Result<()> {
    tracing::info!("HTTP endpoints listening on {}", listener.local_addr()?);
    let app = build_router(Arc::clone(&relay));
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { relay.stopped().await })
        .await
}
