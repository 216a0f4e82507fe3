//! HTTP API server
//!
//! The OpenAI-compatible chat surface plus gateway management endpoints,
//! sharing the session primitives and settings store with the Wyoming
//! engine.

pub mod chat;
pub mod health;
pub mod logs;
pub mod settings;

use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::SettingsStore;
use crate::logging::LogBuffer;
use crate::metrics::Metrics;
use crate::workers::{ModelContainer, Synthesizer, Transcriber};
use crate::Result;

/// Shared state for API handlers
pub struct ApiState {
    pub settings: SettingsStore,
    pub metrics: Arc<Metrics>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub transcriber: Arc<dyn Transcriber>,
    /// Model container; None when no completion host is configured
    pub models: Option<Arc<ModelContainer>>,
    pub logs: Arc<LogBuffer>,
}

/// Assemble the full API router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .merge(health::router(Arc::clone(&state)))
        .merge(settings::router(Arc::clone(&state)))
        .merge(logs::router(Arc::clone(&state)))
        .merge(chat::router(state))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Serve the API until `shutdown` fires
///
/// # Errors
///
/// Returns an error when binding or serving fails.
pub async fn serve(state: Arc<ApiState>, port: u16, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "http api listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;
    Ok(())
}
