//! HTTP server module.

mod alerts;
mod error;
mod history;
mod monitors;
mod scan;

use std::{net::SocketAddr, sync::Arc};

use alerts::{acknowledge_alert, get_alerts};
use axum::{
    response::{IntoResponse, Json},
    routing::{delete, get, post},
    Router,
};
pub use error::ApiError;
use history::{get_history, get_history_entry};
use monitors::{
    create_monitor, delete_all_monitors, delete_monitor, get_monitor_details, get_monitors,
    pause_monitor, resume_monitor,
};
use scan::{compare_scans, scan_url};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::{config::AppConfig, persistence::traits::Store, scanner::ScanPipeline};

/// Shared application state for the HTTP server.
#[derive(Clone)]
pub struct ApiState {
    /// The scan store.
    store: Arc<dyn Store>,
    /// The scan pipeline driven by `POST /scan`.
    pipeline: Arc<ScanPipeline>,
    /// The application configuration.
    config: Arc<AppConfig>,
}

impl ApiState {
    /// Creates the server state.
    pub fn new(store: Arc<dyn Store>, pipeline: Arc<ScanPipeline>, config: Arc<AppConfig>) -> Self {
        Self { store, pipeline, config }
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Builds the API router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        // Scan routes
        .route("/scan", post(scan_url))
        .route("/compare/{url_fingerprint}", get(compare_scans))
        // History routes
        .route("/history", get(get_history))
        .route("/history/{id}", get(get_history_entry))
        // Monitor routes
        .route("/monitors", get(get_monitors))
        .route("/monitors", post(create_monitor))
        .route("/monitors/{id}", get(get_monitor_details))
        .route("/monitors/all", delete(delete_all_monitors))
        .route("/monitors/{id}", delete(delete_monitor))
        .route("/monitors/{id}/pause", post(pause_monitor))
        .route("/monitors/{id}/resume", post(resume_monitor))
        // Alert routes
        .route("/alerts", get(get_alerts))
        .route("/alerts/{id}/acknowledge", post(acknowledge_alert))
        .with_state(state)
}

/// Runs the HTTP server until the cancellation token fires.
pub async fn run_server(
    listen_address: &str,
    state: ApiState,
    shutdown: CancellationToken,
) -> Result<(), std::io::Error> {
    let addr: SocketAddr = listen_address
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("{e}")))?;

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HTTP server listening on {}", addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
