//! Handlers for monitor CRUD and pause/resume.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use serde_json::json;

use super::{ApiError, ApiState};
use crate::models::{monitor, target::Target};

/// Request body for `POST /monitors`.
#[derive(Debug, Deserialize)]
pub struct CreateMonitorRequest {
    /// URL to monitor.
    pub url: String,
    /// Rescan interval in minutes, 1..=1440.
    pub interval: u32,
}

/// Registers a new monitor.
pub async fn create_monitor(
    State(state): State<ApiState>,
    Json(request): Json<CreateMonitorRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let target = Target::parse(&request.url).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    if !monitor::interval_in_range(request.interval) {
        return Err(ApiError::BadRequest(format!(
            "Interval must be between {} and {} minutes",
            monitor::MIN_INTERVAL_MINUTES,
            monitor::MAX_INTERVAL_MINUTES
        )));
    }

    let created = state
        .store
        .create_monitor(
            target.as_str(),
            &target.fingerprint(),
            request.interval,
            state.config.monitor_cap_per_owner,
        )
        .await?;
    tracing::info!(monitor_id = created.id, target = %created.target, "Monitor created");
    Ok((StatusCode::CREATED, Json(created)))
}

/// Returns all registered monitors.
pub async fn get_monitors(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let monitors = state.store.list_monitors().await?;
    Ok((StatusCode::OK, Json(json!({ "monitors": monitors }))))
}

/// Returns one monitor by id.
pub async fn get_monitor_details(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let monitor = state
        .store
        .get_monitor(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Monitor not found".to_string()))?;
    Ok((StatusCode::OK, Json(monitor)))
}

/// Deletes one monitor.
pub async fn delete_monitor(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.store.delete_monitor(id).await? {
        return Err(ApiError::NotFound("Monitor not found".to_string()));
    }
    tracing::info!(monitor_id = id, "Monitor deleted");
    Ok((StatusCode::OK, Json(json!({ "deleted": true }))))
}

/// Deletes every monitor.
pub async fn delete_all_monitors(
    State(state): State<ApiState>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.store.delete_all_monitors().await?;
    tracing::info!(deleted, "All monitors deleted");
    Ok((StatusCode::OK, Json(json!({ "deleted": deleted }))))
}

/// Pauses a monitor. Pause is sticky; an in-flight scan still completes.
pub async fn pause_monitor(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let monitor = state
        .store
        .set_monitor_paused(id, true)
        .await?
        .ok_or_else(|| ApiError::NotFound("Monitor not found".to_string()))?;
    Ok((StatusCode::OK, Json(monitor)))
}

/// Resumes a paused monitor.
pub async fn resume_monitor(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let monitor = state
        .store
        .set_monitor_paused(id, false)
        .await?
        .ok_or_else(|| ApiError::NotFound("Monitor not found".to_string()))?;
    Ok((StatusCode::OK, Json(monitor)))
}
