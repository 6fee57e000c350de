//! Handlers for alert listing and acknowledgement.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use serde_json::json;

use super::{ApiError, ApiState};
use crate::models::alert::AlertStatus;

/// Alerts returned per request.
const ALERT_PAGE_SIZE: u32 = 100;

/// Query parameters for `GET /alerts`.
#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    /// Optional status filter: `new` or `acknowledged`.
    pub status: Option<String>,
}

/// Returns recent alerts, newest first.
pub async fn get_alerts(
    State(state): State<ApiState>,
    Query(query): Query<AlertsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(|raw| raw.parse::<AlertStatus>().map_err(ApiError::BadRequest))
        .transpose()?;

    let alerts = state.store.list_alerts(status, ALERT_PAGE_SIZE).await?;
    Ok((StatusCode::OK, Json(json!({ "alerts": alerts }))))
}

/// Marks an alert acknowledged. Idempotent.
pub async fn acknowledge_alert(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let alert = state
        .store
        .acknowledge_alert(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Alert not found".to_string()))?;
    Ok((StatusCode::OK, Json(alert)))
}
