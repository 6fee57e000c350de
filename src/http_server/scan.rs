//! Handlers for on-demand scans and scan comparison.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;

use super::{ApiError, ApiState};
use crate::models::{compare::Comparison, target::Target};

/// Request body for `POST /scan`.
#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    /// URL to scan.
    pub url: String,
}

/// Query parameters for `GET /compare/{url_fingerprint}`.
#[derive(Debug, Deserialize)]
pub struct CompareQuery {
    /// How many recent ONLINE scans to fetch; the newest two are compared.
    pub limit: Option<u32>,
}

/// Runs a scan for the requested URL and returns the persisted record.
pub async fn scan_url(
    State(state): State<ApiState>,
    Json(request): Json<ScanRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state.pipeline.scan(&request.url).await?;
    Ok((StatusCode::OK, Json(record)))
}

/// Compares the two most recent ONLINE scans of a target.
pub async fn compare_scans(
    State(state): State<ApiState>,
    Path(url_fingerprint): Path<String>,
    Query(query): Query<CompareQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let target =
        Target::parse(&url_fingerprint).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let limit = query.limit.unwrap_or(2).max(2);
    let mut scans = state.store.recent_online_scans(&target.fingerprint(), limit).await?;

    if scans.len() < 2 {
        return Err(ApiError::NotFound(format!(
            "Not enough scan data to compare. The target has {} ONLINE scan(s); at least 2 are \
             required.",
            scans.len()
        )));
    }

    let previous = scans.remove(1);
    let current = scans.remove(0);
    Ok((StatusCode::OK, Json(Comparison::between(current, previous))))
}
