//! Handlers for scan history.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use serde_json::json;

use super::{ApiError, ApiState};
use crate::models::scan::ScanSummary;

/// Default history page size.
const DEFAULT_PAGE_SIZE: u32 = 100;

/// Query parameters for `GET /history`.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Page size, default 100.
    pub limit: Option<u32>,
    /// Offset into the global reverse-chronological sequence.
    pub offset: Option<u32>,
}

/// Returns the global scan history, newest first.
pub async fn get_history(
    State(state): State<ApiState>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0);
    let records = state.store.history(limit, offset).await?;
    let summaries: Vec<ScanSummary> = records.iter().map(ScanSummary::from).collect();
    Ok((StatusCode::OK, Json(json!({ "history": summaries }))))
}

/// Returns one full scan record by id.
pub async fn get_history_entry(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .store
        .get_scan(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Scan record not found".to_string()))?;
    Ok((StatusCode::OK, Json(record)))
}
