//! Usage tracking handlers.
//!
//! Called by trusted backend services *after* a metered operation succeeds
//! (or, for storage and videos, as the commit half of a check-then-commit
//! pair). The pre-flight half lives in the limits handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use metering_core::{OrgId, UsageRecord};

use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Cap on the history window, in months.
const MAX_HISTORY_MONTHS: u32 = 24;

/// A byte-denominated tracking request.
#[derive(Debug, Deserialize)]
pub struct TrackBytesRequest {
    /// How many bytes were consumed or released.
    pub bytes: i64,
}

/// A unit-denominated tracking request.
#[derive(Debug, Deserialize)]
pub struct TrackCountRequest {
    /// How many units were consumed or released.
    #[serde(default = "default_count")]
    pub count: i64,
}

const fn default_count() -> i64 {
    1
}

fn positive(amount: i64, what: &str) -> Result<i64, ApiError> {
    if amount > 0 {
        Ok(amount)
    } else {
        Err(ApiError::BadRequest(format!("{what} must be positive")))
    }
}

/// Current-period usage. Never creates a row.
pub async fn current_usage(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(org_id): Path<OrgId>,
) -> Result<Json<UsageRecord>, ApiError> {
    Ok(Json(state.ledger().current_usage(org_id).await?))
}

/// History query parameters.
#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    /// How many months back to return (default 6, capped).
    #[serde(default = "default_months")]
    pub months: u32,
}

const fn default_months() -> u32 {
    6
}

/// Usage rows for recent periods, most recent first.
pub async fn usage_history(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(org_id): Path<OrgId>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<UsageRecord>>, ApiError> {
    let months = params.months.min(MAX_HISTORY_MONTHS);
    Ok(Json(state.ledger().usage_history(org_id, months).await?))
}

/// Record stored bytes after an upload lands.
pub async fn track_storage(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(org_id): Path<OrgId>,
    Json(body): Json<TrackBytesRequest>,
) -> Result<Json<UsageRecord>, ApiError> {
    let bytes = positive(body.bytes, "bytes")?;
    Ok(Json(state.ledger().track_storage(org_id, bytes).await?))
}

/// Release stored bytes after a deletion.
pub async fn release_storage(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(org_id): Path<OrgId>,
    Json(body): Json<TrackBytesRequest>,
) -> Result<Json<UsageRecord>, ApiError> {
    let bytes = positive(body.bytes, "bytes")?;
    Ok(Json(state.ledger().release_storage(org_id, bytes).await?))
}

/// Record uploaded videos.
pub async fn track_videos(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(org_id): Path<OrgId>,
    Json(body): Json<TrackCountRequest>,
) -> Result<Json<UsageRecord>, ApiError> {
    let count = positive(body.count, "count")?;
    Ok(Json(state.ledger().track_video_upload(org_id, count).await?))
}

/// Back out uploaded videos after a deletion.
pub async fn release_videos(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(org_id): Path<OrgId>,
    Json(body): Json<TrackCountRequest>,
) -> Result<Json<UsageRecord>, ApiError> {
    let count = positive(body.count, "count")?;
    Ok(Json(state.ledger().track_video_delete(org_id, count).await?))
}

/// Record served bytes under the three-tier bandwidth policy. Rejects with
/// `limit_exceeded` at twice the allocation.
pub async fn track_bandwidth(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(org_id): Path<OrgId>,
    Json(body): Json<TrackBytesRequest>,
) -> Result<Json<UsageRecord>, ApiError> {
    let bytes = positive(body.bytes, "bytes")?;
    Ok(Json(state.ledger().track_bandwidth(org_id, bytes).await?))
}

/// Record AI requests.
pub async fn track_ai(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(org_id): Path<OrgId>,
    Json(body): Json<TrackCountRequest>,
) -> Result<Json<UsageRecord>, ApiError> {
    let count = positive(body.count, "count")?;
    Ok(Json(state.ledger().track_ai_request(org_id, count).await?))
}
