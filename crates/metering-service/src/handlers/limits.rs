//! Limit check and access classification handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use metering_core::{classify, AccessDecision, AccessLevel, GatedResource, OrgId};
use metering_store::Store;

use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::gate::LimitCheck;
use crate::ledger::store_err;
use crate::state::AppState;

/// A limit check request.
#[derive(Debug, Deserialize)]
pub struct LimitRequest {
    /// Which resource to check.
    pub resource: GatedResource,
    /// The increment the caller intends to consume (default 1).
    #[serde(default = "default_amount")]
    pub amount: i64,
}

const fn default_amount() -> i64 {
    1
}

/// Would the increment fit? Never blocks the caller; pure read.
pub async fn check(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(org_id): Path<OrgId>,
    Json(body): Json<LimitRequest>,
) -> Result<Json<LimitCheck>, ApiError> {
    let check = state
        .gate()
        .check_resource_limit(org_id, body.resource, body.amount)
        .await?;
    Ok(Json(check))
}

/// Fail with `limit_exceeded` unless the increment fits. Callers abort the
/// metered operation on failure (check-then-act).
pub async fn enforce(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(org_id): Path<OrgId>,
    Json(body): Json<LimitRequest>,
) -> Result<Json<LimitCheck>, ApiError> {
    let check = state
        .gate()
        .enforce_resource_limit(org_id, body.resource, body.amount)
        .await?;
    Ok(Json(check))
}

/// The access classifier's verdict for the organization.
///
/// Recomputed from the subscription row on every call; an organization
/// without a qualifying row classifies as no access.
pub async fn access(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(org_id): Path<OrgId>,
) -> Result<Json<AccessDecision>, ApiError> {
    let decision = match state
        .store
        .current_subscription(org_id)
        .await
        .map_err(store_err)?
    {
        Some(record) => classify(&record, chrono::Utc::now()),
        None => AccessDecision {
            level: AccessLevel::None,
            read_only: true,
            grace_period: false,
            days_remaining: None,
            reason: Some("no subscription".to_owned()),
        },
    };
    Ok(Json(decision))
}

/// Fail unless the organization's access level permits writes.
pub async fn require_write(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(org_id): Path<OrgId>,
) -> Result<Json<AccessDecision>, ApiError> {
    let decision = state.gate().require_write_access(org_id).await?;
    Ok(Json(decision))
}
