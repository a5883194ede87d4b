//! Subscription, trial provisioning, and overage handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use metering_core::{AccessDecision, Invoice, MeteringError, OrgId, Plan, SubscriptionRecord};
use metering_store::Store;

use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::ledger::store_err;
use crate::overage::OverageReport;
use crate::state::AppState;

/// A subscription row together with its access classification.
#[derive(Debug, serde::Serialize)]
pub struct SubscriptionView {
    /// The subscription row.
    pub subscription: SubscriptionRecord,
    /// What access it currently grants.
    pub access: AccessDecision,
}

/// The organization's current subscription and its access level.
///
/// Fails with `no_subscription` when no row qualifies or access is fully
/// denied (expired trial, canceled).
pub async fn current(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(org_id): Path<OrgId>,
) -> Result<Json<SubscriptionView>, ApiError> {
    let (subscription, access) = state.gate().require_active_subscription(org_id).await?;
    Ok(Json(SubscriptionView {
        subscription,
        access,
    }))
}

/// The plans currently offered to new subscribers.
pub async fn list_plans(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
) -> Json<Vec<Plan>> {
    Json(state.catalog.list_active().into_iter().cloned().collect())
}

/// Trial provisioning request, sent by the organization directory when an
/// organization is created.
#[derive(Debug, Deserialize)]
pub struct TrialRequest {
    /// The new organization.
    pub org_id: OrgId,
    /// Plan to trial; defaults to the configured trial plan.
    #[serde(default)]
    pub plan_id: Option<String>,
    /// Trial length in days; defaults to the configured length.
    #[serde(default)]
    pub trial_days: Option<i64>,
}

/// Provision a trial subscription at organization creation.
///
/// The record carries no external ids; the `subscription created` webhook
/// upserts over it once checkout completes.
pub async fn provision_trial(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Json(body): Json<TrialRequest>,
) -> Result<Json<SubscriptionRecord>, ApiError> {
    let plan_id = body
        .plan_id
        .unwrap_or_else(|| state.config.trial_plan_id.clone());
    if state.catalog.get(&plan_id).is_none() {
        return Err(MeteringError::PlanNotFound { plan_id }.into());
    }

    let trial_days = body.trial_days.unwrap_or(state.config.trial_days);
    if !(1..=90).contains(&trial_days) {
        return Err(ApiError::BadRequest(
            "trial_days must be between 1 and 90".into(),
        ));
    }

    if state
        .store
        .current_subscription(body.org_id)
        .await
        .map_err(store_err)?
        .is_some()
    {
        return Err(ApiError::Conflict(format!(
            "organization {} already has a subscription",
            body.org_id
        )));
    }

    let record = SubscriptionRecord::trial(body.org_id, &plan_id, trial_days);
    state
        .store
        .insert_subscription(&record)
        .await
        .map_err(store_err)?;

    // Seed the period's usage row so the dashboard has something to show
    // from minute one.
    state
        .ledger()
        .get_or_create_current_usage(body.org_id)
        .await?;

    tracing::info!(
        org_id = %body.org_id,
        plan_id = %plan_id,
        trial_days,
        "Trial subscription provisioned"
    );
    Ok(Json(record))
}

/// Overage calculation response.
#[derive(Debug, serde::Serialize)]
pub struct OverageResponse {
    /// The period's computed charge, in cents.
    pub overage_cents: i64,
}

/// Recompute the current period's overage charge. Idempotent.
pub async fn calculate_overage(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(org_id): Path<OrgId>,
) -> Result<Json<OverageResponse>, ApiError> {
    let overage_cents = state.overage().calculate_overage_charges(org_id).await?;
    Ok(Json(OverageResponse { overage_cents }))
}

/// Recompute and flag the current period's overage as reported.
pub async fn report_overage(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(org_id): Path<OrgId>,
) -> Result<Json<OverageReport>, ApiError> {
    Ok(Json(state.overage().report_overage(org_id).await?))
}

/// Invoice listing parameters.
#[derive(Debug, Deserialize)]
pub struct InvoiceParams {
    /// Maximum invoices to return (default 12).
    #[serde(default = "default_invoice_limit")]
    pub limit: usize,
}

const fn default_invoice_limit() -> usize {
    12
}

/// Mirrored invoices for the organization, newest first.
pub async fn invoices(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(org_id): Path<OrgId>,
    Query(params): Query<InvoiceParams>,
) -> Result<Json<Vec<Invoice>>, ApiError> {
    let invoices = state
        .store
        .invoices_for_org(org_id, params.limit.min(100))
        .await
        .map_err(store_err)?;
    Ok(Json(invoices))
}
