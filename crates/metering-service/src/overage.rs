//! The overage calculator.
//!
//! Converts a period's overage counters into a billable amount. The
//! computation is idempotent (it reads current counters, not a running
//! total), and the `overage_reported` flag keeps an external billing sync
//! from charging the same period twice.

use std::sync::Arc;

use serde::Serialize;

use metering_core::{
    overage_charge_cents, BillingPeriod, MeteringError, OrgId, PlanCatalog,
};
use metering_store::{Store, StoreError};

use crate::ledger::store_err;

/// Outcome of an overage reporting pass.
#[derive(Debug, Clone, Serialize)]
pub struct OverageReport {
    /// The period's computed charge, in cents.
    pub overage_cents: i64,
    /// Whether this pass was the first to report the period.
    pub newly_reported: bool,
}

/// Computes and persists billable overage for the current period.
pub struct OverageCalculator {
    store: Arc<dyn Store>,
    catalog: Arc<PlanCatalog>,
}

impl OverageCalculator {
    /// Build a calculator over the given store and catalog.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, catalog: Arc<PlanCatalog>) -> Self {
        Self { store, catalog }
    }

    /// Recompute and persist the current period's overage charge.
    ///
    /// Safe to call any number of times; a period with no usage row (or a
    /// plan without overage rates) computes to zero.
    ///
    /// # Errors
    ///
    /// Returns `NoSubscription` when the organization has none, or an error
    /// if the store fails.
    pub async fn calculate_overage_charges(&self, org_id: OrgId) -> Result<i64, MeteringError> {
        let subscription = self
            .store
            .current_subscription(org_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| MeteringError::NoSubscription {
                org_id: org_id.to_string(),
            })?;

        let period = BillingPeriod::current();
        let Some(record) = self
            .store
            .usage_for_period(org_id, &period)
            .await
            .map_err(store_err)?
        else {
            return Ok(0);
        };

        let rates = self
            .catalog
            .resolve(&subscription.plan_id)
            .overage_rates()
            .copied()
            .unwrap_or_default();
        let cents = overage_charge_cents(&record, &rates);

        self.store
            .record_overage_charge(org_id, &period, cents)
            .await
            .map_err(store_err)?;

        tracing::debug!(org_id = %org_id, overage_cents = cents, "Overage recomputed");
        Ok(cents)
    }

    /// Recompute the charge and flag the period as reported, unless an
    /// earlier pass already did.
    ///
    /// # Errors
    ///
    /// As [`Self::calculate_overage_charges`].
    pub async fn report_overage(&self, org_id: OrgId) -> Result<OverageReport, MeteringError> {
        let overage_cents = self.calculate_overage_charges(org_id).await?;
        let period = BillingPeriod::current();

        let already_reported = self
            .store
            .usage_for_period(org_id, &period)
            .await
            .map_err(store_err)?
            .is_some_and(|record| record.overage_reported);

        if already_reported || overage_cents == 0 {
            return Ok(OverageReport {
                overage_cents,
                newly_reported: false,
            });
        }

        match self.store.mark_overage_reported(org_id, &period).await {
            Ok(()) => Ok(OverageReport {
                overage_cents,
                newly_reported: true,
            }),
            // A period without a usage row has nothing to report.
            Err(StoreError::NotFound { .. }) => Ok(OverageReport {
                overage_cents,
                newly_reported: false,
            }),
            Err(err) => Err(store_err(err)),
        }
    }
}
