//! The usage ledger: per-organization, per-period consumption tracking.
//!
//! Read paths never write (a never-touched period reads as zeros without
//! persisting a row); write paths go through the store's atomic increment
//! and decrement operations. Alongside each increment the ledger books the
//! portion that landed beyond the plan limit into the matching overage
//! counter, so billing sees the true excess even where the UI clamps.

use std::sync::Arc;

use metering_core::{
    BillingPeriod, GatedResource, MeteringError, OrgId, PlanCatalog, PlanLimits, UsageCounter,
    UsageRecord, UNLIMITED,
};
use metering_store::{Store, StoreError};

use crate::external::NotificationSink;

/// Bandwidth beyond this multiple of the allocation is refused outright.
const BANDWIDTH_HARD_STOP_MULTIPLIER: i64 = 2;

pub(crate) fn store_err(err: StoreError) -> MeteringError {
    MeteringError::Storage(err.to_string())
}

/// The portion of an increment that landed beyond the limit.
///
/// `new_total` is the counter after the increment of `amount`; the result
/// is how much of *this* increment exceeded `limit` (so repeated calls
/// never double-book earlier excess).
fn excess_delta(new_total: i64, amount: i64, limit: i64) -> i64 {
    (new_total - limit).min(amount).max(0)
}

/// Per-organization usage tracking over the current billing period.
pub struct UsageLedger {
    store: Arc<dyn Store>,
    catalog: Arc<PlanCatalog>,
    notifier: Arc<dyn NotificationSink>,
}

impl UsageLedger {
    /// Build a ledger over the given store and catalog.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        catalog: Arc<PlanCatalog>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            catalog,
            notifier,
        }
    }

    /// The current period's usage. Returns a zero-valued record when no row
    /// exists; never persists one, so read-only callers never write.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn current_usage(&self, org_id: OrgId) -> Result<UsageRecord, MeteringError> {
        let period = BillingPeriod::current();
        Ok(self
            .store
            .usage_for_period(org_id, &period)
            .await
            .map_err(store_err)?
            .unwrap_or_else(|| UsageRecord::zeroed(org_id, &period)))
    }

    /// The current period's usage, persisting a zero row if absent. Only
    /// mutating callers use this.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn get_or_create_current_usage(
        &self,
        org_id: OrgId,
    ) -> Result<UsageRecord, MeteringError> {
        self.store
            .create_usage_if_absent(org_id, &BillingPeriod::current())
            .await
            .map_err(store_err)
    }

    /// Usage rows for the last `months` periods, most recent first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn usage_history(
        &self,
        org_id: OrgId,
        months: u32,
    ) -> Result<Vec<UsageRecord>, MeteringError> {
        self.store
            .usage_history(org_id, months)
            .await
            .map_err(store_err)
    }

    /// Record stored bytes after an upload lands.
    ///
    /// # Errors
    ///
    /// Returns an error if the organization has no subscription or the
    /// store fails.
    pub async fn track_storage(
        &self,
        org_id: OrgId,
        bytes: i64,
    ) -> Result<UsageRecord, MeteringError> {
        self.track(org_id, UsageCounter::Storage, GatedResource::Storage, bytes)
            .await
    }

    /// Release stored bytes after a deletion.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn release_storage(
        &self,
        org_id: OrgId,
        bytes: i64,
    ) -> Result<UsageRecord, MeteringError> {
        self.store
            .decrement_usage(org_id, &BillingPeriod::current(), UsageCounter::Storage, bytes)
            .await
            .map_err(store_err)
    }

    /// Record uploaded videos.
    ///
    /// # Errors
    ///
    /// Returns an error if the organization has no subscription or the
    /// store fails.
    pub async fn track_video_upload(
        &self,
        org_id: OrgId,
        count: i64,
    ) -> Result<UsageRecord, MeteringError> {
        self.track(org_id, UsageCounter::Videos, GatedResource::Videos, count)
            .await
    }

    /// Back out uploaded videos after a deletion.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn track_video_delete(
        &self,
        org_id: OrgId,
        count: i64,
    ) -> Result<UsageRecord, MeteringError> {
        self.store
            .decrement_usage(org_id, &BillingPeriod::current(), UsageCounter::Videos, count)
            .await
            .map_err(store_err)
    }

    /// Record AI requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the organization has no subscription or the
    /// store fails.
    pub async fn track_ai_request(
        &self,
        org_id: OrgId,
        count: i64,
    ) -> Result<UsageRecord, MeteringError> {
        self.track(
            org_id,
            UsageCounter::AiRequests,
            GatedResource::AiRequests,
            count,
        )
        .await
    }

    /// Record served bytes under the three-tier bandwidth policy.
    ///
    /// Bandwidth is not gated at the point of use the way storage is,
    /// because failing an in-progress stream is worse than a delayed limit:
    ///
    /// - below 100% of the allocation the increment is silent;
    /// - from 100% up to (but excluding) 200% the increment succeeds, the
    ///   excess is booked as overage, and a warning is emitted;
    /// - an increment that would land at or beyond 200% is refused.
    ///
    /// # Errors
    ///
    /// Returns [`MeteringError::LimitExceeded`] at the hard stop, or an
    /// error if the organization has no subscription or the store fails.
    pub async fn track_bandwidth(
        &self,
        org_id: OrgId,
        bytes: i64,
    ) -> Result<UsageRecord, MeteringError> {
        let limits = self.plan_limits(org_id).await?;
        let allocation = limits.limit_for(GatedResource::Bandwidth);
        let period = BillingPeriod::current();

        if allocation == UNLIMITED {
            return self
                .store
                .increment_usage(org_id, &period, UsageCounter::Bandwidth, bytes)
                .await
                .map_err(store_err);
        }

        let current = self
            .store
            .usage_for_period(org_id, &period)
            .await
            .map_err(store_err)?
            .map_or(0, |r| r.bandwidth_used);
        let projected = current + bytes;

        if projected >= BANDWIDTH_HARD_STOP_MULTIPLIER * allocation {
            return Err(MeteringError::LimitExceeded {
                resource: GatedResource::Bandwidth,
                current_usage: current,
                limit: allocation,
            });
        }

        let mut record = self
            .store
            .increment_usage(org_id, &period, UsageCounter::Bandwidth, bytes)
            .await
            .map_err(store_err)?;

        if projected > allocation {
            let over = excess_delta(projected, bytes, allocation);
            record = self
                .store
                .increment_overage(org_id, &period, UsageCounter::Bandwidth, over)
                .await
                .map_err(store_err)?;

            let percentage = u32::try_from(projected * 100 / allocation).unwrap_or(u32::MAX);
            tracing::warn!(
                org_id = %org_id,
                used = projected,
                allocation,
                percentage,
                "Bandwidth beyond allocation"
            );
            if let Err(err) = self
                .notifier
                .limit_warning(org_id, GatedResource::Bandwidth, percentage)
                .await
            {
                tracing::warn!(org_id = %org_id, error = %err, "Bandwidth warning notification failed");
            }
        }

        Ok(record)
    }

    /// Increment a counter and book any excess beyond the plan limit into
    /// the matching overage counter.
    async fn track(
        &self,
        org_id: OrgId,
        counter: UsageCounter,
        gated: GatedResource,
        amount: i64,
    ) -> Result<UsageRecord, MeteringError> {
        let limits = self.plan_limits(org_id).await?;
        let period = BillingPeriod::current();

        let record = self
            .store
            .increment_usage(org_id, &period, counter, amount)
            .await
            .map_err(store_err)?;

        let limit = limits.limit_for(gated);
        if limit == UNLIMITED {
            return Ok(record);
        }

        let over = excess_delta(record.value(counter), amount, limit);
        if over > 0 {
            return self
                .store
                .increment_overage(org_id, &period, counter, over)
                .await
                .map_err(store_err);
        }
        Ok(record)
    }

    async fn plan_limits(&self, org_id: OrgId) -> Result<PlanLimits, MeteringError> {
        let subscription = self
            .store
            .current_subscription(org_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| MeteringError::NoSubscription {
                org_id: org_id.to_string(),
            })?;
        Ok(*self.catalog.resolve(&subscription.plan_id).limits())
    }
}
