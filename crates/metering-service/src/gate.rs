//! The limit enforcement gate.
//!
//! Combines the plan catalog, the usage ledger, the access classifier, and
//! the live collaborator counts into a single allow/deny decision that
//! callers consult *before* a metered operation takes effect
//! (check-then-act). Bandwidth is deliberately absent here: its asymmetric
//! policy lives in [`crate::ledger::UsageLedger::track_bandwidth`].
//!
//! The subscription row is fetched per request and the classifier is
//! recomputed on every read; nothing here is cached, because the trial-date
//! edge case requires freshness.

use std::sync::Arc;

use serde::Serialize;

use metering_core::{
    classify, AccessDecision, AccessLevel, BillingPeriod, GatedResource, MeteringError, OrgId,
    PlanCatalog, PlanResolution, SubscriptionRecord, UsageCounter, UNLIMITED,
};
use metering_store::Store;

use crate::external::{MediaLibrary, MemberDirectory};
use crate::ledger::store_err;

/// Outcome of a limit check.
///
/// `percentage` is clamped at 100 for display; the ledger's overage
/// counters carry the true excess for billing. The two numbers serve
/// different audiences and are intentionally not unified.
#[derive(Debug, Clone, Serialize)]
pub struct LimitCheck {
    /// Whether the requested increment fits.
    pub allowed: bool,
    /// Consumption at the time of the check.
    pub current_usage: i64,
    /// The plan's configured limit (`-1` for unlimited).
    pub limit: i64,
    /// Room left before the limit (`-1` for unlimited).
    pub remaining: i64,
    /// Percent of the limit consumed, clamped to 100.
    pub percentage: u32,
}

/// Pre-flight limit and access checks for metered operations.
pub struct LimitGate {
    store: Arc<dyn Store>,
    catalog: Arc<PlanCatalog>,
    directory: Arc<dyn MemberDirectory>,
    media: Arc<dyn MediaLibrary>,
}

impl LimitGate {
    /// Build a gate over the given store, catalog, and collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        catalog: Arc<PlanCatalog>,
        directory: Arc<dyn MemberDirectory>,
        media: Arc<dyn MediaLibrary>,
    ) -> Self {
        Self {
            store,
            catalog,
            directory,
            media,
        }
    }

    /// Would consuming `additional` units of `resource` fit the plan?
    ///
    /// # Errors
    ///
    /// Returns `NoSubscription` when the organization has no qualifying
    /// subscription, or an error if a collaborator or the store fails.
    pub async fn check_resource_limit(
        &self,
        org_id: OrgId,
        resource: GatedResource,
        additional: i64,
    ) -> Result<LimitCheck, MeteringError> {
        let subscription = self.require_subscription(org_id).await?;

        let resolution = self.catalog.resolve(&subscription.plan_id);
        if matches!(resolution, PlanResolution::Fallback(_)) {
            tracing::warn!(
                org_id = %org_id,
                plan_id = %subscription.plan_id,
                "Subscription references an unknown plan; fallback limits in force"
            );
        }
        let limit = resolution.limits().limit_for(resource);

        if limit == UNLIMITED {
            return Ok(LimitCheck {
                allowed: true,
                current_usage: 0,
                limit: UNLIMITED,
                remaining: UNLIMITED,
                percentage: 0,
            });
        }

        let current = self.current_count(org_id, resource).await?;
        let new_total = current + additional;

        Ok(LimitCheck {
            allowed: new_total <= limit,
            current_usage: current,
            limit,
            remaining: (limit - current).max(0),
            percentage: clamped_percentage(current, limit),
        })
    }

    /// Fail with [`MeteringError::LimitExceeded`] unless the increment
    /// fits.
    ///
    /// # Errors
    ///
    /// As [`Self::check_resource_limit`], plus `LimitExceeded` when the
    /// check denies.
    pub async fn enforce_resource_limit(
        &self,
        org_id: OrgId,
        resource: GatedResource,
        additional: i64,
    ) -> Result<LimitCheck, MeteringError> {
        let check = self.check_resource_limit(org_id, resource, additional).await?;
        if check.allowed {
            Ok(check)
        } else {
            Err(MeteringError::LimitExceeded {
                resource,
                current_usage: check.current_usage,
                limit: check.limit,
            })
        }
    }

    /// Require an access level that permits writes (Full or Grace).
    ///
    /// # Errors
    ///
    /// `Forbidden` for read-only access, `NoSubscription` when access is
    /// fully denied or no qualifying row exists: distinct kinds so callers
    /// can render different UX.
    pub async fn require_write_access(
        &self,
        org_id: OrgId,
    ) -> Result<AccessDecision, MeteringError> {
        let subscription = self.require_subscription(org_id).await?;
        let decision = classify(&subscription, chrono::Utc::now());
        match decision.level {
            AccessLevel::Full | AccessLevel::Grace => Ok(decision),
            AccessLevel::ReadOnly => Err(MeteringError::Forbidden {
                reason: decision
                    .reason
                    .unwrap_or_else(|| "subscription is read-only".to_owned()),
            }),
            AccessLevel::None => Err(MeteringError::NoSubscription {
                org_id: org_id.to_string(),
            }),
        }
    }

    /// Require a subscription that still grants some level of access.
    ///
    /// # Errors
    ///
    /// `NoSubscription` when none exists or access is fully denied.
    pub async fn require_active_subscription(
        &self,
        org_id: OrgId,
    ) -> Result<(SubscriptionRecord, AccessDecision), MeteringError> {
        let subscription = self.require_subscription(org_id).await?;
        let decision = classify(&subscription, chrono::Utc::now());
        if decision.level == AccessLevel::None {
            return Err(MeteringError::NoSubscription {
                org_id: org_id.to_string(),
            });
        }
        Ok((subscription, decision))
    }

    async fn require_subscription(
        &self,
        org_id: OrgId,
    ) -> Result<SubscriptionRecord, MeteringError> {
        self.store
            .current_subscription(org_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| MeteringError::NoSubscription {
                org_id: org_id.to_string(),
            })
    }

    async fn current_count(
        &self,
        org_id: OrgId,
        resource: GatedResource,
    ) -> Result<i64, MeteringError> {
        // Members and videos are counted live by their owning services;
        // only period-scoped consumption comes from the ledger.
        let counter = match resource {
            GatedResource::Members => return self.directory.member_count(org_id).await,
            GatedResource::Videos => return self.media.video_count(org_id).await,
            GatedResource::Storage => UsageCounter::Storage,
            GatedResource::Bandwidth => UsageCounter::Bandwidth,
            GatedResource::AiRequests => UsageCounter::AiRequests,
        };

        let period = BillingPeriod::current();
        Ok(self
            .store
            .usage_for_period(org_id, &period)
            .await
            .map_err(store_err)?
            .map_or(0, |record| record.value(counter)))
    }
}

/// Percent of `limit` consumed, rounded, clamped to 100.
fn clamped_percentage(current: i64, limit: i64) -> u32 {
    if limit <= 0 {
        return if current > 0 { 100 } else { 0 };
    }
    let rounded = (current * 100 + limit / 2) / limit;
    u32::try_from(rounded.clamp(0, 100)).unwrap_or(100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_rounds_and_clamps() {
        assert_eq!(clamped_percentage(0, 100), 0);
        assert_eq!(clamped_percentage(49, 100), 49);
        assert_eq!(clamped_percentage(995, 1000), 100);
        // Over the limit still reports 100; overage counters carry the rest.
        assert_eq!(clamped_percentage(150, 100), 100);
        assert_eq!(clamped_percentage(1, 0), 100);
        assert_eq!(clamped_percentage(0, 0), 0);
    }
}
