//! Plan catalog: limits, feature flags, and overage rates per plan.
//!
//! The catalog is immutable reference data seeded at startup. Nothing in the
//! runtime mutates a plan; every lookup is a pure read.

use serde::{Deserialize, Serialize};

use crate::usage::GatedResource;

// ============================================================================
// Constants
// ============================================================================

/// Sentinel limit value meaning "no cap".
///
/// Never compare a consumption value against this with ordinary arithmetic;
/// go through [`PlanLimits::limit_for`] and [`is_unlimited`](PlanLimits::is_unlimited).
pub const UNLIMITED: i64 = -1;

/// One binary gigabyte, the unit for storage and bandwidth limits and rates.
pub const BYTES_PER_GB: i64 = 1024 * 1024 * 1024;

/// Free plan storage allocation (5 GB).
pub const FREE_STORAGE_BYTES: i64 = 5 * BYTES_PER_GB;

/// Free plan bandwidth allocation (20 GB per period).
pub const FREE_BANDWIDTH_BYTES: i64 = 20 * BYTES_PER_GB;

/// Creator plan monthly price in cents ($19).
pub const CREATOR_PLAN_PRICE_CENTS: i64 = 1900;

/// Studio plan monthly price in cents ($49).
pub const STUDIO_PLAN_PRICE_CENTS: i64 = 4900;

/// Enterprise plan monthly price in cents ($199).
pub const ENTERPRISE_PLAN_PRICE_CENTS: i64 = 19900;

// ============================================================================
// Limits and features
// ============================================================================

/// Numeric limits for a plan.
///
/// Each field is either a non-negative cap or [`UNLIMITED`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLimits {
    /// Total storage in bytes.
    pub storage_bytes: i64,
    /// Total hosted video count.
    pub video_count: i64,
    /// Organization member (seat) count.
    pub member_count: i64,
    /// Bandwidth in bytes per billing period.
    pub bandwidth_bytes: i64,
    /// AI requests per billing period.
    pub ai_requests: i64,
}

impl PlanLimits {
    /// Limits applied when a subscription references a plan the catalog no
    /// longer knows. Matches the free tier so a stale plan id degrades to
    /// the most restrictive real configuration instead of failing writes.
    #[must_use]
    pub const fn fallback() -> Self {
        Self {
            storage_bytes: FREE_STORAGE_BYTES,
            video_count: 10,
            member_count: 2,
            bandwidth_bytes: FREE_BANDWIDTH_BYTES,
            ai_requests: 20,
        }
    }

    /// The configured limit for a gated resource.
    #[must_use]
    pub const fn limit_for(&self, resource: GatedResource) -> i64 {
        match resource {
            GatedResource::Storage => self.storage_bytes,
            GatedResource::Videos => self.video_count,
            GatedResource::Members => self.member_count,
            GatedResource::Bandwidth => self.bandwidth_bytes,
            GatedResource::AiRequests => self.ai_requests,
        }
    }

    /// Whether a resource is uncapped on this plan.
    #[must_use]
    pub const fn is_unlimited(&self, resource: GatedResource) -> bool {
        self.limit_for(resource) == UNLIMITED
    }
}

/// Boolean feature flags attached to a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanFeatures {
    /// Player and page branding can be customized.
    pub custom_branding: bool,
    /// AI tooling (transcription, chapters, summaries) is enabled.
    pub ai_tools: bool,
    /// Advanced viewer analytics.
    pub advanced_analytics: bool,
    /// Priority support queue.
    pub priority_support: bool,
    /// Programmatic API access.
    pub api_access: bool,
}

/// Per-unit overage billing rates.
///
/// A resource without a configured rate contributes zero overage charge.
/// Storage and bandwidth rates are cents per gigabyte; videos and AI
/// requests are cents per unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverageRates {
    /// Cents per GB of storage beyond the plan limit.
    pub storage_per_gb_cents: Option<i64>,
    /// Cents per GB of bandwidth beyond the plan limit.
    pub bandwidth_per_gb_cents: Option<i64>,
    /// Cents per video beyond the plan limit.
    pub video_unit_cents: Option<i64>,
    /// Cents per AI request beyond the plan limit.
    pub ai_request_cents: Option<i64>,
}

// ============================================================================
// Plans
// ============================================================================

/// An immutable catalog entry describing one subscription plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Stable plan id ("free", "creator", ...).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Monthly price in cents.
    pub monthly_price_cents: i64,
    /// Yearly price in cents.
    pub yearly_price_cents: i64,
    /// Payment-processor price id for the monthly interval.
    pub monthly_price_id: String,
    /// Payment-processor price id for the yearly interval.
    pub yearly_price_id: String,
    /// Numeric limits.
    pub limits: PlanLimits,
    /// Feature flags.
    pub features: PlanFeatures,
    /// Overage rates, where the plan bills beyond its limits.
    pub overage: OverageRates,
    /// Whether the plan is offered to new subscribers.
    pub active: bool,
}

/// The seeded, immutable plan catalog.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    plans: Vec<Plan>,
}

impl PlanCatalog {
    /// Build a catalog from explicit plans (tests, bespoke deployments).
    #[must_use]
    pub fn new(plans: Vec<Plan>) -> Self {
        Self { plans }
    }

    /// The standard four-tier catalog.
    #[must_use]
    pub fn standard() -> Self {
        Self::new(vec![
            Plan {
                id: "free".into(),
                name: "Free".into(),
                monthly_price_cents: 0,
                yearly_price_cents: 0,
                monthly_price_id: String::new(),
                yearly_price_id: String::new(),
                limits: PlanLimits {
                    storage_bytes: FREE_STORAGE_BYTES,
                    video_count: 10,
                    member_count: 2,
                    bandwidth_bytes: FREE_BANDWIDTH_BYTES,
                    ai_requests: 20,
                },
                features: PlanFeatures::default(),
                overage: OverageRates::default(),
                active: true,
            },
            Plan {
                id: "creator".into(),
                name: "Creator".into(),
                monthly_price_cents: CREATOR_PLAN_PRICE_CENTS,
                yearly_price_cents: CREATOR_PLAN_PRICE_CENTS * 10,
                monthly_price_id: "price_creator_monthly".into(),
                yearly_price_id: "price_creator_yearly".into(),
                limits: PlanLimits {
                    storage_bytes: 250 * BYTES_PER_GB,
                    video_count: 250,
                    member_count: 5,
                    bandwidth_bytes: 1024 * BYTES_PER_GB,
                    ai_requests: 500,
                },
                features: PlanFeatures {
                    custom_branding: true,
                    ai_tools: true,
                    advanced_analytics: false,
                    priority_support: false,
                    api_access: false,
                },
                overage: OverageRates {
                    storage_per_gb_cents: Some(10),
                    bandwidth_per_gb_cents: Some(5),
                    video_unit_cents: Some(25),
                    ai_request_cents: Some(1),
                },
                active: true,
            },
            Plan {
                id: "studio".into(),
                name: "Studio".into(),
                monthly_price_cents: STUDIO_PLAN_PRICE_CENTS,
                yearly_price_cents: STUDIO_PLAN_PRICE_CENTS * 10,
                monthly_price_id: "price_studio_monthly".into(),
                yearly_price_id: "price_studio_yearly".into(),
                limits: PlanLimits {
                    storage_bytes: 1024 * BYTES_PER_GB,
                    video_count: UNLIMITED,
                    member_count: 15,
                    bandwidth_bytes: 5 * 1024 * BYTES_PER_GB,
                    ai_requests: 2500,
                },
                features: PlanFeatures {
                    custom_branding: true,
                    ai_tools: true,
                    advanced_analytics: true,
                    priority_support: false,
                    api_access: true,
                },
                overage: OverageRates {
                    storage_per_gb_cents: Some(8),
                    bandwidth_per_gb_cents: Some(4),
                    video_unit_cents: None,
                    ai_request_cents: Some(1),
                },
                active: true,
            },
            Plan {
                id: "enterprise".into(),
                name: "Enterprise".into(),
                monthly_price_cents: ENTERPRISE_PLAN_PRICE_CENTS,
                yearly_price_cents: ENTERPRISE_PLAN_PRICE_CENTS * 10,
                monthly_price_id: "price_enterprise_monthly".into(),
                yearly_price_id: "price_enterprise_yearly".into(),
                limits: PlanLimits {
                    storage_bytes: UNLIMITED,
                    video_count: UNLIMITED,
                    member_count: UNLIMITED,
                    bandwidth_bytes: UNLIMITED,
                    ai_requests: UNLIMITED,
                },
                features: PlanFeatures {
                    custom_branding: true,
                    ai_tools: true,
                    advanced_analytics: true,
                    priority_support: true,
                    api_access: true,
                },
                overage: OverageRates::default(),
                active: true,
            },
        ])
    }

    /// Look up a plan by id.
    #[must_use]
    pub fn get(&self, plan_id: &str) -> Option<&Plan> {
        self.plans.iter().find(|p| p.id == plan_id)
    }

    /// Look up a plan by the payment processor's price id (either interval).
    #[must_use]
    pub fn get_by_price_id(&self, price_id: &str) -> Option<&Plan> {
        if price_id.is_empty() {
            return None;
        }
        self.plans
            .iter()
            .find(|p| p.monthly_price_id == price_id || p.yearly_price_id == price_id)
    }

    /// All plans currently offered to new subscribers.
    #[must_use]
    pub fn list_active(&self) -> Vec<&Plan> {
        self.plans.iter().filter(|p| p.active).collect()
    }
}

/// Outcome of resolving a subscription's plan against the catalog.
///
/// A subscription row can outlive its plan (catalog reshuffles, renamed
/// ids). Callers must handle that case explicitly instead of treating the
/// plan as nullable.
#[derive(Debug, Clone)]
pub enum PlanResolution<'a> {
    /// The catalog knows the plan.
    Resolved(&'a Plan),
    /// The catalog does not; the fallback limits apply and no overage is
    /// billable.
    Fallback(PlanLimits),
}

impl PlanResolution<'_> {
    /// The limits in force under this resolution.
    #[must_use]
    pub const fn limits(&self) -> &PlanLimits {
        match self {
            PlanResolution::Resolved(plan) => &plan.limits,
            PlanResolution::Fallback(limits) => limits,
        }
    }

    /// Overage rates, if any are billable.
    #[must_use]
    pub const fn overage_rates(&self) -> Option<&OverageRates> {
        match self {
            PlanResolution::Resolved(plan) => Some(&plan.overage),
            PlanResolution::Fallback(_) => None,
        }
    }
}

impl PlanCatalog {
    /// Resolve a plan id, falling back to the restrictive default limits
    /// when the id is unknown.
    #[must_use]
    pub fn resolve(&self, plan_id: &str) -> PlanResolution<'_> {
        self.get(plan_id).map_or_else(
            || PlanResolution::Fallback(PlanLimits::fallback()),
            PlanResolution::Resolved,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_catalog_lookup() {
        let catalog = PlanCatalog::standard();
        assert!(catalog.get("creator").is_some());
        assert!(catalog.get("platinum").is_none());
        assert_eq!(catalog.list_active().len(), 4);
    }

    #[test]
    fn price_id_lookup_covers_both_intervals() {
        let catalog = PlanCatalog::standard();
        assert_eq!(
            catalog.get_by_price_id("price_studio_monthly").unwrap().id,
            "studio"
        );
        assert_eq!(
            catalog.get_by_price_id("price_studio_yearly").unwrap().id,
            "studio"
        );
        assert!(catalog.get_by_price_id("price_unknown").is_none());
    }

    #[test]
    fn empty_price_id_never_matches() {
        // The free plan has empty price ids; an empty probe must not hit it.
        let catalog = PlanCatalog::standard();
        assert!(catalog.get_by_price_id("").is_none());
    }

    #[test]
    fn unlimited_sentinel() {
        let catalog = PlanCatalog::standard();
        let studio = catalog.get("studio").unwrap();
        assert!(studio.limits.is_unlimited(GatedResource::Videos));
        assert!(!studio.limits.is_unlimited(GatedResource::Storage));
    }

    #[test]
    fn resolve_unknown_plan_falls_back() {
        let catalog = PlanCatalog::standard();
        match catalog.resolve("retired-plan") {
            PlanResolution::Fallback(limits) => {
                assert_eq!(limits, PlanLimits::fallback());
            }
            PlanResolution::Resolved(_) => panic!("expected fallback"),
        }
        assert!(catalog.resolve("retired-plan").overage_rates().is_none());
    }
}
