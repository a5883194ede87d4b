//! Usage records and overage math.
//!
//! The set of countable resources is a closed enum so that every counter
//! mutation maps to one known column; there is no stringly-typed field
//! selection anywhere in the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::OrgId;
use crate::period::BillingPeriod;
use crate::plan::{OverageRates, BYTES_PER_GB};

/// The four per-period consumption counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageCounter {
    /// Stored bytes.
    Storage,
    /// Videos uploaded this period.
    Videos,
    /// Bytes served this period.
    Bandwidth,
    /// AI requests made this period.
    AiRequests,
}

impl UsageCounter {
    /// Wire/diagnostic name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Storage => "storage",
            Self::Videos => "videos",
            Self::Bandwidth => "bandwidth",
            Self::AiRequests => "ai_requests",
        }
    }
}

impl std::fmt::Display for UsageCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the enforcement gate can be asked about.
///
/// A superset of [`UsageCounter`]: members and videos are counted live by
/// external collaborators rather than read from the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatedResource {
    /// Stored bytes, from the ledger.
    Storage,
    /// Hosted video count, from the video store.
    Videos,
    /// Seat count, from the membership directory.
    Members,
    /// Bytes served, from the ledger.
    Bandwidth,
    /// AI requests, from the ledger.
    AiRequests,
}

impl GatedResource {
    /// Wire/diagnostic name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Storage => "storage",
            Self::Videos => "videos",
            Self::Members => "members",
            Self::Bandwidth => "bandwidth",
            Self::AiRequests => "ai_requests",
        }
    }
}

impl std::fmt::Display for GatedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One organization's consumption for one billing period.
///
/// Counters never go negative (decrements clamp at zero). The overage
/// counters keep the true excess beyond plan limits even though the
/// user-facing percentage clamps at 100; billing and UI deliberately see
/// different numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Owning organization.
    pub org_id: OrgId,
    /// Period start (UTC month boundary).
    pub period_start: DateTime<Utc>,
    /// Period end (last instant of the month).
    pub period_end: DateTime<Utc>,
    /// Stored bytes.
    pub storage_used: i64,
    /// Videos uploaded this period.
    pub videos_uploaded: i64,
    /// Bytes served this period.
    pub bandwidth_used: i64,
    /// AI requests this period.
    pub ai_requests: i64,
    /// Stored bytes beyond the plan limit.
    pub storage_overage: i64,
    /// Videos beyond the plan limit.
    pub videos_overage: i64,
    /// Bytes served beyond the plan limit.
    pub bandwidth_overage: i64,
    /// AI requests beyond the plan limit.
    pub ai_requests_overage: i64,
    /// Computed overage charge for the period, in cents.
    pub overage_cents: i64,
    /// Whether the charge has been reported to the payment processor.
    pub overage_reported: bool,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl UsageRecord {
    /// An all-zero record for a period, used by read-only callers when no
    /// row exists yet. Never persisted by the read path.
    #[must_use]
    pub fn zeroed(org_id: OrgId, period: &BillingPeriod) -> Self {
        let now = Utc::now();
        Self {
            org_id,
            period_start: period.start,
            period_end: period.end,
            storage_used: 0,
            videos_uploaded: 0,
            bandwidth_used: 0,
            ai_requests: 0,
            storage_overage: 0,
            videos_overage: 0,
            bandwidth_overage: 0,
            ai_requests_overage: 0,
            overage_cents: 0,
            overage_reported: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Read a consumption counter.
    #[must_use]
    pub const fn value(&self, counter: UsageCounter) -> i64 {
        match counter {
            UsageCounter::Storage => self.storage_used,
            UsageCounter::Videos => self.videos_uploaded,
            UsageCounter::Bandwidth => self.bandwidth_used,
            UsageCounter::AiRequests => self.ai_requests,
        }
    }

    /// Read an overage counter.
    #[must_use]
    pub const fn overage_value(&self, counter: UsageCounter) -> i64 {
        match counter {
            UsageCounter::Storage => self.storage_overage,
            UsageCounter::Videos => self.videos_overage,
            UsageCounter::Bandwidth => self.bandwidth_overage,
            UsageCounter::AiRequests => self.ai_requests_overage,
        }
    }
}

// ============================================================================
// Overage math
// ============================================================================

/// Convert overage bytes to billable gigabytes, rounding up.
#[must_use]
pub const fn bytes_to_billable_gb(bytes: i64) -> i64 {
    if bytes <= 0 {
        return 0;
    }
    (bytes + BYTES_PER_GB - 1) / BYTES_PER_GB
}

/// Compute the billable overage charge for a record under the given rates.
///
/// Recomputing is always safe: the inputs are the current overage counters,
/// not a running total, so the result is a pure function of the row.
/// Resources without a configured rate contribute zero.
#[must_use]
pub fn overage_charge_cents(record: &UsageRecord, rates: &OverageRates) -> i64 {
    let mut total = 0i64;

    if let Some(rate) = rates.storage_per_gb_cents {
        total += bytes_to_billable_gb(record.storage_overage) * rate;
    }
    if let Some(rate) = rates.bandwidth_per_gb_cents {
        total += bytes_to_billable_gb(record.bandwidth_overage) * rate;
    }
    if let Some(rate) = rates.video_unit_cents {
        total += record.videos_overage.max(0) * rate;
    }
    if let Some(rate) = rates.ai_request_cents {
        total += record.ai_requests_overage.max(0) * rate;
    }

    total
}
