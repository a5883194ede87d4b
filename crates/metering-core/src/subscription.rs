//! Subscription records and access classification.
//!
//! The subscription row mirrors the payment processor's subscription object;
//! the processor is the system of record and the webhook feed is the only
//! writer (besides trial provisioning). Access classification is a pure
//! function of the row plus the clock; in particular the `trialing` status
//! is always re-derived from the trial-end date, because the processor's
//! asynchronous status transition can lag the wall-clock trial boundary.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::OrgId;

/// Subscription lifecycle states, matching the processor's vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// In a free trial window.
    Trialing,
    /// Paid and current.
    Active,
    /// A payment failed; the processor is retrying (dunning).
    PastDue,
    /// Dunning exhausted without payment.
    Unpaid,
    /// Terminal: the subscription ended.
    Canceled,
    /// Initial payment has not completed.
    Incomplete,
    /// Initial payment window elapsed without completing.
    IncompleteExpired,
    /// Collection is paused.
    Paused,
}

impl SubscriptionStatus {
    /// Parse the processor's status string.
    #[must_use]
    pub fn from_processor(status: &str) -> Option<Self> {
        match status {
            "trialing" => Some(Self::Trialing),
            "active" => Some(Self::Active),
            "past_due" => Some(Self::PastDue),
            "unpaid" => Some(Self::Unpaid),
            "canceled" => Some(Self::Canceled),
            "incomplete" => Some(Self::Incomplete),
            "incomplete_expired" => Some(Self::IncompleteExpired),
            "paused" => Some(Self::Paused),
            _ => None,
        }
    }

    /// The wire form of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trialing => "trialing",
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::Unpaid => "unpaid",
            Self::Canceled => "canceled",
            Self::Incomplete => "incomplete",
            Self::IncompleteExpired => "incomplete_expired",
            Self::Paused => "paused",
        }
    }

    /// Whether a row in this status counts as the organization's current
    /// subscription. At most one qualifying row exists per organization;
    /// terminal rows persist as history and never qualify.
    #[must_use]
    pub const fn is_qualifying(self) -> bool {
        matches!(
            self,
            Self::Trialing | Self::Active | Self::PastDue | Self::Unpaid
        )
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The locally-owned view of one subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    /// Local row id.
    pub id: Uuid,
    /// The organization this subscription belongs to.
    pub org_id: OrgId,
    /// Processor customer id, once checkout has completed.
    pub external_customer_id: Option<String>,
    /// Processor subscription id, once checkout has completed.
    pub external_subscription_id: Option<String>,
    /// Plan id into the catalog.
    pub plan_id: String,
    /// Lifecycle status.
    pub status: SubscriptionStatus,
    /// Start of the current billing cycle.
    pub current_period_start: DateTime<Utc>,
    /// End of the current billing cycle.
    pub current_period_end: DateTime<Utc>,
    /// Trial window start, if the subscription had one.
    pub trial_start: Option<DateTime<Utc>>,
    /// Trial window end, if the subscription had one.
    pub trial_end: Option<DateTime<Utc>>,
    /// Set when the subscriber chose to cancel at the period boundary.
    pub cancel_at_period_end: bool,
    /// When cancellation was requested.
    pub canceled_at: Option<DateTime<Utc>>,
    /// When the subscription actually ended.
    pub ended_at: Option<DateTime<Utc>>,
    /// Seats purchased.
    pub seat_count: i32,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionRecord {
    /// Provision a trial subscription at organization creation. Carries no
    /// external ids; the `subscription created` webhook upserts over this
    /// row once checkout completes.
    #[must_use]
    pub fn trial(org_id: OrgId, plan_id: &str, trial_days: i64) -> Self {
        let now = Utc::now();
        let trial_end = now + Duration::days(trial_days);
        Self {
            id: Uuid::new_v4(),
            org_id,
            external_customer_id: None,
            external_subscription_id: None,
            plan_id: plan_id.to_owned(),
            status: SubscriptionStatus::Trialing,
            current_period_start: now,
            current_period_end: trial_end,
            trial_start: Some(now),
            trial_end: Some(trial_end),
            cancel_at_period_end: false,
            canceled_at: None,
            ended_at: None,
            seat_count: 1,
            created_at: now,
            updated_at: now,
        }
    }
}

// ============================================================================
// Access classification
// ============================================================================

/// Coarse-grained access derived from subscription state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    /// Read and write, no restriction.
    Full,
    /// Read and write with a user-visible payment warning.
    Grace,
    /// Reads allowed; every write check fails.
    ReadOnly,
    /// No access.
    None,
}

/// The classifier's verdict for one subscription row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessDecision {
    /// The derived access level.
    pub level: AccessLevel,
    /// Convenience flag: writes are rejected.
    pub read_only: bool,
    /// Convenience flag: inside the dunning grace window.
    pub grace_period: bool,
    /// Whole days of trial remaining, when on a live trial.
    pub days_remaining: Option<i64>,
    /// Canned, user-renderable reason for restricted levels.
    pub reason: Option<String>,
}

impl AccessDecision {
    fn full(days_remaining: Option<i64>) -> Self {
        Self {
            level: AccessLevel::Full,
            read_only: false,
            grace_period: false,
            days_remaining,
            reason: None,
        }
    }

    fn denied(reason: &str) -> Self {
        Self {
            level: AccessLevel::None,
            read_only: true,
            grace_period: false,
            days_remaining: None,
            reason: Some(reason.to_owned()),
        }
    }
}

/// Classify what access a subscription grants at `now`.
///
/// The status column is not trusted for trials: a `trialing` row whose
/// `trial_end` has elapsed is classified as if the processor had already
/// moved it to `incomplete_expired`. Skipping that recomputation would
/// leave a window of unpaid full access between the wall-clock trial
/// boundary and the processor's own (asynchronous) transition.
#[must_use]
pub fn classify(record: &SubscriptionRecord, now: DateTime<Utc>) -> AccessDecision {
    match record.status {
        SubscriptionStatus::Active => AccessDecision::full(None),
        SubscriptionStatus::Trialing => match record.trial_end {
            Some(end) if end > now => {
                AccessDecision::full(Some((end - now).num_days()))
            }
            // Trial date elapsed (or was never set): synthetic expiry.
            _ => AccessDecision::denied("trial expired"),
        },
        SubscriptionStatus::PastDue => AccessDecision {
            level: AccessLevel::Grace,
            read_only: false,
            grace_period: true,
            days_remaining: None,
            reason: Some("payment failed".to_owned()),
        },
        SubscriptionStatus::Unpaid => AccessDecision {
            level: AccessLevel::ReadOnly,
            read_only: true,
            grace_period: false,
            days_remaining: None,
            reason: Some("payment required".to_owned()),
        },
        SubscriptionStatus::Canceled => AccessDecision::denied("subscription canceled"),
        SubscriptionStatus::Incomplete | SubscriptionStatus::IncompleteExpired => {
            AccessDecision::denied("payment incomplete")
        }
        SubscriptionStatus::Paused => AccessDecision::denied("subscription paused"),
    }
}
