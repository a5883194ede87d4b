//! Error types for the metering core.

use crate::usage::GatedResource;

/// Result type for metering operations.
pub type Result<T> = std::result::Result<T, MeteringError>;

/// Errors that can occur in metering operations.
///
/// Lookup and policy errors carry structured fields so callers can render a
/// specific message rather than a generic failure.
#[derive(Debug, thiserror::Error)]
pub enum MeteringError {
    /// The plan catalog has no entry for the id.
    #[error("plan not found: {plan_id}")]
    PlanNotFound {
        /// The plan id that missed.
        plan_id: String,
    },

    /// No qualifying subscription row exists for the organization.
    #[error("no active subscription for organization {org_id}")]
    NoSubscription {
        /// The organization without a subscription.
        org_id: String,
    },

    /// A resource limit would be exceeded.
    #[error("{resource} limit reached: {current_usage} of {limit}")]
    LimitExceeded {
        /// Which resource hit its cap.
        resource: GatedResource,
        /// Consumption at the time of the check.
        current_usage: i64,
        /// The plan's configured limit.
        limit: i64,
    },

    /// A write was attempted under read-only (or feature-gated) access.
    #[error("write access denied: {reason}")]
    Forbidden {
        /// The classifier's reason.
        reason: String,
    },

    /// A usage counter update failed.
    #[error("usage tracking failed: {0}")]
    UsageTracking(String),

    /// Generic persistence failure, wrapping the backend's message.
    #[error("storage error: {0}")]
    Storage(String),

    /// An invalid subscription state transition was attempted.
    #[error("invalid subscription transition: {reason}")]
    InvalidTransition {
        /// What made the transition invalid.
        reason: String,
    },

    /// The processor sent a status outside the known vocabulary.
    #[error("unknown subscription status: {status}")]
    UnknownStatus {
        /// The unrecognized status string.
        status: String,
    },

    /// An external collaborator call failed.
    #[error("external service error: {service}: {message}")]
    External {
        /// The collaborator that failed.
        service: String,
        /// Its error message.
        message: String,
    },
}
