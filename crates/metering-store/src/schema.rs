//! Table names and shared column lists for the PostgreSQL backend.
//!
//! The unique indexes declared in the migrations carry the concurrency
//! story: `(org_id, period_start)` closes the first-writer race on usage
//! rows and `event_id` closes the duplicate-delivery race on webhooks.

/// Table names used by the PostgreSQL backend.
pub mod table {
    /// Subscription rows, one qualifying row per organization plus history.
    pub const SUBSCRIPTIONS: &str = "subscriptions";

    /// Per-organization, per-period usage counters.
    pub const USAGE_RECORDS: &str = "usage_records";

    /// Webhook dedup rows, keyed by external event id.
    pub const WEBHOOK_EVENTS: &str = "webhook_events";

    /// Mirrored invoices, keyed by external invoice id.
    pub const INVOICES: &str = "invoices";

    /// Payment methods on file, keyed by external id.
    pub const PAYMENT_METHODS: &str = "payment_methods";
}

/// The column list selected for usage rows, in `UsageRow` field order.
pub const USAGE_COLUMNS: &str = "org_id, period_start, period_end, \
     storage_used, videos_uploaded, bandwidth_used, ai_requests, \
     storage_overage, videos_overage, bandwidth_overage, ai_requests_overage, \
     overage_cents, overage_reported, created_at, updated_at";

/// The column list selected for subscription rows, in `SubscriptionRow`
/// field order.
pub const SUBSCRIPTION_COLUMNS: &str = "id, org_id, external_customer_id, external_subscription_id, \
     plan_id, status, current_period_start, current_period_end, \
     trial_start, trial_end, cancel_at_period_end, canceled_at, ended_at, \
     seat_count, created_at, updated_at";
