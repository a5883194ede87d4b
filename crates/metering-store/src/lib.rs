//! Storage layer for the metering service.
//!
//! Two backends implement the same [`Store`] trait:
//!
//! - [`PgStore`]: PostgreSQL via sqlx. Counter mutations are single atomic
//!   SQL statements and webhook dedup rides on a unique constraint, so
//!   concurrent writers can never lose updates or double-apply an event.
//! - [`MemoryStore`]: mutex-guarded maps with identical semantics, used by
//!   tests and local development.
//!
//! # Concurrency contract
//!
//! Implementations must guarantee:
//!
//! - `increment_usage`/`decrement_usage` apply read-modify-write atomically
//!   (two concurrent increments of 1 always land as +2).
//! - `decrement_usage` clamps at zero.
//! - `create_usage_if_absent` produces exactly one row per
//!   `(organization, period)` under concurrent callers.
//! - `claim_event` returns `true` for exactly one caller per event id,
//!   however many deliveries race.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;
pub mod postgres;
pub mod schema;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;

use metering_core::{
    BillingPeriod, Invoice, OrgId, PaymentMethod, ProcessedEvent, SubscriptionRecord,
    UsageCounter, UsageRecord,
};

/// The storage trait defining all persistence operations.
#[async_trait]
pub trait Store: Send + Sync {
    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// The organization's current subscription: the newest row whose status
    /// still qualifies (trialing, active, past due, unpaid). Terminal rows
    /// are history and are never returned here.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn current_subscription(&self, org_id: OrgId) -> Result<Option<SubscriptionRecord>>;

    /// Look up a subscription by the processor's subscription id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn subscription_by_external_id(
        &self,
        external_subscription_id: &str,
    ) -> Result<Option<SubscriptionRecord>>;

    /// Look up the newest subscription for a processor customer id.
    /// Used to attribute customer-scoped events (payment methods) to an
    /// organization.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn subscription_by_customer_id(
        &self,
        external_customer_id: &str,
    ) -> Result<Option<SubscriptionRecord>>;

    /// Insert a new subscription row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn insert_subscription(&self, record: &SubscriptionRecord) -> Result<()>;

    /// Replace a subscription row by its local id.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no row has that id.
    async fn update_subscription(&self, record: &SubscriptionRecord) -> Result<()>;

    // =========================================================================
    // Usage counters
    // =========================================================================

    /// Fetch the usage row for a period, if one exists. Read-only: never
    /// creates the row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn usage_for_period(
        &self,
        org_id: OrgId,
        period: &BillingPeriod,
    ) -> Result<Option<UsageRecord>>;

    /// Fetch the usage row for a period, creating a zero row if absent.
    /// Idempotent under concurrent callers.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn create_usage_if_absent(
        &self,
        org_id: OrgId,
        period: &BillingPeriod,
    ) -> Result<UsageRecord>;

    /// Atomically add `amount` to one counter for the period, creating the
    /// row if needed. Returns the row after the update.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn increment_usage(
        &self,
        org_id: OrgId,
        period: &BillingPeriod,
        counter: UsageCounter,
        amount: i64,
    ) -> Result<UsageRecord>;

    /// Atomically subtract `amount` from one counter, clamped at zero.
    /// Returns the row after the update.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn decrement_usage(
        &self,
        org_id: OrgId,
        period: &BillingPeriod,
        counter: UsageCounter,
        amount: i64,
    ) -> Result<UsageRecord>;

    /// Atomically add `amount` to one overage counter for the period.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn increment_overage(
        &self,
        org_id: OrgId,
        period: &BillingPeriod,
        counter: UsageCounter,
        amount: i64,
    ) -> Result<UsageRecord>;

    /// Persist the computed overage charge for the period.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the period has no usage row.
    async fn record_overage_charge(
        &self,
        org_id: OrgId,
        period: &BillingPeriod,
        cents: i64,
    ) -> Result<()>;

    /// Flag the period's overage as reported to the payment processor so a
    /// later sync cannot re-bill it.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the period has no usage row.
    async fn mark_overage_reported(&self, org_id: OrgId, period: &BillingPeriod) -> Result<()>;

    /// Usage rows for the organization, most recent period first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn usage_history(&self, org_id: OrgId, months: u32) -> Result<Vec<UsageRecord>>;

    // =========================================================================
    // Webhook idempotency
    // =========================================================================

    /// Claim exclusive processing rights for an event id.
    ///
    /// Returns `true` iff this call inserted the dedup row. Concurrent
    /// deliveries of the same id race on the store's uniqueness guarantee;
    /// exactly one wins.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn claim_event(&self, event: &ProcessedEvent) -> Result<bool>;

    /// Release a claim after a failed handler so the sender's retry is
    /// processed. Releasing an unclaimed id is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn release_event(&self, event_id: &str) -> Result<()>;

    // =========================================================================
    // Invoices and payment methods
    // =========================================================================

    /// Insert or refresh a mirrored invoice, keyed by the processor's
    /// invoice id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn upsert_invoice(&self, invoice: &Invoice) -> Result<()>;

    /// Mirrored invoices for an organization, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn invoices_for_org(&self, org_id: OrgId, limit: usize) -> Result<Vec<Invoice>>;

    /// Record a payment method. Re-attaching the same external id is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn insert_payment_method(&self, method: &PaymentMethod) -> Result<()>;

    /// Remove a payment method by the processor's id. Removing an unknown
    /// id is a no-op (detach events may be redelivered).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn delete_payment_method(&self, external_id: &str) -> Result<()>;

    /// Payment methods on file for an organization.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn payment_methods_for_org(&self, org_id: OrgId) -> Result<Vec<PaymentMethod>>;
}
