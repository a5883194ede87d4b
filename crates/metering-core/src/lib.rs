//! Core types for the organization metering service.
//!
//! This crate holds the pure domain: no I/O, no clocks hidden inside
//! business logic, everything unit-testable against literal values.
//!
//! - **Identifiers**: [`OrgId`], [`InvoiceId`]
//! - **Plans**: [`Plan`], [`PlanCatalog`], [`PlanLimits`] with the `-1`
//!   unlimited sentinel, [`OverageRates`]
//! - **Subscriptions**: [`SubscriptionRecord`], [`SubscriptionStatus`], and
//!   the pure access classifier [`classify`]
//! - **Usage**: [`UsageRecord`], the closed [`UsageCounter`] /
//!   [`GatedResource`] enums, [`BillingPeriod`], and overage math
//! - **Billing mirrors**: [`Invoice`], [`PaymentMethod`]
//!
//! # Period discipline
//!
//! All usage aggregation is keyed by UTC calendar month via
//! [`BillingPeriod`]; computing period boundaries anywhere else is a bug.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod event;
pub mod ids;
pub mod invoice;
pub mod period;
pub mod plan;
pub mod subscription;
pub mod usage;

pub use error::{MeteringError, Result};
pub use event::{ProcessedEvent, EVENT_RETENTION_DAYS};
pub use ids::{IdError, InvoiceId, OrgId};
pub use invoice::{Invoice, PaymentMethod};
pub use period::BillingPeriod;
pub use plan::{
    OverageRates, Plan, PlanCatalog, PlanFeatures, PlanLimits, PlanResolution, BYTES_PER_GB,
    UNLIMITED,
};
pub use subscription::{
    classify, AccessDecision, AccessLevel, SubscriptionRecord, SubscriptionStatus,
};
pub use usage::{
    bytes_to_billable_gb, overage_charge_cents, GatedResource, UsageCounter, UsageRecord,
};
