//! Metering HTTP API service.
//!
//! This crate exposes the metering core over HTTP:
//!
//! - Usage tracking and history (`/v1/orgs/{org}/usage/...`)
//! - Pre-flight limit and access checks (`/v1/orgs/{org}/limits/...`)
//! - Subscription reads, trial provisioning, overage reporting
//! - The payment processor's webhook feed (`/webhooks/billing`)
//!
//! # Authentication
//!
//! Metered operations are reported by trusted backend services using a
//! shared API key; webhook deliveries are authenticated by HMAC signature.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Noisy pedantic lints for Axum handler crates
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers stay async for routing consistency

pub mod auth;
pub mod config;
pub mod error;
pub mod external;
pub mod gate;
pub mod handlers;
pub mod ledger;
pub mod overage;
pub mod processor;
pub mod reconcile;
pub mod routes;
pub mod signature;
pub mod state;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use gate::{LimitCheck, LimitGate};
pub use ledger::UsageLedger;
pub use overage::{OverageCalculator, OverageReport};
pub use processor::{BillingEvent, BillingEventKind, ProcessorClient};
pub use reconcile::{Disposition, ReconciliationEngine};
pub use routes::create_router;
pub use state::AppState;
