//! Payment processor integration: typed webhook events and the outbound
//! API client.

pub mod client;
pub mod types;

pub use client::ProcessorClient;
pub use types::{
    BillingEvent, BillingEventKind, InvoiceObject, PaymentMethodObject, SubscriptionObject,
};
