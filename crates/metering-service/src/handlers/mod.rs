//! HTTP request handlers.

pub mod health;
pub mod limits;
pub mod subscriptions;
pub mod usage;
pub mod webhooks;
