//! Common test utilities for metering-service integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use chrono::{Duration, Utc};
use serde_json::json;

use metering_core::{OrgId, SubscriptionRecord, SubscriptionStatus};
use metering_service::signature::hmac_sha256_hex;
use metering_service::{create_router, AppState, ServiceConfig};
use metering_store::{MemoryStore, Store};

/// The webhook secret used by every harness.
pub const WEBHOOK_SECRET: &str = "whsec_test";

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Direct handle to the backing store for seeding and assertions.
    pub store: Arc<MemoryStore>,
    /// The service API key for authenticated requests.
    pub api_key: String,
}

impl TestHarness {
    /// A harness with no collaborators configured.
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// A harness with the configuration adjusted before the app is built
    /// (point collaborator URLs at a mock server, etc.).
    pub fn with_config(adjust: impl FnOnce(&mut ServiceConfig)) -> Self {
        let api_key = "test-service-key".to_string();
        let mut config = ServiceConfig {
            service_api_key: Some(api_key.clone()),
            webhook_secret: Some(WEBHOOK_SECRET.into()),
            ..ServiceConfig::default()
        };
        adjust(&mut config);

        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(Arc::clone(&store) as Arc<dyn Store>, config);
        let router: Router = create_router(state);
        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            api_key,
        }
    }

    /// Seed a subscription row directly into the store.
    pub async fn seed_subscription(
        &self,
        org_id: OrgId,
        plan_id: &str,
        status: SubscriptionStatus,
    ) -> SubscriptionRecord {
        let mut record = SubscriptionRecord::trial(org_id, plan_id, 14);
        record.status = status;
        record.external_customer_id = Some(format!("cus_{org_id}"));
        record.external_subscription_id = Some(format!("sub_{org_id}"));
        if status != SubscriptionStatus::Trialing {
            record.trial_start = None;
            record.trial_end = None;
            record.current_period_start = Utc::now() - Duration::days(3);
            record.current_period_end = Utc::now() + Duration::days(27);
        }
        self.store
            .insert_subscription(&record)
            .await
            .expect("seed subscription");
        record
    }

    /// Sign a webhook body with the harness secret.
    pub fn sign(body: &str) -> String {
        hmac_sha256_hex(WEBHOOK_SECRET, body)
    }

    /// Deliver a signed webhook event; returns the response.
    pub async fn deliver(&self, event: &serde_json::Value) -> axum_test::TestResponse {
        let body = event.to_string();
        self.server
            .post("/webhooks/billing")
            .add_header("x-billing-signature", Self::sign(&body))
            .text(body)
            .await
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Webhook event builders
// ============================================================================

/// A `customer.subscription.created` event.
pub fn subscription_created_event(
    event_id: &str,
    org_id: OrgId,
    subscription_id: &str,
    price_id: &str,
    status: &str,
) -> serde_json::Value {
    json!({
        "id": event_id,
        "type": "customer.subscription.created",
        "created": Utc::now().timestamp(),
        "data": {
            "object": {
                "id": subscription_id,
                "customer": format!("cus_{org_id}"),
                "status": status,
                "items": {"data": [{"price": {"id": price_id}, "quantity": 1}]},
                "current_period_start": Utc::now().timestamp(),
                "current_period_end": (Utc::now() + Duration::days(30)).timestamp(),
                "cancel_at_period_end": false,
                "metadata": {"org_id": org_id.to_string()}
            }
        }
    })
}

/// A `customer.subscription.updated` event.
pub fn subscription_updated_event(
    event_id: &str,
    org_id: OrgId,
    subscription_id: &str,
    price_id: &str,
    status: &str,
) -> serde_json::Value {
    let mut event = subscription_created_event(event_id, org_id, subscription_id, price_id, status);
    event["type"] = json!("customer.subscription.updated");
    event
}

/// A `customer.subscription.deleted` event.
pub fn subscription_deleted_event(event_id: &str, subscription_id: &str) -> serde_json::Value {
    json!({
        "id": event_id,
        "type": "customer.subscription.deleted",
        "created": Utc::now().timestamp(),
        "data": {
            "object": {
                "id": subscription_id,
                "status": "canceled",
                "canceled_at": Utc::now().timestamp(),
                "ended_at": Utc::now().timestamp()
            }
        }
    })
}

/// An `invoice.paid` event.
pub fn invoice_paid_event(
    event_id: &str,
    invoice_id: &str,
    subscription_id: &str,
    amount_cents: i64,
) -> serde_json::Value {
    json!({
        "id": event_id,
        "type": "invoice.paid",
        "created": Utc::now().timestamp(),
        "data": {
            "object": {
                "id": invoice_id,
                "subscription": subscription_id,
                "amount_due": amount_cents,
                "amount_paid": amount_cents,
                "currency": "usd",
                "status": "paid"
            }
        }
    })
}

/// An `invoice.payment_failed` event.
pub fn invoice_failed_event(
    event_id: &str,
    invoice_id: &str,
    subscription_id: &str,
) -> serde_json::Value {
    json!({
        "id": event_id,
        "type": "invoice.payment_failed",
        "created": Utc::now().timestamp(),
        "data": {
            "object": {
                "id": invoice_id,
                "subscription": subscription_id,
                "amount_due": 1900,
                "amount_paid": 0,
                "currency": "usd",
                "status": "open"
            }
        }
    })
}

/// A `payment_method.attached` event.
pub fn payment_method_attached_event(
    event_id: &str,
    payment_method_id: &str,
    customer_id: &str,
) -> serde_json::Value {
    json!({
        "id": event_id,
        "type": "payment_method.attached",
        "created": Utc::now().timestamp(),
        "data": {
            "object": {
                "id": payment_method_id,
                "customer": customer_id,
                "card": {"brand": "visa", "last4": "4242", "exp_month": 12, "exp_year": 2030}
            }
        }
    })
}

/// A `payment_method.detached` event.
pub fn payment_method_detached_event(
    event_id: &str,
    payment_method_id: &str,
) -> serde_json::Value {
    json!({
        "id": event_id,
        "type": "payment_method.detached",
        "created": Utc::now().timestamp(),
        "data": {
            "object": {"id": payment_method_id}
        }
    })
}
