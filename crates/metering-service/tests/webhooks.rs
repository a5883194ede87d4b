//! Webhook reconciliation integration tests.

mod common;

use axum::http::StatusCode;
use common::{
    invoice_failed_event, invoice_paid_event, payment_method_attached_event,
    payment_method_detached_event, subscription_created_event, subscription_deleted_event,
    subscription_updated_event, TestHarness,
};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use metering_core::{OrgId, SubscriptionStatus};
use metering_store::Store;

#[tokio::test]
async fn subscription_created_builds_the_local_record() {
    let harness = TestHarness::new();
    let org = OrgId::generate();

    let event =
        subscription_created_event("evt_1", org, "sub_abc", "price_creator_monthly", "active");
    let response = harness.deliver(&event).await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["received"], true);
    assert_eq!(body["disposition"], "applied");

    let record = harness.store.current_subscription(org).await.unwrap().unwrap();
    assert_eq!(record.plan_id, "creator");
    assert_eq!(record.status, SubscriptionStatus::Active);
    assert_eq!(record.external_subscription_id.as_deref(), Some("sub_abc"));
    assert!(record.external_customer_id.is_some());
}

#[tokio::test]
async fn duplicate_delivery_applies_once_and_notifies_once() {
    let notify = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/notifications/subscription"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&notify)
        .await;
    let uri = notify.uri();
    let harness = TestHarness::with_config(move |config| {
        config.notify_url = Some(uri);
    });
    let org = OrgId::generate();

    let event =
        subscription_created_event("evt_dup", org, "sub_dup", "price_creator_monthly", "active");

    let first = harness.deliver(&event).await;
    first.assert_status_ok();
    let first_body: serde_json::Value = first.json();
    assert_eq!(first_body["disposition"], "applied");

    let second = harness.deliver(&event).await;
    second.assert_status_ok();
    let second_body: serde_json::Value = second.json();
    assert_eq!(second_body["disposition"], "duplicate");

    // Exactly one dedup row, one notification, one subscription.
    assert_eq!(harness.store.processed_event_count().await, 1);
    notify.verify().await;
    let record = harness.store.current_subscription(org).await.unwrap().unwrap();
    assert_eq!(record.plan_id, "creator");
}

#[tokio::test]
async fn update_for_unknown_subscription_fails_loudly_then_retries_cleanly() {
    let harness = TestHarness::new();
    let org = OrgId::generate();

    // `updated` arrives before `created`: a reportable anomaly, not a
    // silent drop.
    let updated =
        subscription_updated_event("evt_upd", org, "sub_ooo", "price_studio_monthly", "active");
    let response = harness.deliver(&updated).await;
    assert_eq!(response.status_code(), StatusCode::CONFLICT);

    // The failed handler released its claim.
    assert_eq!(harness.store.processed_event_count().await, 0);

    // After `created` lands, the same delivery succeeds.
    let created =
        subscription_created_event("evt_cre", org, "sub_ooo", "price_creator_monthly", "active");
    harness.deliver(&created).await.assert_status_ok();

    let retried = harness.deliver(&updated).await;
    retried.assert_status_ok();
    let record = harness.store.current_subscription(org).await.unwrap().unwrap();
    assert_eq!(record.plan_id, "studio");
}

#[tokio::test]
async fn invoice_paid_before_subscription_created_is_tolerated() {
    let harness = TestHarness::new();

    let event = invoice_paid_event("evt_inv", "in_1", "sub_never_seen", 1900);
    let response = harness.deliver(&event).await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["disposition"], "applied");
}

#[tokio::test]
async fn payment_failure_then_payment_recovery() {
    let harness = TestHarness::new();
    let org = OrgId::generate();
    harness
        .deliver(&subscription_created_event(
            "evt_1",
            org,
            "sub_pay",
            "price_creator_monthly",
            "active",
        ))
        .await
        .assert_status_ok();

    // Payment fails: grace period.
    harness
        .deliver(&invoice_failed_event("evt_2", "in_fail", "sub_pay"))
        .await
        .assert_status_ok();
    let record = harness.store.current_subscription(org).await.unwrap().unwrap();
    assert_eq!(record.status, SubscriptionStatus::PastDue);

    // The retried payment succeeds: active again, invoice mirrored.
    harness
        .deliver(&invoice_paid_event("evt_3", "in_ok", "sub_pay", 1900))
        .await
        .assert_status_ok();
    let record = harness.store.current_subscription(org).await.unwrap().unwrap();
    assert_eq!(record.status, SubscriptionStatus::Active);

    let invoices = harness.store.invoices_for_org(org, 10).await.unwrap();
    assert_eq!(invoices.len(), 1);
    assert_eq!(invoices[0].amount_cents, 1900);
    assert_eq!(invoices[0].status, "paid");
}

#[tokio::test]
async fn deleted_subscription_becomes_terminal_history() {
    let harness = TestHarness::new();
    let org = OrgId::generate();
    harness
        .deliver(&subscription_created_event(
            "evt_1",
            org,
            "sub_del",
            "price_creator_monthly",
            "active",
        ))
        .await
        .assert_status_ok();

    harness
        .deliver(&subscription_deleted_event("evt_2", "sub_del"))
        .await
        .assert_status_ok();

    // No qualifying subscription remains.
    assert!(harness.store.current_subscription(org).await.unwrap().is_none());

    let response = harness
        .server
        .get(&format!("/v1/orgs/{org}/subscription"))
        .add_header("x-api-key", &harness.api_key)
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn created_upserts_over_a_provisioned_trial() {
    let harness = TestHarness::new();
    let org = OrgId::generate();

    harness
        .server
        .post("/v1/subscriptions/trial")
        .add_header("x-api-key", &harness.api_key)
        .json(&json!({"org_id": org.to_string()}))
        .await
        .assert_status_ok();
    let trial = harness.store.current_subscription(org).await.unwrap().unwrap();
    assert!(trial.external_subscription_id.is_none());

    // Checkout completes: the created event must update the trial row, not
    // add a second qualifying one.
    harness
        .deliver(&subscription_created_event(
            "evt_1",
            org,
            "sub_checkout",
            "price_studio_monthly",
            "active",
        ))
        .await
        .assert_status_ok();

    let record = harness.store.current_subscription(org).await.unwrap().unwrap();
    assert_eq!(record.id, trial.id);
    assert_eq!(record.plan_id, "studio");
    assert_eq!(
        record.external_subscription_id.as_deref(),
        Some("sub_checkout")
    );
}

#[tokio::test]
async fn payment_methods_attach_and_detach() {
    let harness = TestHarness::new();
    let org = OrgId::generate();
    harness
        .deliver(&subscription_created_event(
            "evt_1",
            org,
            "sub_pm",
            "price_creator_monthly",
            "active",
        ))
        .await
        .assert_status_ok();
    let customer = harness
        .store
        .current_subscription(org)
        .await
        .unwrap()
        .unwrap()
        .external_customer_id
        .unwrap();

    harness
        .deliver(&payment_method_attached_event("evt_2", "pm_1", &customer))
        .await
        .assert_status_ok();
    let methods = harness.store.payment_methods_for_org(org).await.unwrap();
    assert_eq!(methods.len(), 1);
    assert_eq!(methods[0].brand.as_deref(), Some("visa"));
    assert_eq!(methods[0].last4.as_deref(), Some("4242"));

    harness
        .deliver(&payment_method_detached_event("evt_3", "pm_1"))
        .await
        .assert_status_ok();
    assert!(harness
        .store
        .payment_methods_for_org(org)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn unknown_event_type_is_acknowledged_without_a_dedup_row() {
    let harness = TestHarness::new();

    let event = json!({
        "id": "evt_refund",
        "type": "charge.refunded",
        "created": 1_750_000_000,
        "data": {"object": {"id": "ch_1"}}
    });
    let response = harness.deliver(&event).await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["disposition"], "ignored");
    assert_eq!(harness.store.processed_event_count().await, 0);
}

#[tokio::test]
async fn tampered_signature_is_rejected() {
    let harness = TestHarness::new();
    let org = OrgId::generate();

    let event =
        subscription_created_event("evt_sig", org, "sub_sig", "price_creator_monthly", "active");
    let response = harness
        .server
        .post("/webhooks/billing")
        .add_header("x-billing-signature", "deadbeef")
        .text(event.to_string())
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    assert!(harness.store.current_subscription(org).await.unwrap().is_none());
}

#[tokio::test]
async fn unknown_price_id_surfaces_an_error_for_retry() {
    let harness = TestHarness::new();
    let org = OrgId::generate();

    let event =
        subscription_created_event("evt_px", org, "sub_px", "price_not_in_catalog", "active");
    let response = harness.deliver(&event).await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

    // The claim was released, so the processor's retry will be processed.
    assert_eq!(harness.store.processed_event_count().await, 0);
}

// ============================================================================
// Overage lifecycle
// ============================================================================

#[tokio::test]
async fn overage_is_computed_idempotently_and_reported_once() {
    let harness = TestHarness::new();
    let org = OrgId::generate();
    harness
        .seed_subscription(org, "creator", SubscriptionStatus::Active)
        .await;

    // Creator bandwidth allocation is 1024 GB; serve 1536 GB (150%).
    let gb: i64 = 1024 * 1024 * 1024;
    harness
        .server
        .post(&format!("/v1/orgs/{org}/usage/bandwidth"))
        .add_header("x-api-key", &harness.api_key)
        .json(&json!({"bytes": 1536 * gb}))
        .await
        .assert_status_ok();

    // 512 GB over at 5 cents/GB.
    let expected_cents = 512 * 5;
    for _ in 0..2 {
        let response = harness
            .server
            .post(&format!("/v1/orgs/{org}/overage/calculate"))
            .add_header("x-api-key", &harness.api_key)
            .await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["overage_cents"], expected_cents);
    }

    let first = harness
        .server
        .post(&format!("/v1/orgs/{org}/overage/report"))
        .add_header("x-api-key", &harness.api_key)
        .await;
    first.assert_status_ok();
    let first_body: serde_json::Value = first.json();
    assert_eq!(first_body["overage_cents"], expected_cents);
    assert_eq!(first_body["newly_reported"], true);

    // A second sync must not re-report the same period.
    let second = harness
        .server
        .post(&format!("/v1/orgs/{org}/overage/report"))
        .add_header("x-api-key", &harness.api_key)
        .await;
    let second_body: serde_json::Value = second.json();
    assert_eq!(second_body["newly_reported"], false);
}
