//! Limit enforcement and access classification integration tests.

mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::TestHarness;
use serde_json::json;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use metering_core::{OrgId, SubscriptionStatus};
use metering_store::Store;

/// A harness whose video store reports a fixed count for every org.
async fn harness_with_video_count(count: i64) -> (TestHarness, MockServer) {
    let media = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": count})))
        .mount(&media)
        .await;
    let uri = media.uri();
    let harness = TestHarness::with_config(move |config| {
        config.media_url = Some(uri);
    });
    (harness, media)
}

#[tokio::test]
async fn videos_at_limit_are_denied_with_structured_payload() {
    // Free plan: 10 videos. The org already hosts 10.
    let (harness, _media) = harness_with_video_count(10).await;
    let org = OrgId::generate();
    harness
        .seed_subscription(org, "free", SubscriptionStatus::Active)
        .await;

    let response = harness
        .server
        .post(&format!("/v1/orgs/{org}/limits/enforce"))
        .add_header("x-api-key", &harness.api_key)
        .json(&json!({"resource": "videos", "amount": 1}))
        .await;

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "limit_exceeded");
    assert_eq!(body["error"]["details"]["resource"], "videos");
    assert_eq!(body["error"]["details"]["current_usage"], 10);
    assert_eq!(body["error"]["details"]["limit"], 10);
    // The message is specific and actionable, not a generic failure.
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("videos limit"));
}

#[tokio::test]
async fn unlimited_videos_always_allow_with_zero_percentage() {
    // Studio plan: unlimited videos, even with 10,000 hosted.
    let (harness, _media) = harness_with_video_count(10_000).await;
    let org = OrgId::generate();
    harness
        .seed_subscription(org, "studio", SubscriptionStatus::Active)
        .await;

    let response = harness
        .server
        .post(&format!("/v1/orgs/{org}/limits/check"))
        .add_header("x-api-key", &harness.api_key)
        .json(&json!({"resource": "videos", "amount": 1}))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["allowed"], true);
    assert_eq!(body["limit"], -1);
    assert_eq!(body["percentage"], 0);
}

#[tokio::test]
async fn members_are_counted_live_from_the_directory() {
    let directory = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 2})))
        .mount(&directory)
        .await;
    let uri = directory.uri();
    let harness = TestHarness::with_config(move |config| {
        config.directory_url = Some(uri);
    });

    // Free plan: 2 members.
    let org = OrgId::generate();
    harness
        .seed_subscription(org, "free", SubscriptionStatus::Active)
        .await;

    let response = harness
        .server
        .post(&format!("/v1/orgs/{org}/limits/enforce"))
        .add_header("x-api-key", &harness.api_key)
        .json(&json!({"resource": "members", "amount": 1}))
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["details"]["limit"], 2);
}

#[tokio::test]
async fn storage_checks_read_the_ledger() {
    let harness = TestHarness::new();
    let org = OrgId::generate();
    harness
        .seed_subscription(org, "free", SubscriptionStatus::Active)
        .await;

    // Fill the free plan's 5 GB allocation.
    harness
        .server
        .post(&format!("/v1/orgs/{org}/usage/storage"))
        .add_header("x-api-key", &harness.api_key)
        .json(&json!({"bytes": 5 * 1024 * 1024 * 1024i64}))
        .await
        .assert_status_ok();

    let response = harness
        .server
        .post(&format!("/v1/orgs/{org}/limits/check"))
        .add_header("x-api-key", &harness.api_key)
        .json(&json!({"resource": "storage", "amount": 1}))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["allowed"], false);
    assert_eq!(body["remaining"], 0);
    assert_eq!(body["percentage"], 100);
}

#[tokio::test]
async fn percentage_clamps_at_100_even_beyond_the_limit() {
    let harness = TestHarness::new();
    let org = OrgId::generate();
    harness
        .seed_subscription(org, "free", SubscriptionStatus::Active)
        .await;

    // 150% of the free bandwidth allocation (warning tier increments it).
    harness
        .server
        .post(&format!("/v1/orgs/{org}/usage/bandwidth"))
        .add_header("x-api-key", &harness.api_key)
        .json(&json!({"bytes": 30 * 1024 * 1024 * 1024i64}))
        .await
        .assert_status_ok();

    let response = harness
        .server
        .post(&format!("/v1/orgs/{org}/limits/check"))
        .add_header("x-api-key", &harness.api_key)
        .json(&json!({"resource": "bandwidth", "amount": 1}))
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["percentage"], 100);
    assert_eq!(body["allowed"], false);
}

#[tokio::test]
async fn enforce_without_subscription_is_no_subscription() {
    let harness = TestHarness::new();
    let org = OrgId::generate();

    let response = harness
        .server
        .post(&format!("/v1/orgs/{org}/limits/enforce"))
        .add_header("x-api-key", &harness.api_key)
        .json(&json!({"resource": "storage", "amount": 1}))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "no_subscription");
}

// ============================================================================
// Access classification
// ============================================================================

async fn access_level(harness: &TestHarness, org: OrgId) -> serde_json::Value {
    let response = harness
        .server
        .get(&format!("/v1/orgs/{org}/access"))
        .add_header("x-api-key", &harness.api_key)
        .await;
    response.assert_status_ok();
    response.json()
}

#[tokio::test]
async fn active_subscription_has_full_access() {
    let harness = TestHarness::new();
    let org = OrgId::generate();
    harness
        .seed_subscription(org, "creator", SubscriptionStatus::Active)
        .await;

    let decision = access_level(&harness, org).await;
    assert_eq!(decision["level"], "full");
    assert_eq!(decision["read_only"], false);
}

#[tokio::test]
async fn past_due_is_grace_and_still_writes() {
    let harness = TestHarness::new();
    let org = OrgId::generate();
    harness
        .seed_subscription(org, "creator", SubscriptionStatus::PastDue)
        .await;

    let decision = access_level(&harness, org).await;
    assert_eq!(decision["level"], "grace");
    assert_eq!(decision["grace_period"], true);

    harness
        .server
        .get(&format!("/v1/orgs/{org}/access/write"))
        .add_header("x-api-key", &harness.api_key)
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn unpaid_is_read_only_and_writes_are_forbidden() {
    let harness = TestHarness::new();
    let org = OrgId::generate();
    harness
        .seed_subscription(org, "creator", SubscriptionStatus::Unpaid)
        .await;

    let decision = access_level(&harness, org).await;
    assert_eq!(decision["level"], "read_only");
    assert_eq!(decision["read_only"], true);

    let response = harness
        .server
        .get(&format!("/v1/orgs/{org}/access/write"))
        .add_header("x-api-key", &harness.api_key)
        .await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "forbidden");
}

#[tokio::test]
async fn canceled_subscription_has_no_access() {
    let harness = TestHarness::new();
    let org = OrgId::generate();
    harness
        .seed_subscription(org, "creator", SubscriptionStatus::Canceled)
        .await;

    // Canceled rows are history; the classifier sees no subscription.
    let decision = access_level(&harness, org).await;
    assert_eq!(decision["level"], "none");

    let response = harness
        .server
        .get(&format!("/v1/orgs/{org}/access/write"))
        .add_header("x-api-key", &harness.api_key)
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "no_subscription");
}

#[tokio::test]
async fn expired_trial_classifies_as_no_access() {
    let harness = TestHarness::new();
    let org = OrgId::generate();
    let mut record = harness
        .seed_subscription(org, "creator", SubscriptionStatus::Trialing)
        .await;
    // The processor has not flipped the status yet, but the date elapsed.
    record.trial_end = Some(Utc::now() - Duration::seconds(1));
    harness.store.update_subscription(&record).await.unwrap();

    let decision = access_level(&harness, org).await;
    assert_eq!(decision["level"], "none");
    assert_eq!(decision["reason"], "trial expired");
}

#[tokio::test]
async fn plan_listing_and_subscription_view() {
    let harness = TestHarness::new();
    let org = OrgId::generate();
    harness
        .seed_subscription(org, "studio", SubscriptionStatus::Active)
        .await;

    let plans = harness
        .server
        .get("/v1/plans")
        .add_header("x-api-key", &harness.api_key)
        .await;
    plans.assert_status_ok();
    let listing: Vec<serde_json::Value> = plans.json();
    assert_eq!(listing.len(), 4);
    assert!(listing.iter().any(|p| p["id"] == "studio"));

    let response = harness
        .server
        .get(&format!("/v1/orgs/{org}/subscription"))
        .add_header("x-api-key", &harness.api_key)
        .await;
    response.assert_status_ok();
    let view: serde_json::Value = response.json();
    assert_eq!(view["subscription"]["plan_id"], "studio");
    assert_eq!(view["access"]["level"], "full");
}

#[tokio::test]
async fn live_trial_classifies_as_full() {
    let harness = TestHarness::new();
    let org = OrgId::generate();
    let mut record = harness
        .seed_subscription(org, "creator", SubscriptionStatus::Trialing)
        .await;
    record.trial_end = Some(Utc::now() + Duration::hours(1));
    harness.store.update_subscription(&record).await.unwrap();

    let decision = access_level(&harness, org).await;
    assert_eq!(decision["level"], "full");
}
