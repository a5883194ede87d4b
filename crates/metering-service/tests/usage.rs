//! Usage tracking integration tests.

mod common;

use axum::http::StatusCode;
use common::TestHarness;
use serde_json::json;

use metering_core::{OrgId, SubscriptionStatus, BYTES_PER_GB};

/// Free plan bandwidth allocation, matching the standard catalog.
const FREE_BANDWIDTH: i64 = 20 * BYTES_PER_GB;

async fn seeded_org(harness: &TestHarness, plan_id: &str) -> OrgId {
    let org = OrgId::generate();
    harness
        .seed_subscription(org, plan_id, SubscriptionStatus::Active)
        .await;
    org
}

#[tokio::test]
async fn track_storage_accumulates() {
    let harness = TestHarness::new();
    let org = seeded_org(&harness, "creator").await;

    for _ in 0..3 {
        harness
            .server
            .post(&format!("/v1/orgs/{org}/usage/storage"))
            .add_header("x-api-key", &harness.api_key)
            .json(&json!({"bytes": 1000}))
            .await
            .assert_status_ok();
    }

    let response = harness
        .server
        .get(&format!("/v1/orgs/{org}/usage"))
        .add_header("x-api-key", &harness.api_key)
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["storage_used"], 3000);
}

#[tokio::test]
async fn read_only_usage_does_not_persist_a_row() {
    let harness = TestHarness::new();
    let org = seeded_org(&harness, "creator").await;

    let response = harness
        .server
        .get(&format!("/v1/orgs/{org}/usage"))
        .add_header("x-api-key", &harness.api_key)
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["storage_used"], 0);
    assert_eq!(body["videos_uploaded"], 0);

    // The read must not have created a row.
    let history = harness
        .server
        .get(&format!("/v1/orgs/{org}/usage/history"))
        .add_header("x-api-key", &harness.api_key)
        .await;
    let rows: Vec<serde_json::Value> = history.json();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn release_clamps_at_zero() {
    let harness = TestHarness::new();
    let org = seeded_org(&harness, "creator").await;

    harness
        .server
        .post(&format!("/v1/orgs/{org}/usage/videos"))
        .add_header("x-api-key", &harness.api_key)
        .json(&json!({"count": 5}))
        .await
        .assert_status_ok();

    let response = harness
        .server
        .delete(&format!("/v1/orgs/{org}/usage/videos"))
        .add_header("x-api-key", &harness.api_key)
        .json(&json!({"count": 10}))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["videos_uploaded"], 0);
}

#[tokio::test]
async fn sequential_ai_increments_accumulate() {
    let harness = TestHarness::new();
    let org = seeded_org(&harness, "creator").await;

    for _ in 0..2 {
        harness
            .server
            .post(&format!("/v1/orgs/{org}/usage/ai"))
            .add_header("x-api-key", &harness.api_key)
            .json(&json!({"count": 1}))
            .await
            .assert_status_ok();
    }

    let response = harness
        .server
        .get(&format!("/v1/orgs/{org}/usage"))
        .add_header("x-api-key", &harness.api_key)
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["ai_requests"], 2);
}

#[tokio::test]
async fn tracking_without_subscription_is_rejected() {
    let harness = TestHarness::new();
    let org = OrgId::generate();

    let response = harness
        .server
        .post(&format!("/v1/orgs/{org}/usage/storage"))
        .add_header("x-api-key", &harness.api_key)
        .json(&json!({"bytes": 1000}))
        .await;
    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "no_subscription");
}

#[tokio::test]
async fn zero_byte_track_is_bad_request() {
    let harness = TestHarness::new();
    let org = seeded_org(&harness, "creator").await;

    let response = harness
        .server
        .post(&format!("/v1/orgs/{org}/usage/storage"))
        .add_header("x-api-key", &harness.api_key)
        .json(&json!({"bytes": 0}))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_api_key_is_unauthorized() {
    let harness = TestHarness::new();
    let org = OrgId::generate();

    let response = harness
        .server
        .get(&format!("/v1/orgs/{org}/usage"))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Bandwidth three-tier policy (free plan: 20 GB allocation)
// ============================================================================

async fn track_bandwidth(
    harness: &TestHarness,
    org: OrgId,
    bytes: i64,
) -> axum_test::TestResponse {
    harness
        .server
        .post(&format!("/v1/orgs/{org}/usage/bandwidth"))
        .add_header("x-api-key", &harness.api_key)
        .json(&json!({"bytes": bytes}))
        .await
}

#[tokio::test]
async fn bandwidth_below_allocation_is_silent() {
    let harness = TestHarness::new();
    let org = seeded_org(&harness, "free").await;

    let response = track_bandwidth(&harness, org, FREE_BANDWIDTH * 99 / 100).await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["bandwidth_overage"], 0);
}

#[tokio::test]
async fn bandwidth_at_exactly_allocation_is_silent() {
    let harness = TestHarness::new();
    let org = seeded_org(&harness, "free").await;

    let response = track_bandwidth(&harness, org, FREE_BANDWIDTH).await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["bandwidth_used"], FREE_BANDWIDTH);
    assert_eq!(body["bandwidth_overage"], 0);
}

#[tokio::test]
async fn bandwidth_at_150_percent_increments_with_overage() {
    let harness = TestHarness::new();
    let org = seeded_org(&harness, "free").await;

    let response = track_bandwidth(&harness, org, FREE_BANDWIDTH * 3 / 2).await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["bandwidth_used"], FREE_BANDWIDTH * 3 / 2);
    assert_eq!(body["bandwidth_overage"], FREE_BANDWIDTH / 2);
}

#[tokio::test]
async fn bandwidth_at_double_allocation_is_rejected() {
    let harness = TestHarness::new();
    let org = seeded_org(&harness, "free").await;

    let response = track_bandwidth(&harness, org, FREE_BANDWIDTH * 2).await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "limit_exceeded");
    assert_eq!(body["error"]["details"]["resource"], "bandwidth");
}

#[tokio::test]
async fn bandwidth_crossing_the_hard_stop_is_rejected_without_incrementing() {
    let harness = TestHarness::new();
    let org = seeded_org(&harness, "free").await;

    // 199% of the allocation: allowed (warning tier).
    let before = FREE_BANDWIDTH * 199 / 100;
    track_bandwidth(&harness, org, before).await.assert_status_ok();

    // A further increment crossing 200% must be refused.
    let crossing = FREE_BANDWIDTH * 2 - before + 1;
    let response = track_bandwidth(&harness, org, crossing).await;
    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);

    // The refused increment must not have landed.
    let usage = harness
        .server
        .get(&format!("/v1/orgs/{org}/usage"))
        .add_header("x-api-key", &harness.api_key)
        .await;
    let body: serde_json::Value = usage.json();
    assert_eq!(body["bandwidth_used"], before);
}

#[tokio::test]
async fn unlimited_bandwidth_never_warns_or_stops() {
    let harness = TestHarness::new();
    let org = seeded_org(&harness, "enterprise").await;

    let response = track_bandwidth(&harness, org, 100 * FREE_BANDWIDTH).await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["bandwidth_overage"], 0);
}

#[tokio::test]
async fn usage_history_is_most_recent_first() {
    let harness = TestHarness::new();
    let org = seeded_org(&harness, "creator").await;

    harness
        .server
        .post(&format!("/v1/orgs/{org}/usage/storage"))
        .add_header("x-api-key", &harness.api_key)
        .json(&json!({"bytes": 42}))
        .await
        .assert_status_ok();

    let response = harness
        .server
        .get(&format!("/v1/orgs/{org}/usage/history?months=3"))
        .add_header("x-api-key", &harness.api_key)
        .await;
    response.assert_status_ok();
    let rows: Vec<serde_json::Value> = response.json();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["storage_used"], 42);
}
