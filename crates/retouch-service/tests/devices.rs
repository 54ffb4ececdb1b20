//! Device onboarding integration tests.

mod common;

use common::{test_config, TestHarness};
use retouch_service::{CohortConfig, ServiceConfig};
use retouch_store::Store;
use serde_json::json;

#[tokio::test]
async fn first_contact_creates_record() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/api/device_info")
        .json(&json!({
            "deviceId": "phone-1",
            "deviceModel": "iPhone15,2",
            "osVersion": "17.4",
            "locale": "en_US",
            "appVersion": "2.3.0"
        }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "created");
    assert_eq!(body["shouldStart"], true);

    let record = harness.balance("phone-1").unwrap();
    assert!(record.cohort_flag);
    assert_eq!(record.subscription_credits, 2);
    assert_eq!(record.extra_credits, 0);
    assert_eq!(record.device.device_model.as_deref(), Some("iPhone15,2"));
}

#[tokio::test]
async fn second_contact_only_updates_metadata() {
    let harness = TestHarness::new();

    harness
        .server
        .post("/api/device_info")
        .json(&json!({ "deviceId": "phone-1", "appVersion": "2.3.0" }))
        .await
        .assert_status_ok();

    // Change the balance so an accidental re-seed would be visible.
    harness
        .store
        .update_balance(
            &common::device("phone-1"),
            &retouch_core::BalanceUpdate::top_up(5),
            false,
            None,
        )
        .unwrap();

    let response = harness
        .server
        .post("/api/device_info")
        .json(&json!({ "deviceId": "phone-1", "appVersion": "2.4.0" }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "updated");
    assert!(body.get("shouldStart").is_none());

    let record = harness.balance("phone-1").unwrap();
    assert_eq!(record.subscription_credits, 2);
    assert_eq!(record.extra_credits, 5);
    assert_eq!(record.device.app_version.as_deref(), Some("2.4.0"));
}

#[tokio::test]
async fn standard_cohort_starts_with_one_credit() {
    let harness = TestHarness::with_config(ServiceConfig {
        cohort: CohortConfig::Flat(0.0),
        ..test_config()
    });

    let response = harness
        .server
        .post("/api/device_info")
        .json(&json!({ "deviceId": "phone-2" }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["shouldStart"], false);
    assert_eq!(harness.balance("phone-2").unwrap().subscription_credits, 1);
}

#[tokio::test]
async fn missing_device_id_is_rejected() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/api/device_info")
        .json(&json!({ "deviceModel": "Pixel 8" }))
        .await;

    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn empty_device_id_is_rejected() {
    let harness = TestHarness::new();

    harness
        .server
        .post("/api/device_info")
        .json(&json!({ "deviceId": "" }))
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn malformed_json_is_rejected() {
    let harness = TestHarness::new();

    harness
        .server
        .post("/api/device_info")
        .text("{not json")
        .await
        .assert_status_bad_request();
}
