//! End-to-end shadow synchronization scenarios over the mock channel.

mod helpers;

use helpers::TestHarness;
use serde_json::json;
use tether_protocol::topics;
use tether_shadow::{ShadowRequestKind, ShadowResponseKind};

#[tokio::test]
async fn e2e_get_accepted_replaces_server_state_and_syncs() {
    let harness = TestHarness::new().await;

    harness.shadow.perform_get_async().await.unwrap();
    let token = harness.last_request_token();

    let invoked = harness
        .deliver(
            &topics::get_accepted(helpers::THING),
            &json!({
                "state": {
                    "reported": {"temperature": 21, "mode": "eco"},
                    "desired": {"temperature": 21, "mode": "eco"},
                },
                "version": 12,
                "timestamp": 1_700_000_000,
                "clientToken": token,
            }),
        )
        .await;
    assert_eq!(invoked, 1);

    assert_eq!(
        harness.shadow.server_reported().await,
        json!({"temperature": 21, "mode": "eco"})
    );
    assert_eq!(harness.shadow.current_version().await, 12);
    assert!(harness.shadow.is_in_sync().await);

    let recorded = harness.recorded();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].0, ShadowRequestKind::Get);
    assert_eq!(recorded[0].1, ShadowResponseKind::Accepted);
}

#[tokio::test]
async fn e2e_get_rejected_leaves_state_untouched() {
    let harness = TestHarness::new().await;

    harness.shadow.perform_get_async().await.unwrap();
    let token = harness.last_request_token();

    harness
        .deliver(
            &topics::get_rejected(helpers::THING),
            &json!({
                "code": 404,
                "message": "No shadow exists with name: 'thermostat-01'",
                "clientToken": token,
            }),
        )
        .await;

    assert_eq!(harness.shadow.server_reported().await, json!({}));
    assert_eq!(harness.shadow.server_desired().await, json!({}));
    assert_eq!(harness.shadow.current_version().await, 0);

    let recorded = harness.recorded();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].0, ShadowRequestKind::Get);
    assert_eq!(recorded[0].1, ShadowResponseKind::Rejected);
    assert_eq!(recorded[0].2["code"], 404);
}

#[tokio::test]
async fn e2e_update_round_trip_resolves_sync() {
    let harness = TestHarness::new().await;

    // Local desired change puts the shadow out of sync.
    harness
        .shadow
        .update_device_shadow(&json!({
            "state": {
                "reported": {"firmware": "0.1.0"},
                "desired": {"firmware": "0.1.0"},
            }
        }))
        .await
        .unwrap();
    assert!(!harness.shadow.is_in_sync().await);

    harness.shadow.perform_update_async().await.unwrap();
    let token = harness.last_request_token();

    // The broker accepts and echoes the applied state.
    harness
        .deliver(
            &topics::update_accepted(helpers::THING),
            &json!({
                "state": {
                    "reported": {"firmware": "0.1.0"},
                    "desired": {"firmware": "0.1.0"},
                },
                "version": 1,
                "clientToken": token,
            }),
        )
        .await;

    assert!(harness.shadow.is_in_sync().await);
    assert_eq!(harness.shadow.current_version().await, 1);
    assert_eq!(
        harness.shadow.server_reported().await,
        json!({"firmware": "0.1.0"})
    );
}

#[tokio::test]
async fn e2e_delta_push_applies_without_a_token() {
    let harness = TestHarness::new().await;

    harness
        .deliver(
            &topics::update_delta(helpers::THING),
            &json!({
                "state": {"firmware": "0.2.0"},
                "version": 3,
            }),
        )
        .await;

    assert_eq!(
        harness.shadow.server_desired().await,
        json!({"firmware": "0.2.0"})
    );
    let recorded = harness.recorded();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].0, ShadowRequestKind::Delta);
    assert_eq!(recorded[0].1, ShadowResponseKind::Delta);
}

#[tokio::test]
async fn e2e_stray_response_with_foreign_token_is_dropped() {
    let harness = TestHarness::new().await;

    harness.shadow.perform_get_async().await.unwrap();

    harness
        .deliver(
            &topics::get_accepted(helpers::THING),
            &json!({
                "state": {"reported": {"hijacked": true}, "desired": {}},
                "version": 40,
                "clientToken": "another-process-7-deadbeef",
            }),
        )
        .await;

    assert_eq!(harness.shadow.server_reported().await, json!({}));
    assert!(harness.recorded().is_empty());
}

#[tokio::test]
async fn e2e_delete_accepted_clears_server_copies() {
    let harness = TestHarness::new().await;

    // Seed server state.
    harness.shadow.perform_get_async().await.unwrap();
    let token = harness.last_request_token();
    harness
        .deliver(
            &topics::get_accepted(helpers::THING),
            &json!({
                "state": {"reported": {"x": 1}, "desired": {"x": 1}},
                "version": 5,
                "clientToken": token,
            }),
        )
        .await;

    harness.shadow.perform_delete_async().await.unwrap();
    let token = harness.last_request_token();
    harness
        .deliver(
            &topics::delete_accepted(helpers::THING),
            &json!({"version": 5, "clientToken": token}),
        )
        .await;

    assert_eq!(harness.shadow.server_reported().await, json!({}));
    assert_eq!(harness.shadow.current_version().await, 0);

    let kinds: Vec<_> = harness.recorded().iter().map(|r| (r.0, r.1)).collect();
    assert_eq!(
        kinds,
        vec![
            (ShadowRequestKind::Get, ShadowResponseKind::Accepted),
            (ShadowRequestKind::Delete, ShadowResponseKind::Accepted),
        ]
    );
}
