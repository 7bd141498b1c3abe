//! Integration tests for the coordination store client against a real Redis.
//!
//! These tests require Docker (via testcontainers) and fail at container
//! startup in environments without it.
//!
//! Run with: `cargo test --test redis_integration`

use std::time::Duration;

use testcontainers::core::IntoContainerPort;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};

use tpm_gate::coordination::{CoordinationClient, ScriptOutcome};
use tpm_gate::engine::Dimension;

async fn start_redis() -> (CoordinationClient, ContainerAsync<GenericImage>) {
    let container = GenericImage::new("redis", "7-alpine")
        .with_exposed_port(6379_u16.tcp())
        .start()
        .await
        .expect("failed to start redis container");

    let host = container.get_host().await.expect("get host");
    let port = container
        .get_host_port_ipv4(6379)
        .await
        .expect("get port");

    let url = format!("redis://{}:{}", host, port);
    let client = CoordinationClient::new(
        &url,
        8,
        Duration::from_millis(500),
        Duration::from_millis(500),
    )
    .expect("build coordination client");

    for _ in 0..30 {
        if client.ping().await.is_ok() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    client.ping().await.expect("redis never became ready");

    (client, container)
}

#[tokio::test]
async fn test_admit_then_deny_on_rpm_exhaustion() {
    let (client, _container) = start_redis().await;
    let now = 1_000_000.0;

    // limit_req = 2: first two admits succeed, the third is denied.
    let outcome1 = client
        .admit_batch("scenario-rpm", 1_000_000, 10, 1_000_000, 10, 2, now, 60, "evt-1")
        .await
        .unwrap();
    assert_eq!(outcome1, ScriptOutcome::Admit);

    let outcome2 = client
        .admit_batch("scenario-rpm", 1_000_000, 10, 1_000_000, 10, 2, now, 60, "evt-2")
        .await
        .unwrap();
    assert_eq!(outcome2, ScriptOutcome::Admit);

    let outcome3 = client
        .admit_batch("scenario-rpm", 1_000_000, 10, 1_000_000, 10, 2, now, 60, "evt-3")
        .await
        .unwrap();
    match outcome3 {
        ScriptOutcome::Deny { dimension, retry_at } => {
            assert_eq!(dimension, Dimension::Rpm);
            assert!(retry_at > now);
        }
        other => panic!("expected RPM denial, got {:?}", other),
    }
}

#[tokio::test]
async fn test_admit_denies_on_input_tpm_before_output_or_rpm() {
    let (client, _container) = start_redis().await;
    let now = 2_000_000.0;

    // Input cost alone exceeds the input limit; output/rpm limits are
    // generous, so the input check must be the one that fires.
    let outcome = client
        .admit_batch("scenario-input", 50, 100, 1_000_000, 10, 1_000_000, now, 60, "evt-1")
        .await
        .unwrap();

    match outcome {
        ScriptOutcome::Deny { dimension, .. } => assert_eq!(dimension, Dimension::InputTpm),
        other => panic!("expected INPUT_TPM denial, got {:?}", other),
    }
}

#[tokio::test]
async fn test_window_slides_admission_back_in_after_expiry() {
    let (client, _container) = start_redis().await;
    let key = "scenario-window";

    // Saturate the request dimension at t=0.
    let t0 = 10_000.0;
    let window = 1u64;
    client
        .admit_batch(key, 1_000_000, 1, 1_000_000, 1, 1, t0, window, "evt-1")
        .await
        .unwrap();

    let denied = client
        .admit_batch(key, 1_000_000, 1, 1_000_000, 1, 1, t0, window, "evt-2")
        .await
        .unwrap();
    assert!(matches!(denied, ScriptOutcome::Deny { .. }));

    // Past the window boundary the same key admits again, without any
    // explicit eviction call — the script evicts inline.
    let admitted = client
        .admit_batch(
            key,
            1_000_000,
            1,
            1_000_000,
            1,
            1,
            t0 + window as f64 + 1.0,
            window,
            "evt-3",
        )
        .await
        .unwrap();
    assert_eq!(admitted, ScriptOutcome::Admit);
}

#[tokio::test]
async fn test_reconcile_shrinks_committed_output_cost() {
    let (client, _container) = start_redis().await;
    let key = "scenario-reconcile";
    let now = 3_000_000.0;

    client
        .admit_batch(key, 1_000_000, 10, 1_000_000, 100, 1_000_000, now, 60, "evt-1")
        .await
        .unwrap();

    let before = client.usage(key, now, 60).await.unwrap();
    assert_eq!(before.output_tokens_used, 100);

    client.reconcile(key, "evt-1", 100, 40).await.unwrap();

    let after = client.usage(key, now, 60).await.unwrap();
    assert_eq!(after.output_tokens_used, 40);
    assert_eq!(after.input_tokens_used, 10);
}

#[tokio::test]
async fn test_reconcile_unknown_event_is_a_no_op() {
    let (client, _container) = start_redis().await;

    // No admit ever happened for this key/event; reconcile must not error,
    // and must not conjure a counter entry out of nothing.
    client
        .reconcile("scenario-ghost", "never-admitted", 0, 999)
        .await
        .unwrap();

    let usage = client.usage("scenario-ghost", 3_100_000.0, 60).await.unwrap();
    assert_eq!(usage.output_tokens_used, 0);
}

#[tokio::test]
async fn test_usage_is_read_only_and_does_not_evict() {
    let (client, _container) = start_redis().await;
    let key = "scenario-usage-readonly";
    let now = 4_000_000.0;

    client
        .admit_batch(key, 1_000_000, 10, 1_000_000, 20, 1_000_000, now, 60, "evt-1")
        .await
        .unwrap();

    // Calling usage() repeatedly, including past the window, must never
    // itself admit, deny, or mutate counters — only ADMIT/RECONCILE do.
    let snapshot_a = client.usage(key, now, 60).await.unwrap();
    let snapshot_b = client.usage(key, now, 60).await.unwrap();
    assert_eq!(snapshot_a.input_tokens_used, snapshot_b.input_tokens_used);
    assert_eq!(snapshot_a.requests_used, 1);
}

#[tokio::test]
async fn test_cross_client_visibility_is_immediate() {
    // Simulates two nodes sharing one coordination store: a second client
    // against the same Redis container must see the first client's commits
    // without any out-of-band synchronization.
    let (client_a, container) = start_redis().await;
    let host = container.get_host().await.expect("get host");
    let port = container
        .get_host_port_ipv4(6379)
        .await
        .expect("get port");
    let client_b = CoordinationClient::new(
        &format!("redis://{}:{}", host, port),
        8,
        Duration::from_millis(500),
        Duration::from_millis(500),
    )
    .unwrap();

    let key = "scenario-cross-node";
    let now = 5_000_000.0;

    client_a
        .admit_batch(key, 1_000_000, 10, 1_000_000, 10, 1, now, 60, "evt-from-a")
        .await
        .unwrap();

    let outcome_from_b = client_b
        .admit_batch(key, 1_000_000, 10, 1_000_000, 10, 1, now, 60, "evt-from-b")
        .await
        .unwrap();

    match outcome_from_b {
        ScriptOutcome::Deny { dimension, .. } => assert_eq!(dimension, Dimension::Rpm),
        other => panic!(
            "expected client_b to see client_a's commit and deny on RPM, got {:?}",
            other
        ),
    }
}
