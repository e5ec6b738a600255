//! Integration tests for broker container provisioning.
//!
//! These exercise the runtime layer end-to-end against a public image.
//! Tests are skipped if Docker/Podman is not available or
//! SKIP_CONTAINER_TESTS=1.

use broker_harness::runtime::descriptor::GATEWAY_PORT;
use broker_harness::runtime::{
    BrokerContainer, BrokerDescriptor, RuntimeClient, RuntimeError, WaitCondition,
};
use serial_test::serial;
use std::time::Duration;
use test_tag::tag;

/// Check if container tests should run.
fn should_run_container_tests() -> bool {
    if let Ok(value) = std::env::var("SKIP_CONTAINER_TESTS") {
        if value == "1" || value.eq_ignore_ascii_case("true") {
            return false;
        }
    }

    std::process::Command::new("docker")
        .arg("info")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
        || std::process::Command::new("podman")
            .arg("info")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn start_blocks_until_marker_appears() {
    if !should_run_container_tests() {
        eprintln!("Skipping container tests (Docker/Podman not available or SKIP_CONTAINER_TESTS=1)");
        return;
    }

    let client = RuntimeClient::connect().await.expect("failed to connect");

    let descriptor = BrokerDescriptor::builder()
        .image("alpine:latest")
        .cmd(vec!["sh", "-c", "echo broker gateway listening; sleep 600"])
        .wait(
            WaitCondition::new(
                "gateway listening",
                Duration::from_millis(100),
                Duration::from_secs(10),
            )
            .unwrap(),
        )
        .build()
        .unwrap();

    let container = BrokerContainer::start(&client, descriptor)
        .await
        .expect("container never became ready");

    // The marker is in the logs the handle exposes.
    let logs = container.logs().await.unwrap();
    assert!(logs.contains("gateway listening"));

    container.stop().await.unwrap();
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn ready_timeout_tears_container_down_and_leaves_binds_unused() {
    if !should_run_container_tests() {
        eprintln!("Skipping container tests");
        return;
    }

    let client = RuntimeClient::connect().await.expect("failed to connect");
    let data_dir = tempfile::tempdir().unwrap();

    let descriptor = BrokerDescriptor::builder()
        .image("alpine:latest")
        .cmd(vec!["sleep", "600"])
        .bind(data_dir.path(), "/data")
        .wait(
            WaitCondition::new(
                "never-logged-marker",
                Duration::from_millis(100),
                Duration::from_secs(1),
            )
            .unwrap(),
        )
        .build()
        .unwrap();

    let err = BrokerContainer::start(&client, descriptor)
        .await
        .expect_err("start should have timed out");

    match err {
        RuntimeError::ReadyTimeout { marker, waited } => {
            assert_eq!(marker, "never-logged-marker");
            assert!(waited >= Duration::from_secs(1));
        }
        other => panic!("expected ReadyTimeout, got {other:?}"),
    }

    // The bind-mounted directory was never written to.
    assert_eq!(std::fs::read_dir(data_dir.path()).unwrap().count(), 0);
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn stop_is_idempotent() {
    if !should_run_container_tests() {
        eprintln!("Skipping container tests");
        return;
    }

    let client = RuntimeClient::connect().await.expect("failed to connect");

    let descriptor = BrokerDescriptor::builder()
        .image("alpine:latest")
        .cmd(vec!["sh", "-c", "echo up; sleep 600"])
        .wait(WaitCondition::new("up", Duration::from_millis(100), Duration::from_secs(10)).unwrap())
        .build()
        .unwrap();

    let container = BrokerContainer::start(&client, descriptor).await.unwrap();
    let id = container.id().to_string();

    container.stop().await.unwrap();
    container.stop().await.unwrap();
    container.stop().await.unwrap();

    assert!(!client.container_exists(&id).await.unwrap());
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn stop_before_start_completes_releases_the_container() {
    if !should_run_container_tests() {
        eprintln!("Skipping container tests");
        return;
    }

    let client = RuntimeClient::connect().await.expect("failed to connect");

    // Created but never started: stop() must still release it cleanly.
    let descriptor = BrokerDescriptor::builder()
        .image("alpine:latest")
        .cmd(vec!["sleep", "600"])
        .auto_start(false)
        .build()
        .unwrap();

    let container = BrokerContainer::start(&client, descriptor).await.unwrap();
    let id = container.id().to_string();

    assert!(matches!(
        container.mapped_port(GATEWAY_PORT),
        Err(RuntimeError::PortNotMapped(_))
    ));

    container.stop().await.unwrap();
    container.stop().await.unwrap();
    assert!(!client.container_exists(&id).await.unwrap());
}

#[tokio::test]
#[serial]
#[tag(integration, container)]
async fn deferred_start_runs_the_wait() {
    if !should_run_container_tests() {
        eprintln!("Skipping container tests");
        return;
    }

    let client = RuntimeClient::connect().await.expect("failed to connect");

    let descriptor = BrokerDescriptor::builder()
        .image("alpine:latest")
        .cmd(vec!["sh", "-c", "echo deferred ready; sleep 600"])
        .wait(
            WaitCondition::new(
                "deferred ready",
                Duration::from_millis(100),
                Duration::from_secs(10),
            )
            .unwrap(),
        )
        .auto_start(false)
        .build()
        .unwrap();

    let mut container = BrokerContainer::start(&client, descriptor).await.unwrap();
    container.start_running().await.unwrap();
    container.start_running().await.unwrap();

    let logs = container.logs().await.unwrap();
    assert!(logs.contains("deferred ready"));

    container.stop().await.unwrap();
}
