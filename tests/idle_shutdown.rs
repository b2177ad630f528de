//! Idle-shutdown lifecycle scenarios.

mod common;

use common::*;
use std::time::Duration;
use tokio::net::UnixStream;

#[tokio::test]
async fn proxy_shuts_down_after_idle_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let upstream = dir.path().join("engine.sock");
    let downstream = dir.path().join("proxy.sock");

    let _engine = start_mock_engine(upstream.clone(), canned("200 OK", "{}")).await;
    let harness = start_proxy(test_config(&upstream, &downstream, 1), wsl_local_converter()).await;

    tokio::time::timeout(Duration::from_secs(5), harness.server)
        .await
        .expect("server should stop after the idle period")
        .unwrap();

    // An owned socket is unlinked on the way out.
    assert!(!downstream.exists());
}

#[tokio::test]
async fn arriving_connection_cancels_pending_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let upstream = dir.path().join("engine.sock");
    let downstream = dir.path().join("proxy.sock");

    let _engine = start_mock_engine(upstream.clone(), canned("200 OK", "{}")).await;
    let harness = start_proxy(test_config(&upstream, &downstream, 2), wsl_local_converter()).await;

    // Connect mid-countdown and hold the connection open past the point
    // where the timer would have fired.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let held = UnixStream::connect(&harness.downstream).await.unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(harness.tracker.active_count(), 1);
    assert!(!harness.server.is_finished());

    // Once the connection closes, the countdown starts over.
    drop(held);
    tokio::time::timeout(Duration::from_secs(6), harness.server)
        .await
        .expect("server should stop once idle again")
        .unwrap();
}

#[tokio::test]
async fn negative_timeout_keeps_the_proxy_running() {
    let dir = tempfile::tempdir().unwrap();
    let upstream = dir.path().join("engine.sock");
    let downstream = dir.path().join("proxy.sock");

    let _engine = start_mock_engine(upstream.clone(), canned("200 OK", "{}")).await;
    let harness = start_proxy(test_config(&upstream, &downstream, -1), wsl_local_converter()).await;

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!harness.server.is_finished());

    harness.shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(2), harness.server)
        .await
        .expect("trigger should stop the server")
        .unwrap();
}

#[tokio::test]
async fn shutdown_waits_for_inflight_connections() {
    let dir = tempfile::tempdir().unwrap();
    let upstream = dir.path().join("engine.sock");
    let downstream = dir.path().join("proxy.sock");

    let _engine = start_mock_engine(upstream.clone(), canned("200 OK", "{}")).await;
    let harness = start_proxy(test_config(&upstream, &downstream, -1), wsl_local_converter()).await;

    let held = UnixStream::connect(&harness.downstream).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(harness.tracker.active_count(), 1);

    harness.shutdown.trigger();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(
        !harness.server.is_finished(),
        "server must drain the held connection before exiting"
    );

    drop(held);
    tokio::time::timeout(Duration::from_secs(2), harness.server)
        .await
        .expect("server should exit once drained")
        .unwrap();
}
