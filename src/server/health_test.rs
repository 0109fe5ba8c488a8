//! Tests for the health and metrics endpoints

use super::*;
use crate::server::metrics::create_metrics;
use std::time::Duration;

/// Wait for the server to accept connections, with retry and backoff
async fn wait_for_server(port: u16, max_retries: u32) -> reqwest::Client {
    let client = reqwest::Client::new();
    let mut delay = Duration::from_millis(10);

    for attempt in 1..=max_retries {
        match client
            .get(format!("http://127.0.0.1:{}/healthz", port))
            .timeout(Duration::from_millis(100))
            .send()
            .await
        {
            Ok(_) => return client,
            Err(_) if attempt < max_retries => {
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, Duration::from_millis(200));
            }
            Err(e) => panic!("Server not ready after {} attempts: {}", max_retries, e),
        }
    }
    client
}

#[tokio::test]
async fn test_healthz_returns_200() {
    let readiness = ReadinessState::new();
    let metrics = create_metrics().unwrap();
    let port = 18080; // High port to avoid collisions in test environments

    let server_readiness = readiness.clone();
    let server_handle =
        tokio::spawn(async move { run_health_server(port, server_readiness, metrics).await });

    let client = wait_for_server(port, 10).await;

    let response = client
        .get(format!("http://127.0.0.1:{}/healthz", port))
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .expect("Failed to connect to health server");

    assert_eq!(response.status(), 200, "Liveness probe should return 200");

    server_handle.abort();
}

#[tokio::test]
async fn test_readyz_tracks_readiness_state() {
    let readiness = ReadinessState::new();
    let metrics = create_metrics().unwrap();
    let port = 18081;

    let server_readiness = readiness.clone();
    let server_handle =
        tokio::spawn(async move { run_health_server(port, server_readiness, metrics).await });

    let client = wait_for_server(port, 10).await;

    // Not ready by default
    let response = client
        .get(format!("http://127.0.0.1:{}/readyz", port))
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .expect("Failed to connect to health server");
    assert_eq!(
        response.status(),
        503,
        "Readiness probe should return 503 before set_ready"
    );

    readiness.set_ready();

    let response = client
        .get(format!("http://127.0.0.1:{}/readyz", port))
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .expect("Failed to connect to health server");
    assert_eq!(
        response.status(),
        200,
        "Readiness probe should return 200 once ready"
    );

    server_handle.abort();
}

#[tokio::test]
async fn test_metrics_endpoint_serves_registered_series() {
    let readiness = ReadinessState::new();
    let metrics = create_metrics().unwrap();
    let port = 18082;

    metrics.record_reconciliation_success(0.01);

    let server_metrics = metrics.clone();
    let server_readiness = readiness.clone();
    let server_handle = tokio::spawn(async move {
        run_health_server(port, server_readiness, server_metrics).await
    });

    let client = wait_for_server(port, 10).await;

    let response = client
        .get(format!("http://127.0.0.1:{}/metrics", port))
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .expect("Failed to connect to health server");

    assert_eq!(response.status(), 200);
    let body = response.text().await.expect("Failed to read metrics body");
    assert!(body.contains("kunto_reconciliations_total"));

    server_handle.abort();
}

#[test]
fn test_readiness_state_transitions() {
    let state = ReadinessState::new();

    assert!(!state.is_ready());

    state.set_ready();
    assert!(state.is_ready());

    // Clones share the underlying flag
    let cloned = state.clone();
    state.set_not_ready();
    assert!(!cloned.is_ready());
}
