use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use kube::runtime::{watcher, Controller};
use kube::{Api, Client};
use kunto::controller::clock::SystemClock;
use kunto::controller::store::KubeStore;
use kunto::controller::{error_policy, reconcile, Context};
use kunto::server::{create_metrics, run_health_server, wait_for_signal, ReadinessState};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Default port for health and metrics endpoints
const HEALTH_PORT: u16 = 8080;

/// Namespace to watch, or None for cluster-wide (default)
fn get_watch_namespace() -> Option<String> {
    std::env::var("KUNTO_WATCH_NAMESPACE")
        .ok()
        .filter(|ns| !ns.is_empty())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Starting KUNTO workload auto-healing controller");

    // Create readiness state (initially not ready)
    let readiness = ReadinessState::new();

    // Create metrics registry
    let metrics = create_metrics().expect("Failed to create metrics registry");
    info!("Prometheus metrics registry initialized");

    // Create Kubernetes client
    let client = match Client::try_default().await {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Failed to create Kubernetes client");
            return Err(e.into());
        }
    };
    info!("Connected to Kubernetes cluster");

    // Start health/metrics server in background
    let health_readiness = readiness.clone();
    let health_metrics = metrics.clone();
    let health_handle = tokio::spawn(async move {
        if let Err(e) = run_health_server(HEALTH_PORT, health_readiness, health_metrics).await {
            warn!(error = %e, "Health server failed");
        }
    });
    info!(port = HEALTH_PORT, "Health server task spawned");

    // Create API for Deployment resources (cluster-wide or scoped)
    let deployments = match get_watch_namespace() {
        Some(namespace) => {
            info!(namespace = %namespace, "Watching Deployments in a single namespace");
            Api::<Deployment>::namespaced(client.clone(), &namespace)
        }
        None => {
            info!("Watching Deployments cluster-wide");
            Api::<Deployment>::all(client.clone())
        }
    };

    // Create controller context: state accessor and clock are injected,
    // never reached through globals
    let ctx = Arc::new(Context::new(
        KubeStore::new(client.clone()),
        Arc::new(SystemClock),
        Some(metrics.clone()),
    ));

    // Mark as ready - the controller is initialized and about to start
    readiness.set_ready();
    info!("Controller ready, starting reconciliation loop");

    // Registration record: watch Deployments, dispatch each trigger to
    // exactly one reconcile invocation
    // Note: error_policy already logs errors with warn!, so only log success here
    let controller = Controller::new(deployments, watcher::Config::default())
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            if let Ok(o) = res {
                info!("Reconciled: {:?}", o);
            }
        });

    // Run the controller until a termination signal arrives
    tokio::select! {
        _ = controller => {
            info!("Controller stream ended");
        }
        signal = wait_for_signal() => {
            info!(signal = signal, "Initiating graceful shutdown");
            // Drop readiness so Kubernetes stops routing traffic during shutdown
            readiness.set_not_ready();
        }
    }

    health_handle.abort();

    info!("KUNTO controller shut down gracefully");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
