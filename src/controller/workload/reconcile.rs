use crate::controller::clock::Clock;
use crate::controller::store::{StoreError, WorkloadStore};
use k8s_openapi::api::apps::v1::Deployment;
use kube::runtime::controller::Action;
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::health::{evaluate, HealthVerdict};
use super::remediation::restart_pods;

/// Fixed polling cadence between reconciliations of one workload
///
/// Deliberately constant: no backoff, no jitter. Every workload gets
/// re-checked a minute after its last pass regardless of outcome.
pub const REQUEUE_INTERVAL: Duration = Duration::from_secs(60);

/// Delay before the dispatcher retries a failed reconciliation
pub const ERROR_REQUEUE_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Deployment missing namespace")]
    MissingNamespace,

    #[error("state store error: {0}")]
    Store(#[from] StoreError),
}

/// Dependencies of the reconcile loop
///
/// Everything is constructor-injected: the state accessor and clock are
/// trait objects so tests can substitute in-memory fakes, and nothing is
/// read from ambient globals.
pub struct Context {
    /// Read/write access to cluster state
    pub store: Arc<dyn WorkloadStore>,
    pub clock: Arc<dyn Clock>,
    /// Optional controller metrics for Prometheus
    /// When Some, records reconciliation counts, durations and restarts
    pub metrics: Option<crate::server::SharedMetrics>,
}

impl Context {
    pub fn new(
        store: impl WorkloadStore + 'static,
        clock: Arc<dyn Clock>,
        metrics: Option<crate::server::SharedMetrics>,
    ) -> Self {
        Context {
            store: Arc::new(store),
            clock,
            metrics,
        }
    }

    /// Context over an injected store with a mock clock and no metrics
    #[cfg(test)]
    pub fn new_mock(store: Arc<dyn WorkloadStore>) -> Self {
        Context {
            store,
            clock: Arc::new(crate::controller::clock::MockClock::new(chrono::Utc::now())),
            metrics: None,
        }
    }
}

/// Reconcile one Deployment
///
/// One pass of read-evaluate-correct for a single identity:
/// 1. Re-fetch a fresh snapshot through the state accessor
/// 2. Judge health (ready vs desired replicas)
/// 3. If degraded, restart the workload's pods
/// 4. Requeue after a fixed interval
///
/// A Deployment deleted between trigger and fetch resolves terminally with
/// no error and no retry. Every other failure surfaces to the dispatcher,
/// whose error policy governs retry.
///
/// The pass holds no state of its own, so overlapping invocations for the
/// same identity are tolerated: each re-derives its verdict from a fresh
/// snapshot, and pod deletion is idempotent.
pub async fn reconcile(
    deployment: Arc<Deployment>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let start_time = std::time::Instant::now();

    let namespace = deployment
        .namespace()
        .ok_or(ReconcileError::MissingNamespace)?;
    let name = deployment.name_any();

    info!(
        deployment = ?name,
        namespace = ?namespace,
        "Reconciling Deployment"
    );

    // Judge health against a fresh read, never the watch-cached object
    let snapshot = match ctx.store.get_workload(&namespace, &name).await {
        Ok(snapshot) => snapshot,
        Err(StoreError::NotFound) => {
            // Deleted concurrently - nothing left to heal, nothing to retry
            info!(
                deployment = ?name,
                namespace = ?namespace,
                "Deployment no longer exists, dropping from queue"
            );
            return Ok(Action::await_change());
        }
        Err(e) => return Err(e.into()),
    };

    match evaluate(&snapshot) {
        HealthVerdict::Degraded { deficit } => {
            warn!(
                deployment = ?name,
                namespace = ?namespace,
                ready = snapshot.ready_replicas,
                desired = snapshot.desired_replicas,
                deficit = deficit,
                "Deployment is unhealthy, restarting pods"
            );

            let deleted = restart_pods(&snapshot, ctx.store.as_ref()).await?;

            info!(
                deployment = ?name,
                pods_deleted = deleted,
                "Pods restarted, ReplicaSet controller will recreate them"
            );

            if let Some(ref metrics) = ctx.metrics {
                metrics.record_pods_restarted(deleted);
                metrics.set_last_remediation(&namespace, &name, ctx.clock.now().timestamp());
            }
        }
        HealthVerdict::Healthy => {
            debug!(
                deployment = ?name,
                ready = snapshot.ready_replicas,
                desired = snapshot.desired_replicas,
                "Deployment is healthy"
            );
        }
    }

    if let Some(ref metrics) = ctx.metrics {
        metrics.record_reconciliation_success(start_time.elapsed().as_secs_f64());
    }

    Ok(Action::requeue(REQUEUE_INTERVAL))
}

/// Error policy for the dispatcher
///
/// Reconciliation errors are expected (transient API failures, mid-flight
/// cancellation), so log at `warn` and let the requeue retry from a fresh
/// snapshot.
pub fn error_policy(
    deployment: Arc<Deployment>,
    error: &ReconcileError,
    ctx: Arc<Context>,
) -> Action {
    warn!(
        deployment = ?deployment.name_any(),
        "Reconcile error (will retry): {:?}", error
    );

    if let Some(ref metrics) = ctx.metrics {
        // Duration unknown for errors (didn't complete), use 0
        metrics.record_reconciliation_error(0.0);
    }

    Action::requeue(ERROR_REQUEUE_INTERVAL)
}
