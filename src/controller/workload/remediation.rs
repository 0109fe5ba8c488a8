use crate::controller::store::{StoreError, WorkloadSnapshot, WorkloadStore};
use tracing::{debug, error, info};

use super::reconcile::ReconcileError;

/// Restart a degraded workload by deleting its pods
///
/// Resolves the workload's pods through its label selector and deletes every
/// one of them; the ReplicaSet controller recreates the correct number. The
/// pass deletes all currently selected pods rather than just the deficit:
/// readiness reporting does not say which replicas are the broken ones.
///
/// Deletes are attempted in listing order. A pod that is already gone is
/// skipped; any other delete failure aborts the pass and surfaces. Deleted
/// pods stay deleted; the next reconciliation re-lists and finishes the job.
///
/// Returns the number of pods actually deleted.
pub async fn restart_pods(
    snapshot: &WorkloadSnapshot,
    store: &dyn WorkloadStore,
) -> Result<usize, ReconcileError> {
    let pods = store
        .list_pods(&snapshot.namespace, &snapshot.selector)
        .await?;

    if pods.is_empty() {
        debug!(
            deployment = ?snapshot.name,
            namespace = ?snapshot.namespace,
            "Selector matched no pods, nothing to restart"
        );
        return Ok(0);
    }

    let mut deleted = 0;
    for pod in &pods {
        info!(pod = ?pod.name, namespace = ?pod.namespace, "Deleting pod");

        match store.delete_pod(pod).await {
            Ok(()) => deleted += 1,
            Err(StoreError::NotFound) => {
                // Already gone - an earlier pass or the workload controller beat us
                debug!(pod = ?pod.name, "Pod already deleted, skipping");
            }
            Err(e) => {
                error!(error = ?e, pod = ?pod.name, "Failed to delete pod");
                return Err(e.into());
            }
        }
    }

    Ok(deleted)
}
