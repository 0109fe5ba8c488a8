//! State accessor boundary between the reconcile loop and the cluster
//!
//! The reconcile loop never talks to the Kubernetes API directly; it goes
//! through the `WorkloadStore` trait. Production wires in `KubeStore`, unit
//! tests substitute an in-memory fake. Keeping the boundary narrow (get one
//! workload, list pods by selector, delete one pod) is what makes the loop
//! testable without a cluster.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, ListParams};
use std::collections::BTreeMap;
use thiserror::Error;

/// Point-in-time view of a Deployment's health-relevant state
///
/// Built fresh for every reconciliation attempt and discarded at its end.
/// Never cache a snapshot across attempts: the watch event that triggered
/// the attempt may be arbitrarily stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadSnapshot {
    pub namespace: String,
    pub name: String,
    /// Replicas the owner wants running (`spec.replicas`, unset reads as 0)
    pub desired_replicas: i32,
    /// Replicas currently passing readiness (`status.readyReplicas`)
    pub ready_replicas: i32,
    /// Equality label selector for the workload's pods
    pub selector: BTreeMap<String, String>,
}

/// Identity of a pod resolved through a workload's selector
///
/// Enumerated fresh per remediation pass, never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodRef {
    pub namespace: String,
    pub name: String,
    /// Labels that matched the selector at list time
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested object does not exist (or no longer exists).
    /// Distinguished so callers can treat concurrent deletion as benign.
    #[error("object not found")]
    NotFound,

    #[error("Kubernetes API error: {0}")]
    Kube(#[source] kube::Error),
}

/// Read/write access to cluster state, as consumed by the reconcile loop
///
/// Implementations must be safe to share across concurrent reconciliations.
#[async_trait]
pub trait WorkloadStore: Send + Sync {
    /// Fetch a fresh snapshot of one workload by identity
    async fn get_workload(&self, namespace: &str, name: &str)
        -> Result<WorkloadSnapshot, StoreError>;

    /// List pods in `namespace` whose labels satisfy every selector entry
    async fn list_pods(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<PodRef>, StoreError>;

    /// Delete one pod. Returns `StoreError::NotFound` if it is already gone.
    async fn delete_pod(&self, pod: &PodRef) -> Result<(), StoreError>;
}

/// Production store backed by the Kubernetes API
///
/// Holds the client as a named field; all access goes through the trait
/// methods rather than promoted client methods.
#[derive(Clone)]
pub struct KubeStore {
    client: kube::Client,
}

impl KubeStore {
    pub fn new(client: kube::Client) -> Self {
        KubeStore { client }
    }
}

#[async_trait]
impl WorkloadStore for KubeStore {
    async fn get_workload(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<WorkloadSnapshot, StoreError> {
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let deployment = deployments.get(name).await.map_err(map_kube_error)?;
        Ok(snapshot_from_deployment(namespace, name, &deployment))
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<PodRef>, StoreError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(&selector_to_label_string(selector));

        let pod_list = pods.list(&params).await.map_err(map_kube_error)?;

        Ok(pod_list
            .items
            .into_iter()
            .filter_map(|pod| {
                let name = pod.metadata.name?;
                Some(PodRef {
                    namespace: pod.metadata.namespace.unwrap_or_else(|| namespace.to_string()),
                    name,
                    labels: pod.metadata.labels.unwrap_or_default(),
                })
            })
            .collect())
    }

    async fn delete_pod(&self, pod: &PodRef) -> Result<(), StoreError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &pod.namespace);
        pods.delete(&pod.name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(map_kube_error)
    }
}

/// Map kube errors into the store taxonomy: 404 becomes `NotFound`,
/// everything else is surfaced as-is.
fn map_kube_error(error: kube::Error) -> StoreError {
    match error {
        kube::Error::Api(ref response) if response.code == 404 => StoreError::NotFound,
        other => StoreError::Kube(other),
    }
}

/// Project a Deployment onto the health-relevant snapshot
///
/// Unset `spec.replicas` reads as 0 (no remediation for workloads whose
/// scale is not yet defaulted), unset status as 0 ready.
pub(crate) fn snapshot_from_deployment(
    namespace: &str,
    name: &str,
    deployment: &Deployment,
) -> WorkloadSnapshot {
    let desired_replicas = deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .unwrap_or(0);

    let ready_replicas = deployment
        .status
        .as_ref()
        .and_then(|status| status.ready_replicas)
        .unwrap_or(0);

    let selector = deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.selector.match_labels.clone())
        .unwrap_or_default();

    WorkloadSnapshot {
        namespace: namespace.to_string(),
        name: name.to_string(),
        desired_replicas,
        ready_replicas,
        selector,
    }
}

/// Render an equality selector in `key=value,key=value` form
///
/// BTreeMap iteration keeps the output deterministic.
fn selector_to_label_string(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::{DeploymentSpec, DeploymentStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_snapshot_from_deployment_reads_spec_and_status() {
        let deployment = Deployment {
            spec: Some(DeploymentSpec {
                replicas: Some(3),
                selector: LabelSelector {
                    match_labels: Some(labels(&[("app", "web")])),
                    ..Default::default()
                },
                ..Default::default()
            }),
            status: Some(DeploymentStatus {
                ready_replicas: Some(1),
                ..Default::default()
            }),
            ..Default::default()
        };

        let snapshot = snapshot_from_deployment("default", "web", &deployment);

        assert_eq!(snapshot.namespace, "default");
        assert_eq!(snapshot.name, "web");
        assert_eq!(snapshot.desired_replicas, 3);
        assert_eq!(snapshot.ready_replicas, 1);
        assert_eq!(snapshot.selector, labels(&[("app", "web")]));
    }

    #[test]
    fn test_snapshot_from_deployment_defaults_unset_fields() {
        // A Deployment with no spec or status at all (e.g. mid-creation)
        let deployment = Deployment::default();

        let snapshot = snapshot_from_deployment("default", "empty", &deployment);

        assert_eq!(snapshot.desired_replicas, 0);
        assert_eq!(snapshot.ready_replicas, 0);
        assert!(snapshot.selector.is_empty());
    }

    #[test]
    fn test_selector_to_label_string_is_deterministic() {
        let selector = labels(&[("tier", "backend"), ("app", "web")]);

        // BTreeMap orders keys, so "app" sorts before "tier"
        assert_eq!(selector_to_label_string(&selector), "app=web,tier=backend");
        assert_eq!(selector_to_label_string(&BTreeMap::new()), "");
    }

    #[tokio::test]
    async fn test_memory_store_selector_matching() {
        let store = memory::MemoryStore::new();
        store.insert_pod(PodRef {
            namespace: "default".to_string(),
            name: "web-1".to_string(),
            labels: labels(&[("app", "web"), ("pod-template-hash", "abc123")]),
        });
        store.insert_pod(PodRef {
            namespace: "default".to_string(),
            name: "other-1".to_string(),
            labels: labels(&[("app", "other")]),
        });

        let matched = store
            .list_pods("default", &labels(&[("app", "web")]))
            .await
            .unwrap();

        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].name, "web-1");
    }

    #[tokio::test]
    async fn test_memory_store_delete_is_not_found_when_absent() {
        let store = memory::MemoryStore::new();
        let pod = PodRef {
            namespace: "default".to_string(),
            name: "gone".to_string(),
            labels: BTreeMap::new(),
        };

        assert!(matches!(
            store.delete_pod(&pod).await,
            Err(StoreError::NotFound)
        ));
    }
}
