//! Mock cluster for testing
//!
//! Keeps ConfigMaps, pods, pod logs and BundleDeployments in memory, useful
//! for unit tests without requiring a Kubernetes cluster. Pod status is
//! driven by the test through the `set_*` helpers.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    ConfigMap, ContainerState, ContainerStateWaiting, ContainerStatus, Pod, PodStatus,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::Cluster;
use crate::crd::BundleDeployment;
use crate::error::{KubeError, Result};

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

#[derive(Default)]
struct State {
    config_maps: HashMap<Key, ConfigMap>,
    pods: HashMap<Key, Pod>,
    logs: HashMap<Key, std::result::Result<String, String>>,
    deployments: HashMap<String, BundleDeployment>,
}

/// In-memory cluster for testing
#[derive(Clone, Default)]
pub struct MockCluster {
    state: Arc<RwLock<State>>,
    /// Track operation counts for assertions
    operations: Arc<RwLock<OperationCounts>>,
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone)]
pub struct OperationCounts {
    pub config_map_gets: usize,
    pub config_map_creates: usize,
    pub pod_gets: usize,
    pub pod_creates: usize,
    pub pod_deletes: usize,
    pub log_reads: usize,
    pub applies: usize,
}

impl MockCluster {
    /// Create a new empty mock cluster
    pub fn new() -> Self {
        Self::default()
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> OperationCounts {
        self.operations.read().unwrap().clone()
    }

    /// Reset operation counts
    pub fn reset_counts(&self) {
        *self.operations.write().unwrap() = OperationCounts::default();
    }

    /// Store a ConfigMap as if it had been created
    pub fn add_config_map(&self, config_map: ConfigMap) {
        let namespace = config_map.metadata.namespace.clone().unwrap_or_default();
        let name = config_map.metadata.name.clone().unwrap_or_default();
        self.state
            .write()
            .unwrap()
            .config_maps
            .insert(key(&namespace, &name), config_map);
    }

    /// Get a stored ConfigMap
    pub fn config_map(&self, namespace: &str, name: &str) -> Option<ConfigMap> {
        self.state.read().unwrap().config_maps.get(&key(namespace, name)).cloned()
    }

    /// Number of stored ConfigMaps
    pub fn config_map_count(&self) -> usize {
        self.state.read().unwrap().config_maps.len()
    }

    /// Get a stored pod
    pub fn pod(&self, namespace: &str, name: &str) -> Option<Pod> {
        self.state.read().unwrap().pods.get(&key(namespace, name)).cloned()
    }

    /// Number of pods in the cluster
    pub fn pod_count(&self) -> usize {
        self.state.read().unwrap().pods.len()
    }

    /// Store a pod directly, bypassing create semantics
    pub fn insert_pod(&self, pod: Pod) {
        let namespace = pod.metadata.namespace.clone().unwrap_or_default();
        let name = pod.metadata.name.clone().unwrap_or_default();
        self.state.write().unwrap().pods.insert(key(&namespace, &name), pod);
    }

    /// Set the phase of a stored pod
    pub fn set_pod_phase(&self, namespace: &str, name: &str, phase: &str) {
        self.update_status(namespace, name, |status| status.phase = Some(phase.to_string()));
    }

    /// Mark a stored pod as being deleted
    pub fn set_pod_deleting(&self, namespace: &str, name: &str) {
        let mut state = self.state.write().unwrap();
        if let Some(pod) = state.pods.get_mut(&key(namespace, name)) {
            pod.metadata.deletion_timestamp = Some(Time(std::time::SystemTime::now().into()));
        }
    }

    /// Put a container of a stored pod into the waiting state
    pub fn set_container_waiting(
        &self,
        namespace: &str,
        name: &str,
        container: &str,
        reason: &str,
        message: &str,
    ) {
        self.update_status(namespace, name, |status| {
            let statuses = status.container_statuses.get_or_insert_with(Vec::new);
            statuses.retain(|s| s.name != container);
            statuses.push(ContainerStatus {
                name: container.to_string(),
                state: Some(ContainerState {
                    waiting: Some(ContainerStateWaiting {
                        reason: Some(reason.to_string()),
                        message: Some(message.to_string()),
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            });
        });
    }

    /// Record the image a container of a stored pod ran
    pub fn set_container_image_id(&self, namespace: &str, name: &str, container: &str, image_id: &str) {
        self.update_status(namespace, name, |status| {
            let statuses = status.container_statuses.get_or_insert_with(Vec::new);
            statuses.retain(|s| s.name != container);
            statuses.push(ContainerStatus {
                name: container.to_string(),
                image_id: image_id.to_string(),
                ..Default::default()
            });
        });
    }

    /// Set the log output of a pod
    pub fn set_pod_logs(&self, namespace: &str, name: &str, logs: impl Into<String>) {
        self.state
            .write()
            .unwrap()
            .logs
            .insert(key(namespace, name), Ok(logs.into()));
    }

    /// Make reading the logs of a pod fail
    pub fn fail_pod_logs(&self, namespace: &str, name: &str, message: impl Into<String>) {
        self.state
            .write()
            .unwrap()
            .logs
            .insert(key(namespace, name), Err(message.into()));
    }

    /// Get an applied BundleDeployment
    pub fn bundle_deployment(&self, name: &str) -> Option<BundleDeployment> {
        self.state.read().unwrap().deployments.get(name).cloned()
    }

    fn update_status(&self, namespace: &str, name: &str, f: impl FnOnce(&mut PodStatus)) {
        let mut state = self.state.write().unwrap();
        if let Some(pod) = state.pods.get_mut(&key(namespace, name)) {
            f(pod.status.get_or_insert_with(PodStatus::default));
        }
    }

    fn count(&self, f: impl FnOnce(&mut OperationCounts)) {
        f(&mut self.operations.write().unwrap());
    }
}

/// Build an API error the way the API server reports it
pub(crate) fn api_error(code: u16, reason: &str, message: impl Into<String>) -> KubeError {
    KubeError::Api(kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: message.into(),
        reason: reason.to_string(),
        code,
    }))
}

#[async_trait]
impl Cluster for MockCluster {
    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap> {
        self.count(|ops| ops.config_map_gets += 1);

        self.config_map(namespace, name).ok_or_else(|| {
            api_error(404, "NotFound", format!("configmaps \"{}\" not found", name))
        })
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<()> {
        self.count(|ops| ops.config_map_creates += 1);

        let namespace = config_map.metadata.namespace.clone().unwrap_or_default();
        let name = config_map.metadata.name.clone().unwrap_or_default();
        self.state
            .write()
            .unwrap()
            .config_maps
            .entry(key(&namespace, &name))
            .or_insert_with(|| config_map.clone());
        Ok(())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>> {
        self.count(|ops| ops.pod_gets += 1);
        Ok(self.pod(namespace, name))
    }

    async fn create_pod(&self, pod: &Pod) -> Result<Pod> {
        self.count(|ops| ops.pod_creates += 1);

        let namespace = pod.metadata.namespace.clone().unwrap_or_default();
        let name = pod.metadata.name.clone().unwrap_or_default();

        let mut state = self.state.write().unwrap();
        let k = key(&namespace, &name);
        if state.pods.contains_key(&k) {
            return Err(api_error(
                409,
                "AlreadyExists",
                format!("pods \"{}\" already exists", name),
            ));
        }

        let mut created = pod.clone();
        created
            .status
            .get_or_insert_with(PodStatus::default)
            .phase
            .get_or_insert_with(|| "Pending".to_string());
        state.pods.insert(k, created.clone());
        Ok(created)
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
        self.count(|ops| ops.pod_deletes += 1);

        let mut state = self.state.write().unwrap();
        state.pods.remove(&key(namespace, name));
        state.logs.remove(&key(namespace, name));
        Ok(())
    }

    async fn pod_logs(&self, namespace: &str, name: &str) -> Result<Vec<u8>> {
        self.count(|ops| ops.log_reads += 1);

        let state = self.state.read().unwrap();
        if !state.pods.contains_key(&key(namespace, name)) {
            return Err(api_error(404, "NotFound", format!("pods \"{}\" not found", name)));
        }
        match state.logs.get(&key(namespace, name)) {
            Some(Ok(logs)) => Ok(logs.clone().into_bytes()),
            Some(Err(message)) => Err(api_error(500, "InternalError", message.clone())),
            None => Ok(Vec::new()),
        }
    }

    async fn apply_bundle_deployment(&self, deployment: &BundleDeployment) -> Result<BundleDeployment> {
        self.count(|ops| ops.applies += 1);

        let name = deployment.metadata.name.clone().ok_or_else(|| {
            KubeError::InvalidConfig("BundleDeployment is missing metadata.name".to_string())
        })?;
        self.state
            .write()
            .unwrap()
            .deployments
            .insert(name, deployment.clone());
        Ok(deployment.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn pod(name: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("ns".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_pod_conflict() {
        let cluster = MockCluster::new();
        let created = cluster.create_pod(&pod("p")).await.unwrap();
        assert_eq!(created.status.unwrap().phase.as_deref(), Some("Pending"));

        let err = cluster.create_pod(&pod("p")).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(cluster.pod_count(), 1);
        assert_eq!(cluster.operation_counts().pod_creates, 2);
    }

    #[tokio::test]
    async fn test_missing_config_map() {
        let cluster = MockCluster::new();
        let err = cluster.get_config_map("ns", "nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_pod_logs() {
        let cluster = MockCluster::new();
        assert!(cluster.pod_logs("ns", "p").await.unwrap_err().is_not_found());

        cluster.insert_pod(pod("p"));
        cluster.set_pod_logs("ns", "p", "hello");
        assert_eq!(cluster.pod_logs("ns", "p").await.unwrap(), b"hello");

        cluster.fail_pod_logs("ns", "p", "stream closed");
        assert!(cluster.pod_logs("ns", "p").await.is_err());

        cluster.delete_pod("ns", "p").await.unwrap();
        cluster.delete_pod("ns", "p").await.unwrap();
        assert_eq!(cluster.pod_count(), 0);
    }
}
