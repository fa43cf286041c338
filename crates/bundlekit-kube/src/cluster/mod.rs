//! Access to the cluster objects bundle resolution works with
//!
//! Two implementations exist:
//! - **KubeCluster**: talks to the API server through `kube::Client`
//! - **MockCluster**: keeps objects in memory, for tests without a cluster

mod live;
mod mock;

pub use live::{FIELD_MANAGER, KubeCluster};
pub use mock::{MockCluster, OperationCounts};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Pod};

use crate::crd::BundleDeployment;
use crate::error::Result;

/// Cluster operations used by the unpackers and the upload path
///
/// Every method is a single API call, so a dropped future never leaves a
/// half-written object behind. Implementations must be Send + Sync for use
/// across async tasks.
#[async_trait]
pub trait Cluster: Send + Sync {
    /// Read a ConfigMap; a missing object is an error
    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap>;

    /// Create a ConfigMap, treating an existing one with the same name as success
    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<()>;

    /// Read a pod, returning `None` when it does not exist
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>>;

    /// Create a pod
    ///
    /// A pod that already exists yields a conflict error
    /// (see [`KubeError::is_conflict`](crate::KubeError::is_conflict)).
    async fn create_pod(&self, pod: &Pod) -> Result<Pod>;

    /// Delete a pod; deleting a missing pod succeeds
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()>;

    /// Full log output of a pod's main container
    async fn pod_logs(&self, namespace: &str, name: &str) -> Result<Vec<u8>>;

    /// Server-side apply a BundleDeployment
    async fn apply_bundle_deployment(&self, deployment: &BundleDeployment) -> Result<BundleDeployment>;
}
