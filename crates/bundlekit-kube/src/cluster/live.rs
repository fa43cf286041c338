//! Cluster access through the Kubernetes API

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Pod};
use kube::Client;
use kube::api::{Api, DeleteParams, LogParams, Patch, PatchParams, PostParams};

use super::Cluster;
use crate::crd::BundleDeployment;
use crate::error::{KubeError, Result};

/// Field manager used for server-side apply
pub const FIELD_MANAGER: &str = "bundlekit";

/// Cluster backed by a live API server
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    /// Connect using the default kubeconfig or in-cluster configuration
    pub async fn new() -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self { client })
    }

    /// Create with an existing client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Get the underlying Kubernetes client
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn config_maps(&self, namespace: &str) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn namespace_of<'a>(kind: &str, namespace: &'a Option<String>) -> Result<&'a str> {
        namespace
            .as_deref()
            .ok_or_else(|| KubeError::InvalidConfig(format!("{} is missing metadata.namespace", kind)))
    }
}

#[async_trait]
impl Cluster for KubeCluster {
    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap> {
        Ok(self.config_maps(namespace).get(name).await?)
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<()> {
        let namespace = Self::namespace_of("ConfigMap", &config_map.metadata.namespace)?;
        match self
            .config_maps(namespace)
            .create(&PostParams::default(), config_map)
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(resp)) if resp.code == 409 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>> {
        Ok(self.pods(namespace).get_opt(name).await?)
    }

    async fn create_pod(&self, pod: &Pod) -> Result<Pod> {
        let namespace = Self::namespace_of("Pod", &pod.metadata.namespace)?;
        Ok(self.pods(namespace).create(&PostParams::default(), pod).await?)
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
        match self.pods(namespace).delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn pod_logs(&self, namespace: &str, name: &str) -> Result<Vec<u8>> {
        let logs = self.pods(namespace).logs(name, &LogParams::default()).await?;
        Ok(logs.into_bytes())
    }

    async fn apply_bundle_deployment(&self, deployment: &BundleDeployment) -> Result<BundleDeployment> {
        let name = deployment.metadata.name.as_deref().ok_or_else(|| {
            KubeError::InvalidConfig("BundleDeployment is missing metadata.name".to_string())
        })?;
        let api: Api<BundleDeployment> = Api::all(self.client.clone());

        let mut params = PatchParams::apply(FIELD_MANAGER);
        params.force = true;

        Ok(api.patch(name, &params, &Patch::Apply(deployment)).await?)
    }
}
