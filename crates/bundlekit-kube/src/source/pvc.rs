//! Bundle content read from a PersistentVolumeClaim by an unpack pod

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    PersistentVolumeClaimVolumeSource, Pod, PodSpec, Volume, VolumeMount,
};
use std::sync::Arc;

use super::worker::{UnpackWorker, WorkerTemplate, single_container};
use super::{UnpackResult, Unpacker, expect_source_type};
use crate::cluster::Cluster;
use crate::config::UnpackConfig;
use crate::crd::{Bundle, BundleSource, SourceType};
use crate::error::{KubeError, Result};

const CONTAINER_NAME: &str = "bundle";
const VOLUME_NAME: &str = "bundle";
const BUNDLE_DIR: &str = "/bundle";

/// Mounts the claim read-only into an unpack pod running the unpack image
pub struct PersistentVolumeClaimUnpacker {
    worker: UnpackWorker,
    template: ClaimTemplate,
}

struct ClaimTemplate {
    unpack_image: String,
}

impl PersistentVolumeClaimUnpacker {
    pub fn new(cluster: Arc<dyn Cluster>, config: &UnpackConfig) -> Self {
        Self {
            worker: UnpackWorker::new(cluster, &config.provisioner_name, &config.pod_namespace),
            template: ClaimTemplate {
                unpack_image: config.unpack_image.clone(),
            },
        }
    }
}

#[async_trait]
impl Unpacker for PersistentVolumeClaimUnpacker {
    async fn unpack(&self, bundle: &Bundle) -> Result<UnpackResult> {
        expect_source_type(bundle, SourceType::PersistentVolumeClaim)?;
        if bundle.spec.source.persistent_volume_claim.is_none() {
            return Err(KubeError::SourceConfigUnset(SourceType::PersistentVolumeClaim));
        }
        self.worker.unpack(bundle, &self.template).await
    }
}

impl WorkerTemplate for ClaimTemplate {
    fn apply(&self, bundle: &Bundle, spec: &mut PodSpec) -> Result<()> {
        let claim = bundle
            .spec
            .source
            .persistent_volume_claim
            .as_ref()
            .ok_or(KubeError::SourceConfigUnset(SourceType::PersistentVolumeClaim))?;

        let container = single_container(spec);
        container.name = CONTAINER_NAME.to_string();
        container.image = Some(self.unpack_image.clone());
        container.image_pull_policy = Some("IfNotPresent".to_string());
        container.command = Some(vec![
            "/extract".to_string(),
            "--bundle-dir".to_string(),
            BUNDLE_DIR.to_string(),
        ]);
        container.volume_mounts = Some(vec![VolumeMount {
            name: VOLUME_NAME.to_string(),
            mount_path: BUNDLE_DIR.to_string(),
            read_only: Some(true),
            ..Default::default()
        }]);

        spec.volumes = Some(vec![Volume {
            name: VOLUME_NAME.to_string(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: claim.name.clone(),
                read_only: Some(true),
            }),
            ..Default::default()
        }]);
        Ok(())
    }

    /// A claim has no content digest, so the declared source is reported
    fn resolved_source(&self, bundle: &Bundle, _pod: &Pod) -> Result<BundleSource> {
        Ok(bundle.spec.source.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MockCluster;
    use crate::source::UnpackState;
    use crate::source::testutil::{bundle, config};
    use bundlekit_core::{BundleFs, envelope};

    const POD: &str = "core-bundlekit-io-plain-unpack-bundle-b";
    const NS: &str = "bundlekit-system";

    fn unpacker(cluster: &MockCluster) -> PersistentVolumeClaimUnpacker {
        PersistentVolumeClaimUnpacker::new(Arc::new(cluster.clone()), &config())
    }

    #[tokio::test]
    async fn test_pod_mounts_claim_read_only() {
        let cluster = MockCluster::new();
        let result = unpacker(&cluster)
            .unpack(&bundle("b", BundleSource::persistent_volume_claim("my-claim")))
            .await
            .unwrap();
        assert_eq!(result.state, UnpackState::Pending);

        let spec = cluster.pod(NS, POD).unwrap().spec.unwrap();
        let container = &spec.containers[0];
        assert_eq!(container.image.as_deref(), Some("ghcr.io/bundlekit/extract:test"));
        assert_eq!(
            container.command.as_deref(),
            Some(&["/extract".to_string(), "--bundle-dir".to_string(), "/bundle".to_string()][..])
        );
        let mount = &container.volume_mounts.as_ref().unwrap()[0];
        assert_eq!(mount.mount_path, "/bundle");
        assert_eq!(mount.read_only, Some(true));

        let volume = &spec.volumes.unwrap()[0];
        let claim = volume.persistent_volume_claim.as_ref().unwrap();
        assert_eq!(claim.claim_name, "my-claim");
        assert_eq!(claim.read_only, Some(true));
    }

    #[tokio::test]
    async fn test_unpacked_reports_declared_source() {
        let cluster = MockCluster::new();
        let declared = BundleSource::persistent_volume_claim("my-claim");
        let unpacker = unpacker(&cluster);
        unpacker.unpack(&bundle("b", declared.clone())).await.unwrap();

        let mut fs = BundleFs::new();
        fs.insert("a.yaml", "kind: X").unwrap();
        cluster.set_pod_phase(NS, POD, "Succeeded");
        cluster.set_pod_logs(NS, POD, envelope::encode(&fs).unwrap());

        let result = unpacker.unpack(&bundle("b", declared.clone())).await.unwrap();
        assert_eq!(result.state, UnpackState::Unpacked);
        assert_eq!(result.content, Some(fs));
        assert_eq!(result.resolved_source, Some(declared));
    }

    #[tokio::test]
    async fn test_missing_claim_block() {
        let cluster = MockCluster::new();
        let mut source = BundleSource::persistent_volume_claim("x");
        source.persistent_volume_claim = None;

        let err = unpacker(&cluster).unpack(&bundle("b", source)).await.unwrap_err();
        assert!(matches!(
            err,
            KubeError::SourceConfigUnset(SourceType::PersistentVolumeClaim)
        ));
        assert_eq!(cluster.pod_count(), 0);
    }

    #[tokio::test]
    async fn test_wrong_source_type() {
        let cluster = MockCluster::new();
        let err = unpacker(&cluster)
            .unpack(&bundle("b", BundleSource::image("quay.io/x:v1")))
            .await
            .unwrap_err();
        assert!(err.is_config_error());
    }
}
