//! Bundle content extracted from a container image by an unpack pod
//!
//! The bundle image usually carries no tooling, so an init container copies
//! the `extract` binary from the unpack image into a shared volume, and the
//! main container runs that binary from inside the bundle image.
//!
//! Content from an image is pinned: the resolved source names the image by
//! the digest the pod actually ran, not by the tag that was declared.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Container, EmptyDirVolumeSource, Pod, PodSpec, Volume, VolumeMount};
use std::sync::Arc;

use super::worker::{UnpackWorker, WorkerTemplate, single_container};
use super::{UnpackResult, Unpacker, expect_source_type};
use crate::cluster::Cluster;
use crate::config::UnpackConfig;
use crate::crd::{Bundle, BundleSource, SourceType};
use crate::error::{KubeError, Result};

const CONTAINER_NAME: &str = "bundle";
const INIT_CONTAINER_NAME: &str = "install-extract";
const UTIL_VOLUME: &str = "util";
const UTIL_DIR: &str = "/util";

/// Runs the bundle image itself as the unpack pod
pub struct ImageUnpacker {
    worker: UnpackWorker,
    template: ImageTemplate,
}

struct ImageTemplate {
    unpack_image: String,
}

impl ImageUnpacker {
    pub fn new(cluster: Arc<dyn Cluster>, config: &UnpackConfig) -> Self {
        Self {
            worker: UnpackWorker::new(cluster, &config.provisioner_name, &config.pod_namespace),
            template: ImageTemplate {
                unpack_image: config.unpack_image.clone(),
            },
        }
    }
}

#[async_trait]
impl Unpacker for ImageUnpacker {
    async fn unpack(&self, bundle: &Bundle) -> Result<UnpackResult> {
        expect_source_type(bundle, SourceType::Image)?;
        if bundle.spec.source.image.is_none() {
            return Err(KubeError::SourceConfigUnset(SourceType::Image));
        }
        self.worker.unpack(bundle, &self.template).await
    }
}

fn util_mount() -> VolumeMount {
    VolumeMount {
        name: UTIL_VOLUME.to_string(),
        mount_path: UTIL_DIR.to_string(),
        ..Default::default()
    }
}

impl WorkerTemplate for ImageTemplate {
    fn apply(&self, bundle: &Bundle, spec: &mut PodSpec) -> Result<()> {
        let image = bundle
            .spec
            .source
            .image
            .as_ref()
            .ok_or(KubeError::SourceConfigUnset(SourceType::Image))?;

        if spec.init_containers.as_ref().map(Vec::len) != Some(1) {
            spec.init_containers = Some(vec![Container::default()]);
        }
        if let Some(init) = spec.init_containers.as_mut().and_then(|c| c.first_mut()) {
            init.name = INIT_CONTAINER_NAME.to_string();
            init.image = Some(self.unpack_image.clone());
            init.image_pull_policy = Some("IfNotPresent".to_string());
            init.command = Some(vec![
                "cp".to_string(),
                "/extract".to_string(),
                format!("{}/extract", UTIL_DIR),
            ]);
            init.volume_mounts = Some(vec![util_mount()]);
        }

        let container = single_container(spec);
        container.name = CONTAINER_NAME.to_string();
        container.image = Some(image.reference.clone());
        container.image_pull_policy = Some("IfNotPresent".to_string());
        container.command = Some(vec![
            format!("{}/extract", UTIL_DIR),
            "--bundle-dir".to_string(),
            "/".to_string(),
        ]);
        container.volume_mounts = Some(vec![util_mount()]);

        spec.volumes = Some(vec![Volume {
            name: UTIL_VOLUME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        }]);
        Ok(())
    }

    fn resolved_source(&self, _bundle: &Bundle, pod: &Pod) -> Result<BundleSource> {
        let digest = pod
            .status
            .iter()
            .flat_map(|s| s.container_statuses.iter().flatten())
            .find(|cs| cs.name == CONTAINER_NAME && !cs.image_id.is_empty())
            .map(|cs| cs.image_id.clone())
            .ok_or(KubeError::MissingImageDigest)?;
        Ok(BundleSource::image(digest))
    }
}
