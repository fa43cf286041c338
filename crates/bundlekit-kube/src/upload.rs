//! Publishing a local bundle directory to the cluster
//!
//! The tree is stored as immutable ConfigMaps, one per directory, whose names
//! carry a hash of their content. Re-uploading unchanged content is a no-op
//! and changed content never overwrites what an existing bundle references.
//! A BundleDeployment referencing them is then server-side applied.

use bundlekit_core::BundleFs;
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::info;

use crate::cluster::Cluster;
use crate::crd::{
    BundleDeployment, BundleDeploymentSpec, BundleSource, BundleSpec, BundleTemplate, ConfigMapSource,
};
use crate::error::{KubeError, Result};

/// Label naming the BundleDeployment an uploaded ConfigMap belongs to
pub const DEPLOYMENT_LABEL: &str = "core.bundlekit.io/bundle-deployment";

/// Largest payload a single ConfigMap can hold
const MAX_CONFIG_MAP_SIZE: usize = 1_000_000;

/// What to publish
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// BundleDeployment name
    pub name: String,
    /// Namespace the content ConfigMaps are created in
    pub namespace: String,
    pub bundle_provisioner_class: String,
    pub bundle_deployment_provisioner_class: String,
    /// Provisioner-specific configuration
    pub config: Option<serde_json::Value>,
}

/// Upload a tree and apply a BundleDeployment referencing it
pub async fn upload_bundle(
    cluster: &dyn Cluster,
    request: &UploadRequest,
    content: &BundleFs,
) -> Result<BundleDeployment> {
    let (config_maps, sources) = content_config_maps(request, content)?;
    for config_map in &config_maps {
        cluster.create_config_map(config_map).await?;
    }

    let deployment = bundle_deployment(request, sources);
    let applied = cluster.apply_bundle_deployment(&deployment).await?;
    info!(
        name = %request.name,
        config_maps = config_maps.len(),
        "Applied bundle deployment"
    );
    Ok(applied)
}

/// Split a tree into immutable ConfigMaps, one per directory
///
/// ConfigMap keys cannot contain `/`, so each directory becomes its own
/// ConfigMap mounted at that directory's path.
pub fn content_config_maps(
    request: &UploadRequest,
    content: &BundleFs,
) -> Result<(Vec<ConfigMap>, Vec<ConfigMapSource>)> {
    let mut dirs: BTreeMap<&str, BTreeMap<String, Vec<u8>>> = BTreeMap::new();
    for (path, data) in content.iter() {
        let (dir, file) = path.rsplit_once('/').unwrap_or(("", path));
        dirs.entry(dir).or_default().insert(file.to_string(), data.to_vec());
    }

    let mut config_maps = Vec::new();
    let mut sources = Vec::new();
    for (dir, files) in dirs {
        let size: usize = files.values().map(Vec::len).sum();
        if size > MAX_CONFIG_MAP_SIZE {
            return Err(KubeError::InvalidConfig(format!(
                "directory {:?} holds {} bytes, more than a configmap can store ({} bytes)",
                if dir.is_empty() { "." } else { dir },
                size,
                MAX_CONFIG_MAP_SIZE
            )));
        }

        let name = format!("{}-{}", request.name, content_hash(dir, &files));
        let mut data = BTreeMap::new();
        let mut binary_data = BTreeMap::new();
        for (file, bytes) in files {
            match String::from_utf8(bytes) {
                Ok(text) => {
                    data.insert(file, text);
                }
                Err(e) => {
                    binary_data.insert(file, ByteString(e.into_bytes()));
                }
            }
        }

        config_maps.push(ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: Some(request.namespace.clone()),
                labels: Some(BTreeMap::from([(
                    DEPLOYMENT_LABEL.to_string(),
                    request.name.clone(),
                )])),
                ..Default::default()
            },
            immutable: Some(true),
            data: (!data.is_empty()).then_some(data),
            binary_data: (!binary_data.is_empty()).then_some(binary_data),
            ..Default::default()
        });
        sources.push(ConfigMapSource::new(name, dir));
    }

    Ok((config_maps, sources))
}

fn bundle_deployment(request: &UploadRequest, sources: Vec<ConfigMapSource>) -> BundleDeployment {
    BundleDeployment::new(
        &request.name,
        BundleDeploymentSpec {
            provisioner_class_name: request.bundle_deployment_provisioner_class.clone(),
            template: BundleTemplate {
                labels: BTreeMap::from([(DEPLOYMENT_LABEL.to_string(), request.name.clone())]),
                spec: BundleSpec {
                    provisioner_class_name: request.bundle_provisioner_class.clone(),
                    source: BundleSource::config_maps(sources),
                },
            },
            config: request.config.clone(),
        },
    )
}

/// Short stable hash of a directory's content
fn content_hash(dir: &str, files: &BTreeMap<String, Vec<u8>>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(dir.as_bytes());
    for (name, data) in files {
        hasher.update((name.len() as u64).to_be_bytes());
        hasher.update(name.as_bytes());
        hasher.update((data.len() as u64).to_be_bytes());
        hasher.update(data);
    }
    hex::encode(hasher.finalize())[..10].to_string()
}
