//! Bundle content assembled from immutable ConfigMaps

use async_trait::async_trait;
use bundlekit_core::BundleFs;
use bundlekit_core::fs::{clean_path, join_path};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

use super::{UnpackResult, Unpacker, bundle_name, expect_source_type};
use crate::cluster::Cluster;
use crate::config::UnpackConfig;
use crate::crd::{Bundle, SourceType};
use crate::error::{KubeError, Result};

/// Reads bundle files straight out of ConfigMaps
///
/// Every referenced ConfigMap must be immutable so content that was
/// unpacked once can never change underneath the bundle.
pub struct ConfigMapsUnpacker {
    cluster: Arc<dyn Cluster>,
    namespace: String,
}

impl ConfigMapsUnpacker {
    pub fn new(cluster: Arc<dyn Cluster>, config: &UnpackConfig) -> Self {
        Self {
            cluster,
            namespace: config.configmap_namespace.clone(),
        }
    }
}

#[async_trait]
impl Unpacker for ConfigMapsUnpacker {
    async fn unpack(&self, bundle: &Bundle) -> Result<UnpackResult> {
        expect_source_type(bundle, SourceType::ConfigMaps)?;
        let source = &bundle.spec.source;
        let entries = source
            .config_maps
            .as_ref()
            .filter(|entries| !entries.is_empty())
            .ok_or(KubeError::SourceConfigUnset(SourceType::ConfigMaps))?;

        let mut fs = BundleFs::new();
        // destination path -> ConfigMap it came from
        let mut origins: HashMap<String, String> = HashMap::new();

        for entry in entries {
            let name = &entry.config_map.name;
            let config_map = self.cluster.get_config_map(&self.namespace, name).await?;
            if config_map.immutable != Some(true) {
                return Err(KubeError::ConfigMapNotImmutable {
                    namespace: self.namespace.clone(),
                    name: name.clone(),
                });
            }

            let mut files: BTreeMap<String, Vec<u8>> = BTreeMap::new();
            for (file, text) in config_map.data.unwrap_or_default() {
                files.insert(file, text.into_bytes());
            }
            for (file, bytes) in config_map.binary_data.unwrap_or_default() {
                files.insert(file, bytes.0);
            }

            let dir = clean_path(&entry.path)?;
            for (file, data) in files {
                let path = join_path(&dir, &file)?;
                if let Some(first) = origins.get(&path) {
                    return Err(KubeError::DestinationCollision {
                        path,
                        first: first.clone(),
                        second: name.clone(),
                    });
                }
                if let Some(other) = fs.conflicting_file(&path) {
                    return Err(KubeError::DestinationConflict {
                        path,
                        other: other.to_string(),
                        first: origins.get(other).cloned().unwrap_or_default(),
                        second: name.clone(),
                    });
                }
                fs.insert(&path, data)?;
                origins.insert(path, name.clone());
            }
        }

        debug!(
            bundle = bundle_name(bundle),
            files = fs.len(),
            "Assembled bundle from configmaps"
        );
        Ok(UnpackResult::unpacked(fs, source.clone()))
    }
}
