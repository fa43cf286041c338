//! Unpacker configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{KubeError, Result};

pub const DEFAULT_SYSTEM_NAMESPACE: &str = "bundlekit-system";
pub const DEFAULT_UNPACK_IMAGE: &str = "ghcr.io/bundlekit/extract:latest";

/// Settings shared by every source unpacker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UnpackConfig {
    /// Provisioner the unpack pods are named after
    pub provisioner_name: String,

    /// Namespace bundle ConfigMaps are read from
    pub configmap_namespace: String,

    /// Namespace unpack pods run in
    pub pod_namespace: String,

    /// Image carrying the `extract` binary
    pub unpack_image: String,
}

impl Default for UnpackConfig {
    fn default() -> Self {
        Self {
            provisioner_name: "core-bundlekit-io-plain".to_string(),
            configmap_namespace: DEFAULT_SYSTEM_NAMESPACE.to_string(),
            pod_namespace: DEFAULT_SYSTEM_NAMESPACE.to_string(),
            unpack_image: DEFAULT_UNPACK_IMAGE.to_string(),
        }
    }
}

impl UnpackConfig {
    /// Load configuration from a YAML file
    ///
    /// Fields not present in the file keep their defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no unpacker can work with
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("provisionerName", &self.provisioner_name),
            ("configmapNamespace", &self.configmap_namespace),
            ("podNamespace", &self.pod_namespace),
            ("unpackImage", &self.unpack_image),
        ];
        for (field, value) in required {
            if value.is_empty() {
                return Err(KubeError::InvalidConfig(format!("{} must not be empty", field)));
            }
        }
        Ok(())
    }
}
