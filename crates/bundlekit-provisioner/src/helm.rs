//! Chart provisioner
//!
//! Chart bundles are reshaped to hold a single chart directory, then loaded
//! and validated through the archive pipeline. Deployments carry a config
//! blob of the form:
//!
//! ```json
//! {"namespace": "nginx-system", "values": "replicaCount: 2\n"}
//! ```
//!
//! `namespace` is required; `values` is YAML in a string.

use bundlekit_core::{BundleFs, Chart, Values};
use bundlekit_kube::BundleDeployment;
use serde::Deserialize;
use tracing::debug;

use crate::error::{ProvisionerError, Result};
use crate::pipeline;

pub const PROVISIONER_ID: &str = "core-bundlekit-io-helm";

/// Directory a chart is wrapped in when the tree lacks one
pub const CHART_DIR: &str = "chart";

/// A chart ready to be rendered and installed
#[derive(Debug, Clone)]
pub struct RenderedDeployment {
    pub chart: Chart,
    /// Namespace to install into
    pub namespace: String,
    /// Values overriding the chart defaults
    pub values: Values,
}

impl RenderedDeployment {
    /// Chart defaults with the deployment's values merged over them
    pub fn effective_values(&self) -> Values {
        let mut values = self.chart.values.clone();
        values.merge(&self.values);
        values
    }
}

/// Parsed deployment config
#[derive(Debug, Clone, PartialEq)]
pub struct HelmConfig {
    pub namespace: String,
    pub values: Values,
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    values: Option<String>,
}

/// Parse and check the config blob of a deployment
pub fn parse_config(deployment: &BundleDeployment) -> Result<HelmConfig> {
    let raw: RawConfig = match &deployment.spec.config {
        Some(config) => serde_json::from_value(config.clone())
            .map_err(|e| ProvisionerError::InvalidConfig(e.to_string()))?,
        None => RawConfig::default(),
    };

    let namespace = raw
        .namespace
        .filter(|ns| !ns.is_empty())
        .ok_or(ProvisionerError::MissingNamespace)?;

    let values = match raw.values.as_deref() {
        Some(text) if !text.is_empty() => Values::from_yaml(text)
            .map_err(|e| ProvisionerError::InvalidConfig(format!("read chart values: {}", e)))?,
        _ => Values::new(),
    };

    Ok(HelmConfig { namespace, values })
}

/// Namespace a deployment installs into
pub fn deploy_namespace(deployment: &BundleDeployment) -> Result<String> {
    Ok(parse_config(deployment)?.namespace)
}

/// Wrap the tree in a chart directory if needed, then load and validate it
pub async fn handle_bundle(fs: &BundleFs) -> Result<BundleFs> {
    let chart_fs = fs.ensure_base_dir(CHART_DIR)?;
    pipeline::load_chart(chart_fs.clone()).await?;
    Ok(chart_fs)
}

/// Resolve a deployment's config and load its chart
///
/// The config is checked before the chart is touched.
pub async fn handle_bundle_deployment(
    fs: &BundleFs,
    deployment: &BundleDeployment,
) -> Result<RenderedDeployment> {
    let config = parse_config(deployment)?;
    let chart = pipeline::load_chart(fs.ensure_base_dir(CHART_DIR)?).await?;

    debug!(
        chart = chart.name(),
        namespace = %config.namespace,
        "Resolved chart deployment"
    );
    Ok(RenderedDeployment {
        chart,
        namespace: config.namespace,
        values: config.values,
    })
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use bundlekit_kube::{BundleDeploymentSpec, BundleSource, BundleSpec};
    use bundlekit_kube::crd::BundleTemplate;
    use std::collections::BTreeMap;

    pub fn deployment(config: Option<serde_json::Value>) -> BundleDeployment {
        BundleDeployment::new(
            "nginx",
            BundleDeploymentSpec {
                provisioner_class_name: PROVISIONER_ID.to_string(),
                template: BundleTemplate {
                    labels: BTreeMap::new(),
                    spec: BundleSpec {
                        provisioner_class_name: PROVISIONER_ID.to_string(),
                        source: BundleSource::persistent_volume_claim("nginx"),
                    },
                },
                config,
            },
        )
    }

    /// Chart files at the root of the tree, as uploaded from a chart directory
    pub fn unwrapped_chart() -> BundleFs {
        let mut fs = BundleFs::new();
        fs.insert(
            "Chart.yaml",
            "apiVersion: v2\nname: nginx\nversion: 0.1.0\nappVersion: \"1.25\"\n",
        )
        .unwrap();
        fs.insert("values.yaml", "replicaCount: 1\nimage:\n  tag: stable\n").unwrap();
        fs.insert("templates/deployment.yaml", "kind: Deployment\n").unwrap();
        fs
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_handle_bundle_wraps_unshaped_tree() {
        let fs = unwrapped_chart();
        let shaped = handle_bundle(&fs).await.unwrap();

        assert_eq!(shaped.base_dir(), Some(CHART_DIR));
        assert_eq!(shaped.len(), fs.len());
        assert_eq!(shaped.subtree(CHART_DIR).unwrap(), fs);
        // caller's tree is untouched
        assert!(fs.contains("Chart.yaml"));
    }

    #[tokio::test]
    async fn test_handle_bundle_keeps_shaped_tree() {
        let fs = unwrapped_chart().ensure_base_dir("nginx").unwrap();
        let shaped = handle_bundle(&fs).await.unwrap();
        assert_eq!(shaped, fs);
    }

    #[tokio::test]
    async fn test_handle_bundle_rejects_malformed_chart() {
        let mut fs = unwrapped_chart();
        fs.insert("Chart.yaml", "apiVersion: v2\nname: [broken\n").unwrap();
        let err = handle_bundle(&fs).await.unwrap_err();
        assert!(err.to_string().contains("cannot load Chart.yaml"), "{err}");
    }

    #[tokio::test]
    async fn test_handle_bundle_deployment() {
        let fs = handle_bundle(&unwrapped_chart()).await.unwrap();
        let bd = deployment(Some(json!({
            "namespace": "nginx-system",
            "values": "replicaCount: 3\n"
        })));

        let rendered = handle_bundle_deployment(&fs, &bd).await.unwrap();
        assert_eq!(rendered.namespace, "nginx-system");
        assert_eq!(rendered.chart.name(), "nginx");
        assert_eq!(rendered.values.get("replicaCount"), Some(&json!(3)));

        let effective = rendered.effective_values();
        assert_eq!(effective.get("replicaCount"), Some(&json!(3)));
        assert_eq!(effective.get("image.tag"), Some(&json!("stable")));
    }

    #[tokio::test]
    async fn test_missing_namespace_fails_before_chart_load() {
        // an empty tree would fail to load as a chart
        let bd = deployment(Some(json!({"values": "a: 1\n"})));
        let err = handle_bundle_deployment(&BundleFs::new(), &bd).await.unwrap_err();
        assert!(matches!(err, ProvisionerError::MissingNamespace));
        assert!(err.is_config_error());
        insta::assert_snapshot!(err.to_string(), @"install namespace not defined: set .spec.config.namespace");
    }

    #[test]
    fn test_parse_config() {
        let config = parse_config(&deployment(Some(json!({"namespace": "apps"})))).unwrap();
        assert_eq!(config.namespace, "apps");
        assert!(config.values.is_empty());

        assert!(matches!(
            parse_config(&deployment(None)),
            Err(ProvisionerError::MissingNamespace)
        ));
        assert!(matches!(
            parse_config(&deployment(Some(json!({"namespace": ""})))),
            Err(ProvisionerError::MissingNamespace)
        ));
    }

    #[test]
    fn test_parse_config_malformed() {
        let err = parse_config(&deployment(Some(json!({"namespace": 7})))).unwrap_err();
        assert!(err.is_config_error());

        let err = parse_config(&deployment(Some(json!({
            "namespace": "apps",
            "values": "- not\n- a mapping\n"
        }))))
        .unwrap_err();
        assert!(err.to_string().starts_with("parse bundle deployment config: read chart values"));
    }

    #[test]
    fn test_deploy_namespace() {
        let bd = deployment(Some(json!({"namespace": "apps", "extra": true})));
        assert_eq!(deploy_namespace(&bd).unwrap(), "apps");
    }
}
