//! Run command - upload a local bundle directory and point a deployment at it

use bundlekit_kube::{KubeCluster, UploadRequest, upload_bundle};
use console::style;
use std::path::Path;

use crate::commands::load_bundle_dir;
use crate::error::{CliError, Result};

/// Options for the run command
#[derive(Debug, Clone)]
pub struct RunOptions<'a> {
    pub name: &'a str,
    pub bundle_dir: &'a Path,
    pub bundle_provisioner_class: &'a str,
    pub bundle_deployment_provisioner_class: &'a str,
    pub config: Option<&'a str>,
    pub system_namespace: &'a str,
}

/// Run the run command
pub async fn run(opts: RunOptions<'_>) -> Result<()> {
    let config = opts.config.map(load_config).transpose()?;

    let content = load_bundle_dir(opts.bundle_dir)?;
    if content.is_empty() {
        return Err(CliError::config_with_help(
            format!("bundle directory {} holds no files", opts.bundle_dir.display()),
            "point run at a directory containing manifests, a chart or a catalog",
        ));
    }

    let request = UploadRequest {
        name: opts.name.to_string(),
        namespace: opts.system_namespace.to_string(),
        bundle_provisioner_class: opts.bundle_provisioner_class.to_string(),
        bundle_deployment_provisioner_class: opts.bundle_deployment_provisioner_class.to_string(),
        config,
    };

    let cluster = KubeCluster::new().await?;
    let applied = upload_bundle(&cluster, &request, &content).await?;

    let config_maps = applied
        .spec
        .template
        .spec
        .source
        .config_maps
        .as_ref()
        .map_or(0, Vec::len);

    println!(
        "{} bundledeployment.core.bundlekit.io {:?} applied",
        style("✓").green(),
        opts.name
    );
    println!(
        "  {} uploaded {} file(s) in {} configmap(s) to {}",
        style("→").blue(),
        content.len(),
        config_maps,
        style(opts.system_namespace).cyan()
    );
    Ok(())
}

/// Parse a `--config` argument: inline JSON, or `@path` to a JSON file
pub fn load_config(raw: &str) -> Result<serde_json::Value> {
    let (text, origin) = match raw.strip_prefix('@') {
        Some(path) => (std::fs::read_to_string(path)?, path),
        None => (raw.to_string(), "--config"),
    };
    serde_json::from_str(&text).map_err(|e| {
        CliError::config_with_help(
            format!("parse bundle deployment config from {}: {}", origin, e),
            "pass a JSON object, e.g. --config='{\"namespace\":\"nginx-system\"}'",
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_load_inline_config() {
        let config = load_config(r#"{"namespace": "nginx-system"}"#).unwrap();
        assert_eq!(config, json!({"namespace": "nginx-system"}));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"values": "replicaCount: 2\n"}"#).unwrap();

        let config = load_config(&format!("@{}", path.display())).unwrap();
        assert_eq!(config["values"], "replicaCount: 2\n");
    }

    #[test]
    fn test_load_config_errors() {
        let err = load_config("{not json").unwrap_err();
        assert!(matches!(err, CliError::Config { .. }));

        let err = load_config("@/nonexistent/bundlekit/config.json").unwrap_err();
        assert!(matches!(err, CliError::Io { .. }));
    }
}
