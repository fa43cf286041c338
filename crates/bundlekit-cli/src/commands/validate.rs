//! Validate command - run a provisioner's content checks locally

use bundlekit_kube::crd::BundleTemplate;
use bundlekit_kube::{BundleDeployment, BundleDeploymentSpec, BundleSource, BundleSpec};
use bundlekit_provisioner::Provisioner;
use console::style;
use std::collections::BTreeMap;
use std::path::Path;

use crate::commands::load_bundle_dir;
use crate::commands::run::load_config;
use crate::error::Result;

pub async fn run(bundle_dir: &Path, provisioner_id: &str, config: Option<&str>) -> Result<()> {
    let provisioner = Provisioner::from_id(provisioner_id)?;
    let content = load_bundle_dir(bundle_dir)?;

    println!(
        "{} Validating {} with {}",
        style("→").blue(),
        bundle_dir.display(),
        style(provisioner).cyan()
    );

    let shaped = provisioner.handle_bundle(&content).await?;
    println!(
        "  {} {} file(s) accepted",
        style("✓").green(),
        shaped.len()
    );

    if let Some(raw) = config {
        let deployment = local_deployment(provisioner, load_config(raw)?);
        match provisioner.handle_bundle_deployment(&shaped, &deployment).await? {
            Some(rendered) => println!(
                "  {} chart {} {} installs into {}",
                style("✓").green(),
                rendered.chart.name(),
                rendered.chart.metadata.version,
                style(&rendered.namespace).cyan()
            ),
            None => println!(
                "  {} {} takes no deployment config",
                style("⚠").yellow(),
                provisioner
            ),
        }
    }

    println!();
    println!("{} Validation passed", style("✓").green().bold());
    Ok(())
}

/// A deployment object carrying only what the provisioner reads
fn local_deployment(provisioner: Provisioner, config: serde_json::Value) -> BundleDeployment {
    BundleDeployment::new(
        "local",
        BundleDeploymentSpec {
            provisioner_class_name: provisioner.id().to_string(),
            template: BundleTemplate {
                labels: BTreeMap::new(),
                spec: BundleSpec {
                    provisioner_class_name: provisioner.id().to_string(),
                    source: BundleSource::config_maps(Vec::new()),
                },
            },
            config: Some(config),
        },
    )
}
