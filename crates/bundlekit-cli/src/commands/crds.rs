//! Crds command - print the CustomResourceDefinitions

use bundlekit_kube::{Bundle, BundleDeployment};
use kube::CustomResourceExt;

use crate::error::{CliError, Result};

/// Render both CRDs as a multi-document YAML stream
pub fn render() -> Result<String> {
    let mut out = String::new();
    for crd in [Bundle::crd(), BundleDeployment::crd()] {
        let yaml = serde_yaml::to_string(&crd)
            .map_err(|e| CliError::internal(format!("Failed to serialize CRD: {}", e)))?;
        out.push_str("---\n");
        out.push_str(&yaml);
    }
    Ok(out)
}

pub fn run() -> Result<()> {
    print!("{}", render()?);
    Ok(())
}
