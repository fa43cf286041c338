//! Bundlekit Provisioner - content handlers per provisioner class
//!
//! Once a bundle's content has been acquired, the provisioner named by the
//! bundle's class shapes and validates it:
//!
//! - **plain**: manifests, accepted unchanged
//! - **helm**: a chart, wrapped in a single directory and loaded through a
//!   streaming archive pipeline
//! - **catalog**: a file-based catalog, validated into a package model
//!
//! ## Example
//!
//! ```ignore
//! use bundlekit_provisioner::Provisioner;
//!
//! let provisioner: Provisioner = bundle.spec.provisioner_class_name.parse()?;
//! let shaped = provisioner.handle_bundle(&content).await?;
//! ```

pub mod catalog;
pub mod error;
pub mod helm;
pub mod pipeline;
pub mod plain;

use bundlekit_core::BundleFs;
use bundlekit_kube::{Bundle, BundleDeployment};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

pub use error::{ProvisionerError, Result};
pub use helm::{HelmConfig, RenderedDeployment};

/// Known provisioner classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provisioner {
    Plain,
    Helm,
    Catalog,
}

impl Provisioner {
    pub const ALL: [Provisioner; 3] = [Provisioner::Plain, Provisioner::Helm, Provisioner::Catalog];

    /// Class name used in `provisionerClassName`
    pub fn id(&self) -> &'static str {
        match self {
            Provisioner::Plain => plain::PROVISIONER_ID,
            Provisioner::Helm => helm::PROVISIONER_ID,
            Provisioner::Catalog => catalog::PROVISIONER_ID,
        }
    }

    pub fn from_id(id: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.id() == id)
            .ok_or_else(|| ProvisionerError::UnknownProvisioner(id.to_string()))
    }

    /// Shape and validate unpacked bundle content
    pub async fn handle_bundle(&self, fs: &BundleFs) -> Result<BundleFs> {
        match self {
            Provisioner::Plain => plain::handle_bundle(fs),
            Provisioner::Helm => helm::handle_bundle(fs).await,
            Provisioner::Catalog => catalog::handle_bundle(fs),
        }
    }

    /// Resolve a deployment of shaped content
    ///
    /// Only charts carry deployment config; the other classes yield `None`.
    pub async fn handle_bundle_deployment(
        &self,
        fs: &BundleFs,
        deployment: &BundleDeployment,
    ) -> Result<Option<RenderedDeployment>> {
        match self {
            Provisioner::Helm => Ok(Some(helm::handle_bundle_deployment(fs, deployment).await?)),
            Provisioner::Plain | Provisioner::Catalog => Ok(None),
        }
    }
}

impl FromStr for Provisioner {
    type Err = ProvisionerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_id(s)
    }
}

impl fmt::Display for Provisioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Handle a bundle with the provisioner its class names
pub async fn handle_bundle(fs: &BundleFs, bundle: &Bundle) -> Result<BundleFs> {
    let provisioner = Provisioner::from_id(&bundle.spec.provisioner_class_name)?;
    debug!(%provisioner, files = fs.len(), "Handling bundle content");
    provisioner.handle_bundle(fs).await
}

/// Handle a deployment with the provisioner its class names
pub async fn handle_bundle_deployment(
    fs: &BundleFs,
    deployment: &BundleDeployment,
) -> Result<Option<RenderedDeployment>> {
    let provisioner = Provisioner::from_id(&deployment.spec.provisioner_class_name)?;
    provisioner.handle_bundle_deployment(fs, deployment).await
}
