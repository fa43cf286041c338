//! File-based catalog provisioner
//!
//! Catalog bundles are only checked: the tree must load as a declarative
//! config and convert cleanly into the catalog model. The tree itself is
//! returned untouched.

use bundlekit_core::{BundleFs, DeclarativeConfig};
use tracing::debug;

use crate::error::Result;

pub const PROVISIONER_ID: &str = "catalogd-bundlekit-io-fbc";

/// Validate a catalog tree
pub fn handle_bundle(fs: &BundleFs) -> Result<BundleFs> {
    let config = DeclarativeConfig::load_fs(fs)?;
    let model = config.to_model()?;
    debug!(packages = model.packages.len(), "Validated catalog");
    Ok(fs.clone())
}
