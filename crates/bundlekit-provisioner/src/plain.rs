//! Plain manifest provisioner
//!
//! Plain bundles are directories of manifests applied as they are, so there
//! is nothing to reshape and nothing to render.

use bundlekit_core::BundleFs;

use crate::error::Result;

pub const PROVISIONER_ID: &str = "core-bundlekit-io-plain";

/// Plain content is accepted as is
pub fn handle_bundle(fs: &BundleFs) -> Result<BundleFs> {
    Ok(fs.clone())
}
