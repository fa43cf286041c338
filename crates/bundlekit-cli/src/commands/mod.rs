//! CLI commands

pub mod crds;
pub mod run;
pub mod validate;

use bundlekit_core::BundleFs;
use std::path::Path;
use tracing::debug;

use crate::error::{CliError, Result};

/// Read a bundle directory from disk
pub fn load_bundle_dir(dir: &Path) -> Result<BundleFs> {
    if !dir.is_dir() {
        return Err(CliError::Io {
            message: format!(
                "bundle directory {} does not exist or is not a directory",
                dir.display()
            ),
        });
    }
    let content = BundleFs::from_dir(dir)?;
    debug!(files = content.len(), dir = %dir.display(), "Loaded bundle directory");
    Ok(content)
}
