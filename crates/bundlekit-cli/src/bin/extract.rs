//! Unpack worker entry point
//!
//! Runs inside the unpack pod: packs the bundle directory into the payload
//! envelope and writes it to stdout, where the controller reads it back from
//! the pod's logs. The pod's log stream merges stdout and stderr, so nothing
//! but the envelope is ever written on success; no log subscriber is
//! installed regardless of `RUST_LOG`.
//!
//! When the bundle directory is an image's root filesystem, the paths the
//! container runtime mounts there are left out.

use bundlekit_core::fs::CONTAINER_RUNTIME_PATHS;
use bundlekit_core::{BundleFs, envelope};
use clap::Parser;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "extract")]
#[command(version)]
#[command(about = "Write a bundle directory to stdout as an unpack payload", long_about = None)]
struct Cli {
    /// Directory holding the bundle content
    #[arg(long)]
    bundle_dir: PathBuf,
}

/// Paths left out of the payload for a bundle directory
fn excluded_paths(bundle_dir: &Path) -> &'static [&'static str] {
    if bundle_dir.has_root() && bundle_dir.parent().is_none() {
        CONTAINER_RUNTIME_PATHS
    } else {
        &[]
    }
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    let content = BundleFs::from_dir_excluding(&cli.bundle_dir, excluded_paths(&cli.bundle_dir))
        .map_err(|e| miette::miette!("read bundle directory: {}", e))?;

    let payload =
        envelope::encode(&content).map_err(|e| miette::miette!("encode bundle: {}", e))?;

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", payload).map_err(|e| miette::miette!("write payload: {}", e))?;
    stdout.flush().map_err(|e| miette::miette!("write payload: {}", e))?;
    Ok(())
}
