//! Bundlekit Kube - Kubernetes integration for bundle content acquisition
//!
//! This crate turns a bundle's declared source into a file tree:
//!
//! - **Resources**: `Bundle` and `BundleDeployment` custom resources
//! - **Cluster access**: a small `Cluster` trait with a live and a mock backend
//! - **Source resolution**: a `Resolver` dispatching on the declared source type
//! - **Unpack pods**: the pod-mediated protocol for PVC and image sources
//! - **Upload**: publishing a local directory as immutable ConfigMaps
//!
//! ## Example
//!
//! ```ignore
//! use bundlekit_kube::{KubeCluster, Resolver, UnpackConfig};
//! use std::sync::Arc;
//!
//! let cluster = Arc::new(KubeCluster::new().await?);
//! let resolver = Resolver::with_defaults(cluster, &UnpackConfig::default());
//!
//! let result = resolver.resolve(&bundle).await?;
//! if let Some(content) = result.content {
//!     println!("unpacked {} files", content.len());
//! }
//! ```

pub mod cluster;
pub mod config;
pub mod crd;
pub mod error;
pub mod source;
pub mod upload;

pub use cluster::{Cluster, KubeCluster, MockCluster};
pub use config::UnpackConfig;
pub use crd::{
    Bundle, BundleDeployment, BundleDeploymentSpec, BundleSource, BundleSpec, ConfigMapSource,
    SourceType,
};
pub use error::{KubeError, Result};
pub use source::{Resolver, UnpackResult, UnpackState, Unpacker};
pub use upload::{UploadRequest, upload_bundle};
