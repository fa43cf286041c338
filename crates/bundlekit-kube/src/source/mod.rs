//! Source resolution: turning a bundle's declared source into a file tree
//!
//! Each source type has an [`Unpacker`]. The [`Resolver`] maps source types
//! to unpackers and dispatches on the type a bundle declares:
//! - **configMaps**: read directly from immutable ConfigMaps
//! - **persistentVolumeClaim**: extracted by an unpack pod mounting the claim
//! - **image**: extracted by an unpack pod running the image itself
//!
//! Pod-mediated unpackers never wait for the pod. Each call samples what the
//! cluster reports and returns `Pending`, `Unpacking` or `Unpacked`; callers
//! poll by invoking again later.

mod configmaps;
mod image;
mod pvc;
pub mod worker;

pub use configmaps::ConfigMapsUnpacker;
pub use image::ImageUnpacker;
pub use pvc::PersistentVolumeClaimUnpacker;

use async_trait::async_trait;
use bundlekit_core::BundleFs;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::cluster::Cluster;
use crate::config::UnpackConfig;
use crate::crd::{Bundle, BundleSource, SourceType};
use crate::error::{KubeError, Result};

/// Progress of one unpack attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnpackState {
    /// Content is not available yet, e.g. the unpack pod was just created
    Pending,
    /// The unpack pod is running
    Unpacking,
    /// Content is available
    Unpacked,
}

/// Outcome of one unpack attempt
///
/// An `Unpacked` result always carries both `content` and `resolved_source`;
/// the other states carry neither.
#[derive(Debug, Clone)]
pub struct UnpackResult {
    pub content: Option<BundleFs>,
    /// Copy of the source the content was unpacked from
    pub resolved_source: Option<BundleSource>,
    pub state: UnpackState,
    pub message: String,
}

impl UnpackResult {
    pub fn pending(message: impl Into<String>) -> Self {
        Self {
            content: None,
            resolved_source: None,
            state: UnpackState::Pending,
            message: message.into(),
        }
    }

    pub fn unpacking() -> Self {
        Self {
            content: None,
            resolved_source: None,
            state: UnpackState::Unpacking,
            message: String::new(),
        }
    }

    pub fn unpacked(content: BundleFs, resolved_source: BundleSource) -> Self {
        Self {
            content: Some(content),
            resolved_source: Some(resolved_source),
            state: UnpackState::Unpacked,
            message: String::new(),
        }
    }

    pub fn is_unpacked(&self) -> bool {
        self.state == UnpackState::Unpacked
    }
}

/// Converts one kind of bundle source into a file tree
#[async_trait]
pub trait Unpacker: Send + Sync {
    /// Make one attempt at unpacking the bundle's content
    async fn unpack(&self, bundle: &Bundle) -> Result<UnpackResult>;
}

/// Dispatches bundles to the unpacker registered for their source type
#[derive(Clone, Default)]
pub struct Resolver {
    unpackers: HashMap<SourceType, Arc<dyn Unpacker>>,
}

impl Resolver {
    /// Create an empty resolver
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a resolver with every built-in source type registered
    pub fn with_defaults(cluster: Arc<dyn Cluster>, config: &UnpackConfig) -> Self {
        let mut resolver = Self::new();
        resolver.register(
            SourceType::ConfigMaps,
            Arc::new(ConfigMapsUnpacker::new(cluster.clone(), config)),
        );
        resolver.register(
            SourceType::PersistentVolumeClaim,
            Arc::new(PersistentVolumeClaimUnpacker::new(cluster.clone(), config)),
        );
        resolver.register(SourceType::Image, Arc::new(ImageUnpacker::new(cluster, config)));
        resolver
    }

    /// Register the unpacker for a source type, replacing any previous one
    pub fn register(&mut self, source_type: SourceType, unpacker: Arc<dyn Unpacker>) {
        self.unpackers.insert(source_type, unpacker);
    }

    /// Source types this resolver can handle
    pub fn source_types(&self) -> Vec<SourceType> {
        let mut types: Vec<_> = self.unpackers.keys().copied().collect();
        types.sort_by_key(|t| t.as_str());
        types
    }

    /// Unpack a bundle with the unpacker for its declared source type
    pub async fn resolve(&self, bundle: &Bundle) -> Result<UnpackResult> {
        let source_type = bundle.spec.source.type_;
        let unpacker = self
            .unpackers
            .get(&source_type)
            .ok_or(KubeError::UnsupportedSourceType(source_type))?;

        debug!(
            bundle = bundle_name(bundle),
            source_type = %source_type,
            "Resolving bundle source"
        );
        unpacker.unpack(bundle).await
    }
}

/// Fail unless the bundle declares the given source type
pub(crate) fn expect_source_type(bundle: &Bundle, expected: SourceType) -> Result<()> {
    let declared = bundle.spec.source.type_;
    if declared != expected {
        return Err(KubeError::UnsupportedSourceType(declared));
    }
    Ok(())
}

pub(crate) fn bundle_name(bundle: &Bundle) -> &str {
    bundle.metadata.name.as_deref().unwrap_or_default()
}
