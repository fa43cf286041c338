//! Error types for bundlekit-kube

use bundlekit_core::CoreError;
use thiserror::Error;

use crate::crd::SourceType;

/// Result type for bundlekit-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur while resolving bundle sources
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// No unpacker handles the declared source type
    #[error("bundle source type \"{0}\" not supported")]
    UnsupportedSourceType(SourceType),

    /// The source block matching the declared type is missing
    #[error("bundle source {0} configuration is unset")]
    SourceConfigUnset(SourceType),

    /// A referenced ConfigMap may still change
    #[error("configmap {namespace}/{name} is not immutable: all bundle configmaps must be immutable")]
    ConfigMapNotImmutable { namespace: String, name: String },

    /// Two source entries produce the same file
    #[error("file {path:?} from configmap {second:?} collides with file from configmap {first:?}")]
    DestinationCollision {
        path: String,
        first: String,
        second: String,
    },

    /// One source entry's file sits where another entry needs a directory
    #[error(
        "file {path:?} from configmap {second:?} conflicts with {other:?} from configmap {first:?}: a path cannot be both a file and a directory"
    )]
    DestinationConflict {
        path: String,
        other: String,
        first: String,
        second: String,
    },

    /// The unpack pod ran and failed
    #[error("unpack failed: {logs}")]
    UnpackFailed { logs: String },

    /// Logs of a failed unpack pod could not be read
    #[error("unpack failed: failed to retrieve failed pod logs: {0}")]
    FailedPodLogs(#[source] Box<KubeError>),

    /// The unpack pod is in a phase the protocol does not know
    #[error("unexpected pod phase: {phase}")]
    UnexpectedPodPhase { phase: String },

    /// The worker payload could not be turned into a tree
    #[error("get bundle contents: {0}")]
    BundleContents(#[source] CoreError),

    /// The image unpack pod did not report the image it ran
    #[error("bundle image digest not found")]
    MissingImageDigest,

    /// The bundle object lacks metadata needed to own its worker
    #[error("invalid bundle: {0}")]
    InvalidBundle(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Bundle content error
    #[error(transparent)]
    Core(#[from] CoreError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_yaml::Error> for KubeError {
    fn from(e: serde_yaml::Error) -> Self {
        KubeError::InvalidConfig(e.to_string())
    }
}

impl KubeError {
    /// Check if this is a Kubernetes 404 Not Found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 404)
    }

    /// Check if this is a conflict error (409)
    pub fn is_conflict(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 409)
    }

    /// Check if the error is a user-correctable misconfiguration
    ///
    /// Configuration errors will not go away on retry; everything else may.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            KubeError::UnsupportedSourceType(_)
                | KubeError::SourceConfigUnset(_)
                | KubeError::ConfigMapNotImmutable { .. }
                | KubeError::DestinationCollision { .. }
                | KubeError::DestinationConflict { .. }
                | KubeError::InvalidConfig(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16) -> KubeError {
        KubeError::Api(kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: "Test".to_string(),
            code,
        }))
    }

    #[test]
    fn test_status_helpers() {
        assert!(api_error(404).is_not_found());
        assert!(!api_error(404).is_conflict());
        assert!(api_error(409).is_conflict());
        assert!(!api_error(500).is_config_error());
    }

    #[test]
    fn test_config_errors() {
        assert!(KubeError::UnsupportedSourceType(SourceType::Image).is_config_error());
        assert!(KubeError::SourceConfigUnset(SourceType::ConfigMaps).is_config_error());
        assert!(
            !KubeError::UnpackFailed {
                logs: "x".to_string()
            }
            .is_config_error()
        );
    }

    #[test]
    fn test_messages() {
        insta::assert_snapshot!(
            KubeError::SourceConfigUnset(SourceType::PersistentVolumeClaim).to_string(),
            @"bundle source persistentVolumeClaim configuration is unset"
        );
        insta::assert_snapshot!(
            KubeError::UnsupportedSourceType(SourceType::Image).to_string(),
            @r#"bundle source type "image" not supported"#
        );
    }
}
