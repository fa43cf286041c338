//! Provisioner error types

use bundlekit_core::CoreError;
use miette::Diagnostic;
use thiserror::Error;

/// Main provisioner error type
#[derive(Error, Debug, Diagnostic)]
pub enum ProvisionerError {
    #[error("unknown provisioner {0:?}")]
    #[diagnostic(
        code(provisioner::unknown),
        help("known provisioners: core-bundlekit-io-plain, core-bundlekit-io-helm, catalogd-bundlekit-io-fbc")
    )]
    UnknownProvisioner(String),

    #[error("install namespace not defined: set .spec.config.namespace")]
    #[diagnostic(code(provisioner::missing_namespace))]
    MissingNamespace,

    #[error("parse bundle deployment config: {0}")]
    #[diagnostic(code(provisioner::config))]
    InvalidConfig(String),

    #[error(transparent)]
    #[diagnostic(code(provisioner::content))]
    Core(#[from] CoreError),

    #[error("archive pipeline: {0}")]
    Pipeline(String),
}

impl From<std::io::Error> for ProvisionerError {
    fn from(e: std::io::Error) -> Self {
        ProvisionerError::Core(CoreError::Io(e))
    }
}

impl ProvisionerError {
    /// Check if the error is a user-correctable misconfiguration
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            ProvisionerError::UnknownProvisioner(_)
                | ProvisionerError::MissingNamespace
                | ProvisionerError::InvalidConfig(_)
        )
    }
}

/// Result type for provisioner operations
pub type Result<T> = std::result::Result<T, ProvisionerError>;
