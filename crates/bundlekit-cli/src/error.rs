//! CLI error types with exit code handling
//!
//! Library errors are folded into a single type that knows which exit code
//! it maps to.

use bundlekit_core::CoreError;
use bundlekit_kube::KubeError;
use bundlekit_provisioner::ProvisionerError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Bundle content failed validation
    #[error("Validation failed: {message}")]
    #[diagnostic(code(bundlekit::cli::validation))]
    Validation {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// User-correctable configuration problem
    #[error("Configuration error: {message}")]
    #[diagnostic(code(bundlekit::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Kubernetes API failure
    #[error("Cluster error: {message}")]
    #[diagnostic(code(bundlekit::cli::cluster))]
    Cluster { message: String },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(bundlekit::cli::io))]
    Io { message: String },

    /// Internal error (runtime, unexpected failure)
    #[error("Internal error: {message}")]
    #[diagnostic(code(bundlekit::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Validation { .. } => exit_codes::VALIDATION_ERROR,
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::Cluster { .. } => exit_codes::CLUSTER_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// Create a configuration error with help text
    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Io(e) => e.into(),
            other => CliError::Validation {
                message: other.to_string(),
                help: None,
            },
        }
    }
}

impl From<ProvisionerError> for CliError {
    fn from(err: ProvisionerError) -> Self {
        let help = err.help().map(|h| h.to_string());
        if err.is_config_error() {
            return CliError::Config {
                message: err.to_string(),
                help,
            };
        }
        match err {
            ProvisionerError::Core(core) => core.into(),
            other => CliError::Validation {
                message: other.to_string(),
                help,
            },
        }
    }
}

impl From<KubeError> for CliError {
    fn from(err: KubeError) -> Self {
        if err.is_config_error() {
            return CliError::config(err.to_string());
        }
        match err {
            KubeError::Core(core) => core.into(),
            other => CliError::Cluster {
                message: other.to_string(),
            },
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
