//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid path {path:?}: {message}")]
    InvalidPath { path: String, message: String },

    #[error("invalid chart: {message}")]
    InvalidChart { message: String },

    #[error("invalid catalog: {message}")]
    InvalidCatalog { message: String },

    #[error("invalid values: {message}")]
    InvalidValues { message: String },

    #[error("archive error: {message}")]
    Archive { message: String },

    #[error("invalid unpack payload: {message}")]
    Payload { message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
