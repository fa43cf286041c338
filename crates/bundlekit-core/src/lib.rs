//! Bundlekit Core - Core types and utilities for bundle content handling
//!
//! This crate provides the foundational types used throughout bundlekit:
//! - `BundleFs`: An in-memory, read-only view of a bundle's file tree
//! - `archive`: tar.gz encoding and decoding of trees
//! - `envelope`: The payload an unpack worker prints on completion
//! - `Chart`: Chart loading and validation
//! - `Values`: Configuration values with deep merge support
//! - `DeclarativeConfig`: File-based catalog loading and validation

pub mod archive;
pub mod catalog;
pub mod chart;
pub mod envelope;
pub mod error;
pub mod fs;
pub mod values;

pub use catalog::{DeclarativeConfig, Model};
pub use chart::{Chart, ChartMetadata};
pub use error::{CoreError, Result};
pub use fs::BundleFs;
pub use values::Values;
