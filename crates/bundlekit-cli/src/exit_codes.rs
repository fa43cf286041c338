//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Validation error - bundle content rejected by its provisioner
pub const VALIDATION_ERROR: i32 = 2;

/// Configuration error - bad flags, config blob or provisioner class
pub const CONFIG_ERROR: i32 = 3;

/// Cluster error - the API server refused or could not be reached
pub const CLUSTER_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;
