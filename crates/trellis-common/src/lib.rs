//! Common types for Trellis: CRDs and errors

#![deny(missing_docs)]

pub mod crd;
pub mod error;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Label key linking a cluster node to the instance group that owns it
pub const INSTANCE_GROUP_LABEL: &str = "trellis.dev/instance-group";
