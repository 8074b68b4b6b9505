//! Custom Resource Definitions for Trellis

mod cluster;
mod instance_group;
mod types;

pub use cluster::{Cluster, ClusterSpec};
pub use instance_group::{InstanceGroup, InstanceGroupSpec};
pub use types::InstanceGroupRole;
