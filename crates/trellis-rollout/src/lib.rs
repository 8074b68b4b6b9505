//! Rolling update orchestration for trellis node pools
//!
//! Replaces outdated pool members one at a time, draining workloads and
//! revalidating the cluster between replacements, and tears down pools
//! whose definition has been removed.

#![deny(missing_docs)]

pub mod delete_group;
pub mod drain;
pub mod poller;
pub mod rolling_update;
pub mod validate;

pub use delete_group::GroupDeleter;
pub use drain::{KubeNodeDrainer, NodeDrainer};
pub use poller::{ValidationPoller, DEFAULT_POLL_INTERVAL};
pub use rolling_update::{RollingUpdateOptions, RollingUpdater};
pub use validate::{ClusterValidator, KubeClusterValidator, ValidationReport};
