//! Cloud machine-pool model and provider gateway for Trellis
//!
//! This crate owns the provider-agnostic view of "a pool of cloud
//! instances backing an InstanceGroup": the value types discovered on
//! every pass, the [`CloudProviderGateway`] capability trait the rollout
//! core consumes, and the Cluster API implementation of that trait.

#![deny(missing_docs)]

pub mod capi;
pub mod gateway;
pub mod model;
pub mod store;

pub use capi::CapiGateway;
pub use gateway::CloudProviderGateway;
pub use model::{CloudInstanceGroup, CloudInstanceGroupInstance, CloudObject};
pub use store::{InstanceGroupStore, KubeInstanceGroupStore};
