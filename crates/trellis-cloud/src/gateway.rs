//! Cloud provider gateway trait
//!
//! The rolling-update orchestrator and the group-deletion action talk to
//! the cloud through this capability trait. Each provider backend supplies
//! one implementation, selected by configuration at process start.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;

#[cfg(test)]
use mockall::automock;

use trellis_common::crd::{Cluster, InstanceGroup};
use trellis_common::Error;

use crate::model::{CloudInstanceGroup, CloudInstanceGroupInstance};

/// Capability trait over a cloud machine-pool backend
///
/// Implementations must classify every discovered member into `ready` or
/// `need_update` using their own staleness criteria, and must never return
/// a partially populated group: discovery either reflects provider truth
/// for a group or fails with a discovery error.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CloudProviderGateway: Send + Sync {
    /// Discover the live machine pools backing the given instance groups
    ///
    /// Groups with no backing pool are omitted from the result; when
    /// `warn_unmatched` is set the omission is logged as a warning.
    /// `known_nodes` is the current set of registered cluster nodes, used
    /// to link members to the nodes they joined as.
    async fn find_cloud_instance_groups(
        &self,
        cluster: &Cluster,
        instance_groups: &[InstanceGroup],
        warn_unmatched: bool,
        known_nodes: &[Node],
    ) -> Result<BTreeMap<String, CloudInstanceGroup>, Error>;

    /// Delete the entire backing pool
    ///
    /// Group state afterward is undefined and must be rediscovered.
    async fn delete_cloud_instance_group(&self, group: &CloudInstanceGroup) -> Result<(), Error>;

    /// Remove exactly one member instance
    ///
    /// The provider is expected to launch a replacement asynchronously if
    /// the pool's desired size calls for one.
    async fn delete_cloud_instance_group_member(
        &self,
        group: &CloudInstanceGroup,
        member: &CloudInstanceGroupInstance,
    ) -> Result<(), Error>;
}
