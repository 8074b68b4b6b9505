//! Instance group deletion
//!
//! Tears down a node pool that has been removed from the cluster
//! definition: the backing cloud pool first, then the declarative record.
//! That ordering means a crash mid-operation can only leave a record with
//! no backing resource, which a retry cleans up; the reverse would leave
//! orphaned cloud machines nothing points at.

use std::sync::Arc;

use tracing::{info, warn};

use trellis_cloud::{CloudProviderGateway, InstanceGroupStore};
use trellis_common::crd::{Cluster, InstanceGroup};
use trellis_common::Error;

/// Deletes an instance group and its backing cloud pool
pub struct GroupDeleter {
    gateway: Arc<dyn CloudProviderGateway>,
    store: Arc<dyn InstanceGroupStore>,
}

impl GroupDeleter {
    /// Create a deleter over the given gateway and record store
    pub fn new(gateway: Arc<dyn CloudProviderGateway>, store: Arc<dyn InstanceGroupStore>) -> Self {
        Self { gateway, store }
    }

    /// Delete the instance group's cloud pool, then its record
    pub async fn delete_instance_group(
        &self,
        cluster: &Cluster,
        instance_group: &InstanceGroup,
    ) -> Result<(), Error> {
        let name = instance_group
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| Error::config("instance group must have a name"))?;

        // Fresh single-group discovery; whatever was known before is stale.
        let groups = self
            .gateway
            .find_cloud_instance_groups(
                cluster,
                std::slice::from_ref(instance_group),
                false,
                &[],
            )
            .await?;
        let groups: Vec<_> = groups.into_values().collect();

        match groups.as_slice() {
            [] => {
                warn!(
                    group = %name,
                    "no backing cloud pool found, skipping cloud deletion"
                );
            }
            [group] => {
                self.gateway.delete_cloud_instance_group(group).await?;
                info!(group = %name, id = %group.id, "deleted backing cloud pool");
            }
            matched => {
                // Never guess which pool the caller meant.
                return Err(Error::ambiguous(name, matched.len()));
            }
        }

        self.store.delete_instance_group(name).await?;
        info!(group = %name, "deleted instance group record");
        Ok(())
    }
}
