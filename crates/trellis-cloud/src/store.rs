//! Declarative instance-group store
//!
//! The group-deletion action removes the logical InstanceGroup record after
//! the backing cloud resources are gone. The store is a capability trait so
//! the action can be tested without a cluster.

use async_trait::async_trait;
use kube::api::{Api, DeleteParams};
use kube::Client;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use trellis_common::crd::InstanceGroup;
use trellis_common::Error;

/// Capability trait over the declarative node-pool records
#[cfg_attr(test, automock)]
#[async_trait]
pub trait InstanceGroupStore: Send + Sync {
    /// Delete the InstanceGroup record by name
    ///
    /// Deleting a record that is already gone is not an error.
    async fn delete_instance_group(&self, name: &str) -> Result<(), Error>;
}

/// Store backed by InstanceGroup custom resources
pub struct KubeInstanceGroupStore {
    client: Client,
}

impl KubeInstanceGroupStore {
    /// Create a store using the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl InstanceGroupStore for KubeInstanceGroupStore {
    async fn delete_instance_group(&self, name: &str) -> Result<(), Error> {
        let api: Api<InstanceGroup> = Api::all(self.client.clone());
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => {
                debug!(group = %name, "deleted InstanceGroup record");
                Ok(())
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!(group = %name, "InstanceGroup record already gone");
                Ok(())
            }
            Err(e) => Err(Error::store_for(name, e.to_string())),
        }
    }
}
