//! Cluster API gateway
//!
//! Machine pools are backed by Cluster API objects: an InstanceGroup maps
//! to a MachineDeployment of the same name, its members are Machines, and
//! staleness is judged by the revision of the MachineSet that owns each
//! Machine versus the deployment's current revision. Deleting a Machine
//! makes its MachineSet launch a replacement, which is exactly the
//! replace-one-member contract the gateway trait requires.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, DynamicObject, GroupVersionKind, ListParams};
use kube::discovery::ApiResource;
use kube::{Client, ResourceExt};
use tracing::{debug, warn};

use trellis_common::crd::{Cluster, InstanceGroup};
use trellis_common::Error;

use crate::gateway::CloudProviderGateway;
use crate::model::{CloudInstanceGroup, CloudInstanceGroupInstance, CloudObject};

/// Cluster API group for machine objects
const CAPI_GROUP: &str = "cluster.x-k8s.io";

/// Cluster API version (v1beta2 as of CAPI v1.11+)
const CAPI_VERSION: &str = "v1beta2";

/// Label linking MachineSets and Machines to their MachineDeployment
const DEPLOYMENT_NAME_LABEL: &str = "cluster.x-k8s.io/deployment-name";

/// Annotation carrying a MachineDeployment/MachineSet rollout revision
const REVISION_ANNOTATION: &str = "machinedeployment.clusters.x-k8s.io/revision";

/// Autoscaler size bound annotations on the MachineDeployment
const AUTOSCALER_MIN_ANNOTATION: &str =
    "cluster.x-k8s.io/cluster-api-autoscaler-node-group-min-size";
const AUTOSCALER_MAX_ANNOTATION: &str =
    "cluster.x-k8s.io/cluster-api-autoscaler-node-group-max-size";

/// Handle for whole-pool operations, attached to discovered groups
#[derive(Clone, Debug)]
struct CapiGroupRef {
    namespace: String,
    name: String,
}

/// Handle for single-machine operations, attached to discovered members
#[derive(Clone, Debug)]
struct CapiMachineRef {
    namespace: String,
    name: String,
}

/// Gateway over Cluster API machine pools
pub struct CapiGateway {
    client: Client,
}

impl CapiGateway {
    /// Create a gateway using the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str, kind: &str) -> Api<DynamicObject> {
        Api::namespaced_with(
            self.client.clone(),
            namespace,
            &ApiResource::from_gvk(&GroupVersionKind {
                group: CAPI_GROUP.to_string(),
                version: CAPI_VERSION.to_string(),
                kind: kind.to_string(),
            }),
        )
    }

    /// Discover one instance group's backing pool, or None if it has none
    async fn discover_group(
        &self,
        namespace: &str,
        instance_group: &InstanceGroup,
        known_nodes: &[Node],
    ) -> Result<Option<CloudInstanceGroup>, Error> {
        let name = instance_group
            .metadata
            .name
            .as_deref()
            .ok_or_else(|| Error::config("instance group must have a name"))?;

        let md_api = self.api(namespace, "MachineDeployment");
        let md = match md_api.get(name).await {
            Ok(md) => md,
            Err(kube::Error::Api(ae)) if ae.code == 404 => return Ok(None),
            Err(e) => return Err(Error::discovery_for(name, e.to_string())),
        };

        let current_revision = annotation_revision(&md.metadata);

        // Revision of each MachineSet under this deployment; Machines are
        // classified by the revision of the MachineSet that owns them.
        let selector = format!("{}={}", DEPLOYMENT_NAME_LABEL, name);
        let machine_sets = self
            .api(namespace, "MachineSet")
            .list(&ListParams::default().labels(&selector))
            .await
            .map_err(|e| Error::discovery_for(name, e.to_string()))?;
        let set_revisions: BTreeMap<String, Option<i64>> = machine_sets
            .items
            .iter()
            .map(|ms| (ms.name_any(), annotation_revision(&ms.metadata)))
            .collect();

        let mut machines = self
            .api(namespace, "Machine")
            .list(&ListParams::default().labels(&selector))
            .await
            .map_err(|e| Error::discovery_for(name, e.to_string()))?
            .items;
        machines.sort_by_key(|m| m.name_any());

        let registered: std::collections::BTreeSet<&str> = known_nodes
            .iter()
            .filter_map(|n| n.metadata.name.as_deref())
            .collect();

        let mut ready = Vec::new();
        let mut need_update = Vec::new();
        for machine in &machines {
            let machine_name = machine.name_any();
            let owner_revision = owner_machine_set(&machine.metadata)
                .and_then(|ms| set_revisions.get(ms).copied())
                .flatten();

            let node = machine_node_name(&machine.data)
                .filter(|n| registered.contains(n))
                .map(String::from);

            let member = CloudInstanceGroupInstance {
                id: machine_name.clone(),
                node,
                cloud_object: CloudObject::new(CapiMachineRef {
                    namespace: namespace.to_string(),
                    name: machine_name,
                }),
            };

            if is_stale(owner_revision, current_revision) {
                need_update.push(member);
            } else {
                ready.push(member);
            }
        }

        let replicas = md
            .data
            .get("spec")
            .and_then(|s| s.get("replicas"))
            .and_then(|r| r.as_u64())
            .unwrap_or(0) as u32;
        let status = md
            .data
            .get("status")
            .and_then(|s| s.get("phase"))
            .and_then(|p| p.as_str())
            .unwrap_or("Unknown")
            .to_string();

        Ok(Some(CloudInstanceGroup {
            instance_group: instance_group.clone(),
            id: format!("{}/{}", namespace, name),
            min_size: annotation_size(&md.metadata, AUTOSCALER_MIN_ANNOTATION).unwrap_or(replicas),
            max_size: annotation_size(&md.metadata, AUTOSCALER_MAX_ANNOTATION).unwrap_or(replicas),
            status,
            ready,
            need_update,
            cloud_object: CloudObject::new(CapiGroupRef {
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
        }))
    }
}

#[async_trait]
impl CloudProviderGateway for CapiGateway {
    async fn find_cloud_instance_groups(
        &self,
        cluster: &Cluster,
        instance_groups: &[InstanceGroup],
        warn_unmatched: bool,
        known_nodes: &[Node],
    ) -> Result<BTreeMap<String, CloudInstanceGroup>, Error> {
        let namespace = cluster.machine_namespace();
        let mut groups = BTreeMap::new();

        for ig in instance_groups {
            match self.discover_group(namespace, ig, known_nodes).await? {
                Some(group) => {
                    debug!(
                        group = %group.name(),
                        ready = group.ready.len(),
                        need_update = group.need_update.len(),
                        "discovered machine pool"
                    );
                    groups.insert(group.name().to_string(), group);
                }
                None if warn_unmatched => {
                    warn!(
                        group = %ig.metadata.name.as_deref().unwrap_or("unknown"),
                        namespace = %namespace,
                        "no MachineDeployment backs this instance group"
                    );
                }
                None => {}
            }
        }

        Ok(groups)
    }

    async fn delete_cloud_instance_group(&self, group: &CloudInstanceGroup) -> Result<(), Error> {
        let group_ref = group
            .cloud_object
            .downcast_ref::<CapiGroupRef>()
            .ok_or_else(|| {
                Error::delete_for(group.name(), "cloud object was not produced by this gateway")
            })?;

        let api = self.api(&group_ref.namespace, "MachineDeployment");
        match api.delete(&group_ref.name, &DeleteParams::default()).await {
            Ok(_) => {
                debug!(group = %group.name(), "deleted MachineDeployment");
                Ok(())
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                warn!(group = %group.name(), "MachineDeployment already gone");
                Ok(())
            }
            Err(e) => Err(Error::delete_for(group.name(), e.to_string())),
        }
    }

    async fn delete_cloud_instance_group_member(
        &self,
        group: &CloudInstanceGroup,
        member: &CloudInstanceGroupInstance,
    ) -> Result<(), Error> {
        let machine_ref = member
            .cloud_object
            .downcast_ref::<CapiMachineRef>()
            .ok_or_else(|| {
                Error::delete_instance(
                    group.name(),
                    &member.id,
                    "cloud object was not produced by this gateway",
                )
            })?;

        let api = self.api(&machine_ref.namespace, "Machine");
        match api.delete(&machine_ref.name, &DeleteParams::default()).await {
            Ok(_) => {
                debug!(group = %group.name(), machine = %member.id, "deleted Machine");
                Ok(())
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!(group = %group.name(), machine = %member.id, "Machine already gone");
                Ok(())
            }
            Err(e) => Err(Error::delete_instance(group.name(), &member.id, e.to_string())),
        }
    }
}

/// Parse the rollout revision annotation from object metadata
fn annotation_revision(meta: &ObjectMeta) -> Option<i64> {
    meta.annotations
        .as_ref()
        .and_then(|a| a.get(REVISION_ANNOTATION))
        .and_then(|v| v.parse().ok())
}

/// Parse an autoscaler size-bound annotation
fn annotation_size(meta: &ObjectMeta, key: &str) -> Option<u32> {
    meta.annotations
        .as_ref()
        .and_then(|a| a.get(key))
        .and_then(|v| v.parse().ok())
}

/// Name of the MachineSet owning a Machine
fn owner_machine_set(meta: &ObjectMeta) -> Option<&str> {
    meta.owner_references
        .as_ref()?
        .iter()
        .find(|o| o.kind == "MachineSet")
        .map(|o| o.name.as_str())
}

/// Registered node name recorded on a Machine's status
fn machine_node_name(data: &serde_json::Value) -> Option<&str> {
    data.get("status")
        .and_then(|s| s.get("nodeRef"))
        .and_then(|n| n.get("name"))
        .and_then(|n| n.as_str())
}

/// A Machine is stale when its MachineSet predates the deployment's
/// current revision, or when its lineage cannot be established at all.
fn is_stale(owner_revision: Option<i64>, current_revision: Option<i64>) -> bool {
    match (owner_revision, current_revision) {
        (Some(owner), Some(current)) => owner < current,
        // Deployment has rolled but the machine's lineage is unknown
        (None, Some(_)) => true,
        // No rollout has been recorded; nothing can be stale
        (_, None) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
    use serde_json::json;

    fn meta_with_annotations(pairs: &[(&str, &str)]) -> ObjectMeta {
        ObjectMeta {
            annotations: Some(
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    #[test]
    fn test_revision_annotation_parsing() {
        let meta = meta_with_annotations(&[(REVISION_ANNOTATION, "3")]);
        assert_eq!(annotation_revision(&meta), Some(3));

        let meta = meta_with_annotations(&[(REVISION_ANNOTATION, "not-a-number")]);
        assert_eq!(annotation_revision(&meta), None);

        assert_eq!(annotation_revision(&ObjectMeta::default()), None);
    }

    #[test]
    fn test_autoscaler_bounds_fall_back_when_absent() {
        let meta = meta_with_annotations(&[(AUTOSCALER_MIN_ANNOTATION, "2")]);
        assert_eq!(annotation_size(&meta, AUTOSCALER_MIN_ANNOTATION), Some(2));
        assert_eq!(annotation_size(&meta, AUTOSCALER_MAX_ANNOTATION), None);
    }

    #[test]
    fn test_staleness_matrix() {
        // Owner predates the current rollout
        assert!(is_stale(Some(2), Some(3)));
        // Owner is the current rollout
        assert!(!is_stale(Some(3), Some(3)));
        // Unknown lineage after a rollout counts as stale
        assert!(is_stale(None, Some(1)));
        // No rollout recorded: nothing is stale
        assert!(!is_stale(Some(1), None));
        assert!(!is_stale(None, None));
    }

    #[test]
    fn test_owner_machine_set_extraction() {
        let meta = ObjectMeta {
            owner_references: Some(vec![
                OwnerReference {
                    api_version: "cluster.x-k8s.io/v1beta2".to_string(),
                    kind: "MachineSet".to_string(),
                    name: "nodes-7d9f".to_string(),
                    uid: "uid-1".to_string(),
                    ..Default::default()
                },
                OwnerReference {
                    api_version: "v1".to_string(),
                    kind: "ConfigMap".to_string(),
                    name: "unrelated".to_string(),
                    uid: "uid-2".to_string(),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        };
        assert_eq!(owner_machine_set(&meta), Some("nodes-7d9f"));
        assert_eq!(owner_machine_set(&ObjectMeta::default()), None);
    }

    #[test]
    fn test_machine_node_name_extraction() {
        let data = json!({
            "status": { "nodeRef": { "kind": "Node", "name": "ip-10-0-1-5" } }
        });
        assert_eq!(machine_node_name(&data), Some("ip-10-0-1-5"));

        // A machine that never joined has no nodeRef
        let data = json!({ "status": { "phase": "Provisioning" } });
        assert_eq!(machine_node_name(&data), None);
    }
}
