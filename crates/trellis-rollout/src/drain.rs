//! Node drain adapter
//!
//! Before a member instance is deleted, its node is cordoned and its
//! workloads are evicted. Drain runs with force semantics: pods without a
//! controller are evicted anyway, DaemonSet-managed and mirror pods are
//! left alone (the kubelet restarts them wherever the node goes).

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, EvictParams, ListParams, Patch, PatchParams};
use kube::{Client, ResourceExt};
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use trellis_common::Error;

/// Annotation marking static pods mirrored into the API server
const MIRROR_POD_ANNOTATION: &str = "kubernetes.io/config.mirror";

/// Field manager for node patches
const FIELD_MANAGER: &str = "trellis-rollout";

/// Capability trait for taking workloads off a node
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NodeDrainer: Send + Sync {
    /// Mark a node unschedulable
    async fn cordon(&self, node: &str) -> Result<(), Error>;

    /// Cordon the node, then evict its pods
    ///
    /// DaemonSet-managed pods, mirror pods, and pods already terminating
    /// are skipped; everything else is evicted through the eviction
    /// subresource so PodDisruptionBudgets are honored.
    async fn drain(&self, node: &str) -> Result<(), Error>;
}

/// Drainer backed by the cluster API server
pub struct KubeNodeDrainer {
    client: Client,
}

impl KubeNodeDrainer {
    /// Create a drainer using the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NodeDrainer for KubeNodeDrainer {
    async fn cordon(&self, node: &str) -> Result<(), Error> {
        let api: Api<Node> = Api::all(self.client.clone());
        let patch = serde_json::json!({
            "spec": { "unschedulable": true }
        });

        api.patch(node, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await
            .map_err(|e| Error::drain_for(node, format!("cordon failed: {e}")))?;
        info!(node = %node, "cordoned node");
        Ok(())
    }

    async fn drain(&self, node: &str) -> Result<(), Error> {
        self.cordon(node).await?;

        let pods: Api<Pod> = Api::all(self.client.clone());
        let on_node = pods
            .list(&ListParams::default().fields(&format!("spec.nodeName={node}")))
            .await
            .map_err(|e| Error::drain_for(node, format!("listing pods failed: {e}")))?;

        let mut evicted = 0;
        for pod in on_node.items.iter().filter(|p| needs_eviction(p)) {
            let name = pod.name_any();
            let namespace = pod.namespace().unwrap_or_else(|| "default".to_string());
            let api: Api<Pod> = Api::namespaced(self.client.clone(), &namespace);

            match api.evict(&name, &EvictParams::default()).await {
                Ok(_) => {
                    debug!(node = %node, pod = %name, namespace = %namespace, "evicted pod");
                    evicted += 1;
                }
                // Pod finished or was deleted while we were iterating
                Err(kube::Error::Api(ae)) if ae.code == 404 => {}
                Err(e) => {
                    return Err(Error::drain_for(
                        node,
                        format!("evicting pod {namespace}/{name} failed: {e}"),
                    ))
                }
            }
        }

        info!(node = %node, evicted, "drained node");
        Ok(())
    }
}

/// Whether a pod must be evicted during drain
///
/// DaemonSet pods are restarted on the node regardless, mirror pods are
/// projections of static pods the API server cannot delete, and pods that
/// are already terminating need no help.
fn needs_eviction(pod: &Pod) -> bool {
    !is_daemon_set_pod(pod) && !is_mirror_pod(pod) && pod.metadata.deletion_timestamp.is_none()
}

fn is_daemon_set_pod(pod: &Pod) -> bool {
    pod.metadata
        .owner_references
        .as_ref()
        .is_some_and(|owners| owners.iter().any(|o| o.kind == "DaemonSet"))
}

fn is_mirror_pod(pod: &Pod) -> bool {
    pod.metadata
        .annotations
        .as_ref()
        .is_some_and(|a| a.contains_key(MIRROR_POD_ANNOTATION))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference, Time};

    fn pod(meta: ObjectMeta) -> Pod {
        Pod {
            metadata: meta,
            ..Default::default()
        }
    }

    fn owned_by(kind: &str) -> ObjectMeta {
        ObjectMeta {
            owner_references: Some(vec![OwnerReference {
                api_version: "apps/v1".to_string(),
                kind: kind.to_string(),
                name: "owner".to_string(),
                uid: "uid".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }
    }

    #[test]
    fn test_daemonset_pods_are_skipped() {
        assert!(!needs_eviction(&pod(owned_by("DaemonSet"))));
        assert!(needs_eviction(&pod(owned_by("ReplicaSet"))));
    }

    #[test]
    fn test_mirror_pods_are_skipped() {
        let meta = ObjectMeta {
            annotations: Some(
                [(MIRROR_POD_ANNOTATION.to_string(), "hash".to_string())]
                    .into_iter()
                    .collect(),
            ),
            ..Default::default()
        };
        assert!(!needs_eviction(&pod(meta)));
    }

    #[test]
    fn test_terminating_pods_are_skipped() {
        let meta = ObjectMeta {
            deletion_timestamp: Some(Time(k8s_openapi::chrono::Utc::now())),
            ..Default::default()
        };
        assert!(!needs_eviction(&pod(meta)));
    }

    #[test]
    fn test_uncontrolled_pods_are_evicted_anyway() {
        // Force semantics: a bare pod with no owner still gets evicted
        assert!(needs_eviction(&pod(ObjectMeta::default())));
    }
}
