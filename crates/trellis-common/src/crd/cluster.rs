//! Cluster Custom Resource Definition
//!
//! The Cluster CR is the declared shape of the whole cluster. Trellis only
//! reads it: discovery and validation take it by reference to know which
//! cluster is being reconciled.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Specification for a Cluster
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "trellis.dev",
    version = "v1alpha1",
    kind = "Cluster",
    plural = "clusters",
    namespaced = false,
    printcolumn = r#"{"name":"K8s","type":"string","jsonPath":".spec.kubernetesVersion"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Kubernetes version the cluster runs
    pub kubernetes_version: String,

    /// Namespace holding the machine objects backing this cluster
    ///
    /// Machine pools live in a per-cluster namespace; discovery scopes its
    /// queries here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_namespace: Option<String>,
}

impl Cluster {
    /// Name of this cluster, or "unknown" if metadata is incomplete
    pub fn cluster_name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or("unknown")
    }

    /// Namespace to query for backing machine objects
    pub fn machine_namespace(&self) -> &str {
        self.spec.machine_namespace.as_deref().unwrap_or("default")
    }
}
