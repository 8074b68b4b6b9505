//! Cluster validator
//!
//! A validation pass is a point-in-time check that every declared instance
//! group has the expected number of healthy, registered nodes. Any
//! unhealthy condition is an error; the rolling-update orchestrator treats
//! any non-error result as "healthy right now".

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::api::Api;
use kube::Client;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use trellis_common::crd::{Cluster, InstanceGroup};
use trellis_common::{Error, INSTANCE_GROUP_LABEL};

/// Successful validation outcome
#[derive(Clone, Debug, Default)]
pub struct ValidationReport {
    /// Number of registered nodes observed
    pub nodes: usize,
    /// Number of nodes that were Ready
    pub ready_nodes: usize,
}

/// Capability trait for point-in-time cluster health checks
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterValidator: Send + Sync {
    /// Check that all declared instance groups are healthy
    ///
    /// Returns an error describing every unhealthy condition found; the
    /// caller treats any error as "not yet healthy".
    async fn validate(
        &self,
        cluster: &Cluster,
        instance_groups: &[InstanceGroup],
    ) -> Result<ValidationReport, Error>;
}

/// Validator backed by the cluster API server's node list
pub struct KubeClusterValidator {
    client: Client,
}

impl KubeClusterValidator {
    /// Create a validator using the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterValidator for KubeClusterValidator {
    async fn validate(
        &self,
        cluster: &Cluster,
        instance_groups: &[InstanceGroup],
    ) -> Result<ValidationReport, Error> {
        let api: Api<Node> = Api::all(self.client.clone());
        let nodes = api.list(&Default::default()).await?;
        validate_nodes(cluster, instance_groups, &nodes.items)
    }
}

/// Core validation logic over an observed node list
///
/// Bastion groups are skipped: their members never register as nodes.
pub fn validate_nodes(
    cluster: &Cluster,
    instance_groups: &[InstanceGroup],
    nodes: &[Node],
) -> Result<ValidationReport, Error> {
    let mut failures: Vec<String> = Vec::new();

    for ig in instance_groups {
        if ig.is_bastion() {
            continue;
        }
        let name = ig.metadata.name.as_deref().unwrap_or("unknown");
        let members: Vec<&Node> = nodes
            .iter()
            .filter(|n| node_instance_group(n) == Some(name))
            .collect();

        let ready = members.iter().filter(|n| node_is_ready(n)).count();
        if ready < ig.spec.min_size as usize {
            failures.push(format!(
                "instance group {name} has {ready} ready nodes, wants at least {}",
                ig.spec.min_size
            ));
        }
        for node in members.iter().filter(|n| !node_is_ready(n)) {
            failures.push(format!(
                "node {} in instance group {name} is not ready",
                node.metadata.name.as_deref().unwrap_or("unknown")
            ));
        }
    }

    if failures.is_empty() {
        let report = ValidationReport {
            nodes: nodes.len(),
            ready_nodes: nodes.iter().filter(|n| node_is_ready(n)).count(),
        };
        debug!(
            cluster = %cluster.cluster_name(),
            nodes = report.nodes,
            ready = report.ready_nodes,
            "cluster validated"
        );
        Ok(report)
    } else {
        Err(Error::validation_for(
            cluster.cluster_name(),
            failures.join("; "),
        ))
    }
}

/// Instance group a node belongs to, from its trellis label
fn node_instance_group(node: &Node) -> Option<&str> {
    node.metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(INSTANCE_GROUP_LABEL))
        .map(String::as_str)
}

/// Whether the node reports a Ready=True condition
fn node_is_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
}
