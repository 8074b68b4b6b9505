//! CLI commands

use k8s_openapi::api::core::v1::Node;
use kube::api::ListParams;
use kube::{Api, Client};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use trellis_common::crd::{Cluster, InstanceGroup};

use crate::{Error, Result};

pub mod delete;
pub mod rolling_update;

/// Connect to the cluster using the ambient kubeconfig or in-cluster config
pub async fn client() -> Result<Client> {
    Ok(Client::try_default().await?)
}

/// Load the Cluster resource
///
/// Trellis manages exactly one cluster per API server; when several Cluster
/// resources exist the first by name wins and the rest are ignored.
pub async fn load_cluster(client: &Client) -> Result<Cluster> {
    let api: Api<Cluster> = Api::all(client.clone());
    let clusters = api.list(&ListParams::default()).await?;
    if clusters.items.len() > 1 {
        warn!(
            count = clusters.items.len(),
            "multiple Cluster resources found, using the first by name"
        );
    }
    clusters
        .items
        .into_iter()
        .next()
        .ok_or(Error::ClusterNotFound)
}

/// Load all InstanceGroup resources
pub async fn load_instance_groups(client: &Client) -> Result<Vec<InstanceGroup>> {
    let api: Api<InstanceGroup> = Api::all(client.clone());
    Ok(api.list(&ListParams::default()).await?.items)
}

/// Load all registered nodes
pub async fn load_nodes(client: &Client) -> Result<Vec<Node>> {
    let api: Api<Node> = Api::all(client.clone());
    Ok(api.list(&ListParams::default()).await?.items)
}

/// Cancellation token that fires on the first Ctrl-C
///
/// A second Ctrl-C kills the process the usual way; the token only asks the
/// orchestrator to stop cleanly between steps.
pub fn shutdown_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current step");
            trigger.cancel();
        }
    });
    cancel
}
