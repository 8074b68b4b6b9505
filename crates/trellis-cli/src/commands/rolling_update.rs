//! Rolling update command

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use kube::ResourceExt;
use tracing::{info, warn};

use trellis_cloud::{CapiGateway, CloudProviderGateway};
use trellis_common::crd::InstanceGroup;
use trellis_rollout::{
    KubeClusterValidator, KubeNodeDrainer, RollingUpdateOptions, RollingUpdater,
};

use crate::{Error, Result};

#[derive(Args, Debug)]
pub struct RollingUpdateArgs {
    /// Instance groups to update (all groups if not specified)
    pub groups: Vec<String>,

    /// Replace up-to-date members too, not just outdated ones
    #[arg(long)]
    pub force: bool,

    /// Skip draining and validation, only replace cloud members
    #[arg(long)]
    pub cloudonly: bool,

    /// Abort the run when a node drain fails
    #[arg(long)]
    pub fail_on_drain_error: bool,

    /// Abort the run when cluster validation fails
    #[arg(long)]
    pub fail_on_validate_error: bool,

    /// Wait between replacing control plane members
    #[arg(long, value_parser = humantime::parse_duration, default_value = "5m")]
    pub master_interval: Duration,

    /// Wait between replacing worker members
    #[arg(long, value_parser = humantime::parse_duration, default_value = "4m")]
    pub node_interval: Duration,
}

pub async fn run(args: RollingUpdateArgs) -> Result<()> {
    let client = super::client().await?;
    let cluster = super::load_cluster(&client).await?;
    let instance_groups = super::load_instance_groups(&client).await?;

    let selected = select_groups(&instance_groups, &args.groups)?;
    if selected.is_empty() {
        info!("no instance groups to update");
        return Ok(());
    }

    let nodes = super::load_nodes(&client).await?;
    let gateway = Arc::new(CapiGateway::new(client.clone()));
    let cloud_groups = gateway
        .find_cloud_instance_groups(&cluster, &selected, true, &nodes)
        .await?;

    let cancel = super::shutdown_token();

    // Strictly sequential, control plane before workers, so an unhealthy
    // control plane stops the run before any worker capacity is touched.
    for instance_group in &selected {
        let name = instance_group.name_any();
        let Some(group) = cloud_groups.get(&name) else {
            warn!(group = %name, "no backing cloud pool, skipping");
            continue;
        };

        let wait = if instance_group.is_control_plane() {
            args.master_interval
        } else {
            args.node_interval
        };
        let options = RollingUpdateOptions {
            force: args.force,
            cloud_only: args.cloudonly,
            fail_on_drain_error: args.fail_on_drain_error,
            fail_on_validate: args.fail_on_validate_error,
            inter_replacement_wait: wait,
            ..RollingUpdateOptions::default()
        };

        let mut updater = RollingUpdater::new(gateway.clone(), options)
            .with_cancellation(cancel.clone());
        if !args.cloudonly {
            updater = updater
                .with_validator(Arc::new(KubeClusterValidator::new(client.clone())))
                .with_drainer(Arc::new(KubeNodeDrainer::new(client.clone())));
        }

        info!(group = %name, members = group.size(), "rolling update starting");
        updater.run(group, &cluster, &instance_groups).await?;
        info!(group = %name, "rolling update complete");
    }

    Ok(())
}

/// Resolve requested group names against the cluster's instance groups
///
/// An empty request selects every group. Output order is control plane
/// groups first, then the rest, each bucket in input order.
fn select_groups(
    instance_groups: &[InstanceGroup],
    requested: &[String],
) -> Result<Vec<InstanceGroup>> {
    let mut selected = Vec::new();
    if requested.is_empty() {
        selected.extend(instance_groups.iter().cloned());
    } else {
        for name in requested {
            let found = instance_groups
                .iter()
                .find(|ig| ig.metadata.name.as_deref() == Some(name))
                .ok_or_else(|| Error::InstanceGroupNotFound { name: name.clone() })?;
            selected.push(found.clone());
        }
    }
    selected.sort_by_key(|ig| !ig.is_control_plane());
    Ok(selected)
}
