//! Delete instance group command

use std::sync::Arc;

use clap::Args;
use kube::Api;
use tracing::info;

use trellis_cloud::{CapiGateway, KubeInstanceGroupStore};
use trellis_common::crd::InstanceGroup;
use trellis_rollout::GroupDeleter;

use crate::{Error, Result};

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Name of the instance group to delete
    pub name: String,

    /// Actually delete; without this flag the command only reports the plan
    #[arg(long)]
    pub yes: bool,
}

pub async fn run(args: DeleteArgs) -> Result<()> {
    let client = super::client().await?;
    let cluster = super::load_cluster(&client).await?;

    let api: Api<InstanceGroup> = Api::all(client.clone());
    let instance_group = match api.get_opt(&args.name).await? {
        Some(ig) => ig,
        None => return Err(Error::InstanceGroupNotFound { name: args.name }),
    };

    if !args.yes {
        info!(
            group = %args.name,
            "would delete instance group and its backing cloud pool, rerun with --yes"
        );
        return Ok(());
    }

    let deleter = GroupDeleter::new(
        Arc::new(CapiGateway::new(client.clone())),
        Arc::new(KubeInstanceGroupStore::new(client)),
    );
    deleter.delete_instance_group(&cluster, &instance_group).await?;
    info!(group = %args.name, "instance group deleted");
    Ok(())
}
