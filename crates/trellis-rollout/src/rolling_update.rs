//! Rolling-update orchestrator
//!
//! Replaces the members of one cloud instance group, strictly one at a
//! time: drain the node, delete the member, give the provider time to
//! launch a replacement, then validate the cluster before touching the
//! next member. Sequential processing is deliberate; it bounds how much
//! capacity a single rolling update can take away at once.
//!
//! Nothing here is persisted. A fatal error leaves the remaining members
//! untouched, and a later run recomputes the replacement set from live
//! provider state, so re-running after a failure resumes where it stopped.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use trellis_cloud::{CloudInstanceGroup, CloudProviderGateway};
use trellis_common::crd::{Cluster, InstanceGroup};
use trellis_common::Error;

use crate::drain::NodeDrainer;
use crate::poller::ValidationPoller;
use crate::validate::ClusterValidator;

/// Policy and timing configuration for one rolling update
#[derive(Clone, Debug)]
pub struct RollingUpdateOptions {
    /// Replace ready members too, not just stale ones
    pub force: bool,

    /// Pure infrastructure churn: skip all draining and validation
    pub cloud_only: bool,

    /// Abort the run when a drain fails (default: log and delete anyway)
    pub fail_on_drain_error: bool,

    /// Abort the run when validation fails (default: log and continue)
    pub fail_on_validate: bool,

    /// Settle time after a successful drain, before deletion
    pub drain_interval: Duration,

    /// Settle time after deleting a member, before validating; also the
    /// validation deadline for that member's replacement
    pub inter_replacement_wait: Duration,
}

impl Default for RollingUpdateOptions {
    fn default() -> Self {
        Self {
            force: false,
            cloud_only: false,
            fail_on_drain_error: false,
            fail_on_validate: false,
            drain_interval: Duration::from_secs(90),
            inter_replacement_wait: Duration::from_secs(240),
        }
    }
}

/// Orchestrates the rolling replacement of one group's members
///
/// The updater holds no state across invocations; independent updaters may
/// run concurrently against different groups without locking.
pub struct RollingUpdater {
    gateway: Arc<dyn CloudProviderGateway>,
    validator: Option<Arc<dyn ClusterValidator>>,
    drainer: Option<Arc<dyn NodeDrainer>>,
    poller: ValidationPoller,
    options: RollingUpdateOptions,
    cancel: CancellationToken,
}

impl RollingUpdater {
    /// Create an updater with the given gateway and options
    ///
    /// A validator and drainer must be attached unless `cloud_only` is set.
    pub fn new(gateway: Arc<dyn CloudProviderGateway>, options: RollingUpdateOptions) -> Self {
        Self {
            gateway,
            validator: None,
            drainer: None,
            poller: ValidationPoller::new(),
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Attach the cluster validator
    pub fn with_validator(mut self, validator: Arc<dyn ClusterValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Attach the node drainer
    pub fn with_drainer(mut self, drainer: Arc<dyn NodeDrainer>) -> Self {
        self.drainer = Some(drainer);
        self
    }

    /// Replace the default validation poller
    pub fn with_poller(mut self, poller: ValidationPoller) -> Self {
        self.poller = poller;
        self
    }

    /// Attach a cancellation token
    ///
    /// Cancellation takes effect between steps: the updater stops before
    /// the next member's deletion and returns a cancellation error, never
    /// interrupting a deletion call already in flight.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Roll the given group
    pub async fn run(
        &self,
        group: &CloudInstanceGroup,
        cluster: &Cluster,
        instance_groups: &[InstanceGroup],
    ) -> Result<(), Error> {
        let name = group.name();

        // Preconditions: fail before any cloud mutation is attempted.
        // With cloudonly set the cluster-side collaborators are unused and
        // may be absent.
        let collaborators = if self.options.cloud_only {
            None
        } else {
            let validator = self.validator.as_deref().ok_or_else(|| {
                Error::config("cluster validator required unless cloudonly is set")
            })?;
            let drainer = self
                .drainer
                .as_deref()
                .ok_or_else(|| Error::config("node drainer required unless cloudonly is set"))?;
            Some((validator, drainer))
        };

        let update = group.update_set(self.options.force);
        if update.is_empty() {
            debug!(group = %name, "no members need replacement");
            return Ok(());
        }

        let bastion = group.is_bastion();
        info!(
            group = %name,
            members = update.len(),
            force = self.options.force,
            cloudonly = self.options.cloud_only,
            bastion,
            "starting rolling update"
        );

        if !bastion {
            if let Some((validator, _)) = collaborators {
                self.preflight_validate(validator, name, cluster, instance_groups)
                    .await?;
            }
        }

        for member in update {
            if self.cancel.is_cancelled() {
                return Err(Error::cancelled(name));
            }

            if bastion {
                // Bastions have no replacement concept; a failed deletion
                // is always fatal, and there is nothing to drain or
                // validate afterwards.
                self.gateway
                    .delete_cloud_instance_group_member(group, member)
                    .await?;
                info!(group = %name, instance = %member.id, "deleted bastion member");
                continue;
            }

            match collaborators {
                Some((_, drainer)) => self.drain_member(drainer, name, member).await?,
                None => {
                    debug!(group = %name, instance = %member.id, "cloudonly set, skipping drain")
                }
            }

            self.gateway
                .delete_cloud_instance_group_member(group, member)
                .await?;
            info!(
                group = %name,
                instance = %member.id,
                "deleted member, waiting for replacement"
            );

            self.wait(name, self.options.inter_replacement_wait).await?;

            if let Some((validator, _)) = collaborators {
                self.postflight_validate(validator, name, member.id.as_str(), cluster, instance_groups)
                    .await?;
            }
        }

        info!(group = %name, "rolling update complete");
        Ok(())
    }

    /// One validation pass before any member is touched
    async fn preflight_validate(
        &self,
        validator: &dyn ClusterValidator,
        name: &str,
        cluster: &Cluster,
        instance_groups: &[InstanceGroup],
    ) -> Result<(), Error> {
        if let Err(e) = validator.validate(cluster, instance_groups).await {
            if self.options.fail_on_validate {
                return Err(Error::validation_for(name, e.to_string()));
            }
            warn!(
                group = %name,
                error = %e,
                "cluster not healthy before rolling update, continuing"
            );
        }
        Ok(())
    }

    /// Drain a member's node, applying the drain failure policy
    ///
    /// Members without a registered node are replaced without
    /// workload-safety checks: there is nothing to drain, and keeping the
    /// stale instance would be worse. This is deliberate policy, not an
    /// oversight.
    async fn drain_member(
        &self,
        drainer: &dyn NodeDrainer,
        name: &str,
        member: &trellis_cloud::CloudInstanceGroupInstance,
    ) -> Result<(), Error> {
        let Some(node) = member.node.as_deref() else {
            warn!(
                group = %name,
                instance = %member.id,
                "member has no registered node, skipping drain"
            );
            return Ok(());
        };

        match drainer.drain(node).await {
            Ok(()) => self.wait(name, self.options.drain_interval).await,
            Err(e) if self.options.fail_on_drain_error => Err(e),
            Err(e) => {
                warn!(
                    group = %name,
                    node = %node,
                    error = %e,
                    "drain failed, proceeding with deletion"
                );
                Ok(())
            }
        }
    }

    /// Poll validation after a member's replacement, applying policy
    async fn postflight_validate(
        &self,
        validator: &dyn ClusterValidator,
        name: &str,
        instance: &str,
        cluster: &Cluster,
        instance_groups: &[InstanceGroup],
    ) -> Result<(), Error> {
        let result = self
            .poller
            .validate_with_deadline(
                validator,
                cluster,
                instance_groups,
                self.options.inter_replacement_wait,
                &self.cancel,
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.is_cancelled() => Err(Error::cancelled(name)),
            // A timeout keeps its variant so a slow cluster stays
            // distinguishable from one validation reported unhealthy.
            Err(Error::ValidationTimeout { waited, .. }) if self.options.fail_on_validate => {
                Err(Error::validation_timeout_after(name, instance, waited))
            }
            Err(e) if self.options.fail_on_validate => {
                Err(Error::validation_after(name, instance, e.to_string()))
            }
            Err(e) => {
                warn!(
                    group = %name,
                    instance = %instance,
                    error = %e,
                    "cluster failed to validate after replacement, continuing"
                );
                Ok(())
            }
        }
    }

    /// Cancellable wall-clock wait
    async fn wait(&self, name: &str, duration: Duration) -> Result<(), Error> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(Error::cancelled(name)),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}
