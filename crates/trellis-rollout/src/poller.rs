//! Validation poller
//!
//! Retries the cluster validator on a fixed interval until it succeeds, a
//! deadline passes, or the caller cancels. One attempt always runs
//! immediately so deadlines shorter than the poll interval still get a
//! chance to succeed.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use trellis_common::crd::{Cluster, InstanceGroup};
use trellis_common::Error;

use crate::validate::{ClusterValidator, ValidationReport};

/// Default period between validation attempts
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Polls a cluster validator until success, deadline, or cancellation
#[derive(Clone, Debug)]
pub struct ValidationPoller {
    interval: Duration,
}

impl Default for ValidationPoller {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ValidationPoller {
    /// Create a poller with the default interval
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a poller with a custom interval
    pub fn with_interval(interval: Duration) -> Self {
        Self { interval }
    }

    /// Re-attempt validation until it succeeds or `deadline` elapses
    ///
    /// The first attempt runs immediately. After that the wait is a select
    /// over three futures: a one-shot deadline sleep, a repeating tick, and
    /// the caller's cancellation token. All timers are owned by this future
    /// and dropped on return, so nothing leaks whichever branch fires.
    pub async fn validate_with_deadline(
        &self,
        validator: &dyn ClusterValidator,
        cluster: &Cluster,
        instance_groups: &[InstanceGroup],
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> Result<ValidationReport, Error> {
        let started = Instant::now();

        match validator.validate(cluster, instance_groups).await {
            Ok(report) => return Ok(report),
            Err(e) => debug!(error = %e, "cluster not yet healthy"),
        }

        let deadline_sleep = tokio::time::sleep_until(started + deadline);
        tokio::pin!(deadline_sleep);
        let mut ticker = tokio::time::interval_at(started + self.interval, self.interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(Error::cancelled(cluster.cluster_name()));
                }
                _ = &mut deadline_sleep => {
                    return Err(Error::validation_timeout(started.elapsed()));
                }
                _ = ticker.tick() => {
                    match validator.validate(cluster, instance_groups).await {
                        Ok(report) => return Ok(report),
                        Err(e) => debug!(error = %e, "cluster not yet healthy"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::MockClusterValidator;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use trellis_common::crd::ClusterSpec;

    fn cluster() -> Cluster {
        Cluster {
            metadata: ObjectMeta {
                name: Some("test-cluster".to_string()),
                ..Default::default()
            },
            spec: ClusterSpec::default(),
        }
    }

    fn failing_until(successful_call: usize) -> (MockClusterValidator, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let mut validator = MockClusterValidator::new();
        validator.expect_validate().returning(move |_, _| {
            let n = seen.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= successful_call {
                Ok(ValidationReport::default())
            } else {
                Err(Error::validation_for("test-cluster", "not yet"))
            }
        });
        (validator, calls)
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_once_validator_recovers() {
        // Validator succeeds on its 3rd call; with a 10s tick that happens
        // at t=20s, well inside a 60s deadline.
        let (validator, calls) = failing_until(3);
        let poller = ValidationPoller::with_interval(Duration::from_secs(10));

        let result = poller
            .validate_with_deadline(
                &validator,
                &cluster(),
                &[],
                Duration::from_secs(60),
                &CancellationToken::new(),
            )
            .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_runs_even_with_tiny_deadline() {
        // A deadline shorter than one tick still gets the immediate attempt.
        let (validator, calls) = failing_until(1);
        let poller = ValidationPoller::with_interval(Duration::from_secs(30));

        let result = poller
            .validate_with_deadline(
                &validator,
                &cluster(),
                &[],
                Duration::from_millis(1),
                &CancellationToken::new(),
            )
            .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_without_extra_attempts() {
        // Deadline fires before the first tick: exactly one attempt happens
        // and the error is a timeout naming the elapsed duration.
        let (validator, calls) = failing_until(usize::MAX);
        let poller = ValidationPoller::with_interval(Duration::from_secs(30));

        let err = poller
            .validate_with_deadline(
                &validator,
                &cluster(),
                &[],
                Duration::from_secs(5),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ValidationTimeout { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_polling() {
        let (validator, _) = failing_until(usize::MAX);
        let poller = ValidationPoller::with_interval(Duration::from_secs(10));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = poller
            .validate_with_deadline(
                &validator,
                &cluster(),
                &[],
                Duration::from_secs(600),
                &cancel,
            )
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
    }
}
