//! Error types for Trellis operations
//!
//! Errors are structured with fields to aid debugging in production.
//! Each variant carries the context a caller needs to re-run safely:
//! the instance group, the member instance, and the step that failed.

use std::time::Duration;

use thiserror::Error;

/// Main error type for Trellis operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Missing collaborator or invalid input, caught before any side effect
    #[error("configuration error: {message}")]
    Config {
        /// Description of what's missing or invalid
        message: String,
    },

    /// Cloud discovery failed or returned inconsistent data
    #[error("discovery error for {group}: {message}")]
    Discovery {
        /// Name of the instance group being discovered
        group: String,
        /// Description of what failed
        message: String,
    },

    /// More than one cloud resource matched a single logical group
    #[error("ambiguous match for {group}: {matches} cloud groups found")]
    Ambiguous {
        /// Name of the instance group
        group: String,
        /// Number of cloud groups that matched
        matches: usize,
    },

    /// Node drain failed; fatal only when FailOnDrainError is set
    #[error("drain error for node {node}: {message}")]
    Drain {
        /// Name of the node being drained
        node: String,
        /// Description of what failed
        message: String,
    },

    /// A requested cloud mutation did not complete; always fatal
    #[error("delete error for {group}{}: {message}", .instance.as_deref().map(|i| format!(" (instance {i})")).unwrap_or_default())]
    Delete {
        /// Name of the instance group
        group: String,
        /// Member instance being deleted, if the failure was per-member
        instance: Option<String>,
        /// Description of what failed
        message: String,
    },

    /// Cluster validation reported an unhealthy condition
    #[error("validation error for {group}{}: {message}", .instance.as_deref().map(|i| format!(" (after replacing {i})")).unwrap_or_default())]
    Validation {
        /// Name of the instance group under validation
        group: String,
        /// Member whose replacement triggered this validation, if any
        instance: Option<String>,
        /// Description of what's unhealthy
        message: String,
    },

    /// Validation did not succeed before the deadline
    #[error("cluster did not validate within {waited:?}{}{}", .group.as_deref().map(|g| format!(" for {g}")).unwrap_or_default(), .instance.as_deref().map(|i| format!(" (after replacing {i})")).unwrap_or_default())]
    ValidationTimeout {
        /// Total time spent polling before giving up
        waited: Duration,
        /// Instance group being updated, when known
        group: Option<String>,
        /// Member whose replacement was being awaited, if any
        instance: Option<String>,
    },

    /// Declarative record deletion failed
    #[error("store error for {group}: {message}")]
    Store {
        /// Name of the instance group record
        group: String,
        /// Description of what failed
        message: String,
    },

    /// Caller-requested cancellation, distinct from policy failures
    #[error("rolling update of {group} cancelled")]
    Cancelled {
        /// Name of the instance group being updated
        group: String,
    },
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a discovery error for an instance group
    pub fn discovery_for(group: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Discovery {
            group: group.into(),
            message: msg.into(),
        }
    }

    /// Create an ambiguous-match error
    pub fn ambiguous(group: impl Into<String>, matches: usize) -> Self {
        Self::Ambiguous {
            group: group.into(),
            matches,
        }
    }

    /// Create a drain error for a node
    pub fn drain_for(node: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Drain {
            node: node.into(),
            message: msg.into(),
        }
    }

    /// Create a delete error for a whole instance group
    pub fn delete_for(group: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Delete {
            group: group.into(),
            instance: None,
            message: msg.into(),
        }
    }

    /// Create a delete error for one member instance
    pub fn delete_instance(
        group: impl Into<String>,
        instance: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Delete {
            group: group.into(),
            instance: Some(instance.into()),
            message: msg.into(),
        }
    }

    /// Create a validation error without instance context
    pub fn validation_for(group: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            group: group.into(),
            instance: None,
            message: msg.into(),
        }
    }

    /// Create a validation error tied to a just-replaced member
    pub fn validation_after(
        group: impl Into<String>,
        instance: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            group: group.into(),
            instance: Some(instance.into()),
            message: msg.into(),
        }
    }

    /// Create a validation timeout error without group context
    pub fn validation_timeout(waited: Duration) -> Self {
        Self::ValidationTimeout {
            waited,
            group: None,
            instance: None,
        }
    }

    /// Create a validation timeout error tied to a just-replaced member
    pub fn validation_timeout_after(
        group: impl Into<String>,
        instance: impl Into<String>,
        waited: Duration,
    ) -> Self {
        Self::ValidationTimeout {
            waited,
            group: Some(group.into()),
            instance: Some(instance.into()),
        }
    }

    /// Create a store error for an instance group record
    pub fn store_for(group: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Store {
            group: group.into(),
            message: msg.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(group: impl Into<String>) -> Self {
        Self::Cancelled {
            group: group.into(),
        }
    }

    /// Get the instance group name if this error is associated with one
    pub fn group(&self) -> Option<&str> {
        match self {
            Error::Kube { .. } => None,
            Error::Config { .. } => None,
            Error::Discovery { group, .. } => Some(group),
            Error::Ambiguous { group, .. } => Some(group),
            Error::Drain { .. } => None,
            Error::Delete { group, .. } => Some(group),
            Error::Validation { group, .. } => Some(group),
            Error::ValidationTimeout { group, .. } => group.as_deref(),
            Error::Store { group, .. } => Some(group),
            Error::Cancelled { group } => Some(group),
        }
    }

    /// Get the member instance id if this error names one
    pub fn instance(&self) -> Option<&str> {
        match self {
            Error::Delete { instance, .. } => instance.as_deref(),
            Error::Validation { instance, .. } => instance.as_deref(),
            Error::ValidationTimeout { instance, .. } => instance.as_deref(),
            _ => None,
        }
    }

    /// Whether this is a validation-family error (soft by default policy)
    ///
    /// Both the point-in-time failure and the poller timeout are treated
    /// identically by the FailOnValidate policy; they stay distinct variants
    /// for observability.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::Validation { .. } | Error::ValidationTimeout { .. }
        )
    }

    /// Whether this error was caused by caller cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================================================
    // Story Tests: Error Propagation in Rolling Updates
    // ==========================================================================
    //
    // These tests demonstrate how errors flow through the system during a
    // rolling update. Each error category carries enough context for a safe
    // re-run: the group, the instance, and the step that failed.

    /// Story: preconditions fail before any cloud mutation
    ///
    /// When a collaborator is missing (no validator without cloudonly), the
    /// orchestrator returns a Config error before touching the cloud.
    #[test]
    fn story_config_errors_carry_no_group_context() {
        let err = Error::config("cluster validator required unless cloudonly is set");
        assert!(err.to_string().contains("configuration error"));
        assert_eq!(err.group(), None);
        assert_eq!(err.instance(), None);
    }

    /// Story: discovery failures abort before mutating anything
    #[test]
    fn story_discovery_errors_name_the_group() {
        let err = Error::discovery_for("nodes-us-east-1a", "provider API unreachable");
        assert!(err.to_string().contains("nodes-us-east-1a"));
        assert_eq!(err.group(), Some("nodes-us-east-1a"));
    }

    /// Story: an ambiguous cloud match is never auto-resolved
    #[test]
    fn story_ambiguous_matches_are_fatal_with_counts() {
        let err = Error::ambiguous("bastions", 2);
        assert!(err.to_string().contains("2 cloud groups"));
        assert_eq!(err.group(), Some("bastions"));
    }

    /// Story: delete errors name exactly where the run stopped
    ///
    /// A failed member deletion aborts the run; the error must reference the
    /// member so the operator knows which instance is in an unknown state.
    #[test]
    fn story_delete_errors_reference_the_failed_instance() {
        let err = Error::delete_instance("nodes", "i-0abc123", "scaling API returned 500");
        assert!(err.to_string().contains("i-0abc123"));
        assert_eq!(err.group(), Some("nodes"));
        assert_eq!(err.instance(), Some("i-0abc123"));

        // Whole-group deletion failures have no instance
        let err = Error::delete_for("nodes", "group delete rejected");
        assert_eq!(err.instance(), None);
    }

    /// Story: post-replacement validation failures reference the replaced member
    #[test]
    fn story_validation_errors_reference_the_replaced_instance() {
        let err = Error::validation_after("nodes", "i-0abc123", "1 node not ready");
        assert!(err.to_string().contains("after replacing i-0abc123"));
        assert_eq!(err.instance(), Some("i-0abc123"));
        assert!(err.is_validation());
    }

    /// Story: a timeout is distinguishable from a point-in-time failure
    ///
    /// Both fall under the FailOnValidate policy, but operators need to see
    /// whether the cluster was unhealthy or merely slow.
    #[test]
    fn story_validation_timeout_is_distinct_but_same_policy_family() {
        let timeout = Error::validation_timeout(Duration::from_secs(300));
        assert!(timeout.to_string().contains("300"));
        assert!(timeout.is_validation());
        assert!(matches!(timeout, Error::ValidationTimeout { .. }));

        let failed = Error::validation_for("nodes", "2 nodes not registered");
        assert!(failed.is_validation());
        assert!(!matches!(failed, Error::ValidationTimeout { .. }));
    }

    /// Story: a timeout after a replacement keeps both identity and context
    ///
    /// The orchestrator attaches group and member context to a poller
    /// timeout without collapsing it into a point-in-time failure.
    #[test]
    fn story_validation_timeout_carries_replacement_context() {
        let err = Error::validation_timeout_after("nodes", "i-0abc123", Duration::from_secs(240));
        assert!(matches!(err, Error::ValidationTimeout { .. }));
        assert_eq!(err.group(), Some("nodes"));
        assert_eq!(err.instance(), Some("i-0abc123"));
        assert!(err.to_string().contains("after replacing i-0abc123"));
    }

    /// Story: cancellation is not a policy failure
    #[test]
    fn story_cancellation_is_distinct_from_policy_failures() {
        let err = Error::cancelled("nodes");
        assert!(err.is_cancelled());
        assert!(!err.is_validation());
        assert_eq!(err.group(), Some("nodes"));
    }

    /// Story: drain errors carry the node, not the group
    ///
    /// Drain operates on a cluster node; the orchestrator adds group context
    /// when it decides whether the failure is fatal.
    #[test]
    fn story_drain_errors_name_the_node() {
        let err = Error::drain_for("ip-10-0-1-5", "pod eviction blocked by PDB");
        assert!(err.to_string().contains("ip-10-0-1-5"));
        assert_eq!(err.group(), None);
    }

    /// Story: error helper functions accept both String and &str
    #[test]
    fn story_error_construction_ergonomics() {
        let group = "nodes-us-east-1a";
        let err = Error::discovery_for(group, format!("no cloud group for {}", group));
        assert!(err.to_string().contains("nodes-us-east-1a"));

        let err = Error::store_for("nodes", "record delete failed");
        assert!(err.to_string().contains("store error"));
        assert_eq!(err.group(), Some("nodes"));
    }
}
