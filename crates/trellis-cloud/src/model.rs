//! Value types for a discovered cloud instance group
//!
//! A `CloudInstanceGroup` is the live machine pool backing one
//! InstanceGroup, rebuilt from provider truth on every pass and never
//! persisted. It carries identity and membership only; all behavior lives
//! in the gateway and the rolling-update orchestrator.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use trellis_common::crd::InstanceGroup;

/// Opaque provider payload attached to discovered groups and members
///
/// The gateway that produced a group is the only code that looks inside:
/// it downcasts the payload back to its own type when asked to delete.
/// The orchestrator passes handles through without inspecting them.
#[derive(Clone)]
pub struct CloudObject(Arc<dyn Any + Send + Sync>);

impl CloudObject {
    /// Wrap a provider-specific value
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Downcast back to the originating gateway's type
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl Default for CloudObject {
    fn default() -> Self {
        Self::new(())
    }
}

impl fmt::Debug for CloudObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CloudObject(..)")
    }
}

/// One instance backing a cloud instance group
#[derive(Clone, Debug)]
pub struct CloudInstanceGroupInstance {
    /// Provider instance identifier
    pub id: String,

    /// Name of the registered cluster node, if the instance has joined
    ///
    /// None means the instance exists in the cloud but is not (or no
    /// longer) a registered node; such members are replaced without drain.
    pub node: Option<String>,

    /// Opaque provider handle required by delete operations
    pub cloud_object: CloudObject,
}

impl fmt::Display for CloudInstanceGroupInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.node {
            Some(node) => write!(f, "{} (node {})", self.id, node),
            None => write!(f, "{} (no registered node)", self.id),
        }
    }
}

/// A discovered machine pool backing one InstanceGroup
///
/// Invariant: every member belongs to exactly one of `ready` or
/// `need_update`; membership reflects provider truth at discovery time.
#[derive(Clone, Debug)]
pub struct CloudInstanceGroup {
    /// The logical definition this pool implements
    pub instance_group: InstanceGroup,

    /// Provider-assigned identifier of the backing pool
    pub id: String,

    /// Provider-reported minimum size
    pub min_size: u32,

    /// Provider-reported maximum size
    pub max_size: u32,

    /// Provider-reported lifecycle status
    pub status: String,

    /// Members whose configuration is up to date, in discovery order
    pub ready: Vec<CloudInstanceGroupInstance>,

    /// Members that must be replaced, in discovery order
    pub need_update: Vec<CloudInstanceGroupInstance>,

    /// Opaque provider handle for whole-group operations
    pub cloud_object: CloudObject,
}

impl CloudInstanceGroup {
    /// Name of the logical instance group this pool backs
    pub fn name(&self) -> &str {
        self.instance_group
            .metadata
            .name
            .as_deref()
            .unwrap_or("unknown")
    }

    /// Whether this is a bastion group (drain/validate bypassed)
    pub fn is_bastion(&self) -> bool {
        self.instance_group.is_bastion()
    }

    /// Total number of members
    pub fn size(&self) -> usize {
        self.ready.len() + self.need_update.len()
    }

    /// The replacement set for a rolling update
    ///
    /// Stale members first, in discovery order. With `force`, ready
    /// members are appended after them, deduplicated by id in case
    /// provider data overlaps.
    pub fn update_set(&self, force: bool) -> Vec<&CloudInstanceGroupInstance> {
        let mut seen = std::collections::HashSet::new();
        let mut update: Vec<&CloudInstanceGroupInstance> = Vec::new();

        for member in &self.need_update {
            if seen.insert(member.id.as_str()) {
                update.push(member);
            }
        }
        if force {
            for member in &self.ready {
                if seen.insert(member.id.as_str()) {
                    update.push(member);
                }
            }
        }
        update
    }
}

impl fmt::Display for CloudInstanceGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] ({} ready, {} need update)",
            self.name(),
            self.id,
            self.ready.len(),
            self.need_update.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use trellis_common::crd::{InstanceGroupRole, InstanceGroupSpec};

    fn member(id: &str) -> CloudInstanceGroupInstance {
        CloudInstanceGroupInstance {
            id: id.to_string(),
            node: Some(format!("node-{id}")),
            cloud_object: CloudObject::default(),
        }
    }

    fn group(need_update: Vec<&str>, ready: Vec<&str>) -> CloudInstanceGroup {
        CloudInstanceGroup {
            instance_group: InstanceGroup {
                metadata: ObjectMeta {
                    name: Some("nodes".to_string()),
                    ..Default::default()
                },
                spec: InstanceGroupSpec {
                    role: InstanceGroupRole::Node,
                    min_size: 1,
                    max_size: 5,
                    ..Default::default()
                },
            },
            id: "nodes.asg".to_string(),
            min_size: 1,
            max_size: 5,
            status: "Running".to_string(),
            ready: ready.into_iter().map(member).collect(),
            need_update: need_update.into_iter().map(member).collect(),
            cloud_object: CloudObject::default(),
        }
    }

    #[test]
    fn test_update_set_without_force_is_need_update_only() {
        let g = group(vec!["a", "b"], vec!["c"]);
        let ids: Vec<&str> = g.update_set(false).iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_update_set_with_force_appends_ready_in_order() {
        let g = group(vec!["a", "b"], vec!["c", "d"]);
        let ids: Vec<&str> = g.update_set(true).iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_update_set_dedupes_overlapping_provider_data() {
        // Provider listed "b" as both stale and ready; stale position wins.
        let g = group(vec!["a", "b"], vec!["b", "c"]);
        let ids: Vec<&str> = g.update_set(true).iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_cloud_object_roundtrip() {
        #[derive(Debug, PartialEq)]
        struct Handle {
            name: String,
        }

        let obj = CloudObject::new(Handle {
            name: "md-1".to_string(),
        });
        assert_eq!(
            obj.downcast_ref::<Handle>(),
            Some(&Handle {
                name: "md-1".to_string()
            })
        );
        // A different gateway's type never matches
        assert!(obj.downcast_ref::<String>().is_none());
    }

    #[test]
    fn test_display_names_group_and_counts() {
        let g = group(vec!["a"], vec!["b", "c"]);
        let s = g.to_string();
        assert!(s.contains("nodes"));
        assert!(s.contains("2 ready"));
        assert!(s.contains("1 need update"));
    }
}
