//! InstanceGroup Custom Resource Definition
//!
//! An InstanceGroup is the declarative definition of a homogeneous node
//! pool: its role, size bounds, and provider hints. The live machine pool
//! backing it is discovered fresh on every reconciliation pass and never
//! persisted.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::InstanceGroupRole;

/// Specification for an InstanceGroup
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "trellis.dev",
    version = "v1alpha1",
    kind = "InstanceGroup",
    plural = "instancegroups",
    shortname = "ig",
    namespaced = false,
    printcolumn = r#"{"name":"Role","type":"string","jsonPath":".spec.role"}"#,
    printcolumn = r#"{"name":"Min","type":"integer","jsonPath":".spec.minSize"}"#,
    printcolumn = r#"{"name":"Max","type":"integer","jsonPath":".spec.maxSize"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct InstanceGroupSpec {
    /// Role of the nodes in this group
    #[serde(default)]
    pub role: InstanceGroupRole,

    /// Minimum number of instances the backing pool keeps running
    pub min_size: u32,

    /// Maximum number of instances the backing pool may run
    pub max_size: u32,

    /// Provider machine type hint (e.g. "t3.large"); carried, not interpreted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_type: Option<String>,

    /// Provider image hint; carried, not interpreted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Placement hints (subnet/zone names); carried, not interpreted
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subnets: Vec<String>,
}

impl InstanceGroupSpec {
    /// Validate the instance group specification
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.min_size == 0 {
            return Err(crate::Error::config("minSize must be at least 1"));
        }
        if self.min_size > self.max_size {
            return Err(crate::Error::config(format!(
                "minSize ({}) cannot exceed maxSize ({})",
                self.min_size, self.max_size
            )));
        }
        Ok(())
    }
}

impl InstanceGroup {
    /// Returns true if this group's members bypass drain and validation
    pub fn is_bastion(&self) -> bool {
        self.spec.role.is_bastion()
    }

    /// Returns true for control plane groups
    pub fn is_control_plane(&self) -> bool {
        self.spec.role.is_control_plane()
    }
}
