//! Supporting types for the InstanceGroup CRD

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Role an instance group plays in the cluster
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InstanceGroupRole {
    /// Control plane nodes (API server, etcd)
    ControlPlane,
    /// Worker nodes running application workloads
    #[default]
    Node,
    /// Access/jump nodes with no workload-safety requirements
    Bastion,
}

impl InstanceGroupRole {
    /// Bastions carry no workloads, so drain and cluster validation are
    /// skipped when replacing their members.
    pub fn is_bastion(&self) -> bool {
        matches!(self, Self::Bastion)
    }

    /// Returns true for control plane groups
    pub fn is_control_plane(&self) -> bool {
        matches!(self, Self::ControlPlane)
    }
}

impl std::str::FromStr for InstanceGroupRole {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "controlplane" | "control-plane" | "master" => Ok(Self::ControlPlane),
            "node" => Ok(Self::Node),
            "bastion" => Ok(Self::Bastion),
            _ => Err(crate::Error::config(format!(
                "invalid instance group role: {s}, expected one of: controlplane, node, bastion"
            ))),
        }
    }
}

impl std::fmt::Display for InstanceGroupRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ControlPlane => write!(f, "controlplane"),
            Self::Node => write!(f, "node"),
            Self::Bastion => write!(f, "bastion"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_role_parsing_accepts_legacy_master_spelling() {
        assert_eq!(
            InstanceGroupRole::from_str("master").unwrap(),
            InstanceGroupRole::ControlPlane
        );
        assert_eq!(
            InstanceGroupRole::from_str("control-plane").unwrap(),
            InstanceGroupRole::ControlPlane
        );
        assert!(InstanceGroupRole::from_str("worker").is_err());
    }

    #[test]
    fn test_role_predicates() {
        assert!(InstanceGroupRole::Bastion.is_bastion());
        assert!(!InstanceGroupRole::Node.is_bastion());
        assert!(InstanceGroupRole::ControlPlane.is_control_plane());
    }
}
