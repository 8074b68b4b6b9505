//! Error types for the CLI

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("kube error: {0}")]
    Kube(#[from] kube::Error),

    #[error(transparent)]
    Rollout(#[from] trellis_common::Error),

    #[error("cluster not found: no Cluster resource exists")]
    ClusterNotFound,

    #[error("instance group not found: {name}")]
    InstanceGroupNotFound { name: String },
}
