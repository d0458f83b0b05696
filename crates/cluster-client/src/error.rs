//! Cluster client errors

use crate::key::{ObjectKey, ResourceKind};
use thiserror::Error;

/// Errors that can occur when talking to the Kubernetes API
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The addressed object does not exist
    #[error("{kind} {key} not found")]
    NotFound { kind: ResourceKind, key: ObjectKey },

    /// The API server rejected a write because of a concurrent change or an
    /// existing object with the same name
    #[error("Conflict on {kind} {key}: {message}")]
    Conflict {
        kind: ResourceKind,
        key: ObjectKey,
        message: String,
    },

    /// Any other Kubernetes API or transport error
    #[error("Kubernetes error: {0}")]
    Kube(#[source] kube::Error),

    /// Failure that did not come from the API server
    #[error("Cluster API error: {0}")]
    Api(String),
}

impl ClusterError {
    /// Classifies a `kube::Error` raised while handling `kind` `key`.
    pub fn from_kube(kind: ResourceKind, key: &ObjectKey, error: kube::Error) -> Self {
        match error {
            kube::Error::Api(ae) if ae.code == 404 => ClusterError::NotFound {
                kind,
                key: key.clone(),
            },
            kube::Error::Api(ae) if ae.code == 409 => ClusterError::Conflict {
                kind,
                key: key.clone(),
                message: ae.message.clone(),
            },
            other => ClusterError::Kube(other),
        }
    }

    /// True only for benign absence.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound { .. })
    }
}
