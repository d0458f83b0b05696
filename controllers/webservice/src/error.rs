//! Controller-specific error types.
//!
//! This module defines error types specific to the WebService Controller
//! that are not covered by upstream library errors.

use cluster_client::ClusterError;
use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the WebService Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Cluster read or write failed (anything other than benign absence)
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// Kubernetes client setup error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A dependent resource could not be derived from the WebService
    #[error("Cannot derive dependent resource: {0}")]
    Derivation(String),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// The reconcile pass was cancelled before it finished
    #[error("Reconciliation cancelled")]
    Cancelled,

    /// Metrics/probe server failed
    #[error("HTTP server error: {0}")]
    Server(String),
}
