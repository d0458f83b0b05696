//! ClusterClient trait for mocking
//!
//! This trait abstracts the cluster-state store so the reconciler can be
//! driven by the concrete kube-backed client in production and by an
//! in-memory mock in unit tests.

use crate::error::ClusterError;
use crate::key::ObjectKey;
use crds::WebService;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;

/// Key-addressed get/create/update/delete against the cluster.
///
/// Every lookup reports a missing object as [`ClusterError::NotFound`].
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ClusterClientTrait: Send + Sync {
    // Owning record
    async fn get_web_service(&self, key: &ObjectKey) -> Result<WebService, ClusterError>;

    // Workload
    async fn get_deployment(&self, key: &ObjectKey) -> Result<Deployment, ClusterError>;
    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment, ClusterError>;
    async fn update_deployment(&self, deployment: &Deployment) -> Result<Deployment, ClusterError>;
    async fn delete_deployment(&self, key: &ObjectKey) -> Result<(), ClusterError>;

    // Network endpoint
    async fn get_service(&self, key: &ObjectKey) -> Result<Service, ClusterError>;
    async fn create_service(&self, service: &Service) -> Result<Service, ClusterError>;
    async fn delete_service(&self, key: &ObjectKey) -> Result<(), ClusterError>;
}
