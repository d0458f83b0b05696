//! kube-backed implementation of [`ClusterClientTrait`].

use crate::cluster_trait::ClusterClientTrait;
use crate::error::ClusterError;
use crate::key::{ObjectKey, ResourceKind};
use crds::WebService;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::api::{DeleteParams, PostParams};
use kube::{Api, Client, Resource};
use k8s_openapi::NamespaceResourceScope;
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

/// Namespaced object types the client can address by key.
trait Namespaced:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + DeserializeOwned
    + Serialize
    + std::fmt::Debug
    + Send
    + Sync
    + 'static
{
}

impl<K> Namespaced for K where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Serialize
        + std::fmt::Debug
        + Send
        + Sync
        + 'static
{
}

/// Cluster client talking to the Kubernetes API server.
#[derive(Clone)]
pub struct ClusterClient {
    client: Client,
}

impl std::fmt::Debug for ClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterClient").finish_non_exhaustive()
    }
}

impl ClusterClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Returns the underlying kube client (used for watches).
    pub fn kube_client(&self) -> &Client {
        &self.client
    }

    fn api<K: Namespaced>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn get<K: Namespaced>(&self, kind: ResourceKind, key: &ObjectKey) -> Result<K, ClusterError> {
        debug!("GET {} {}", kind, key);
        self.api::<K>(&key.namespace)
            .get(&key.name)
            .await
            .map_err(|e| ClusterError::from_kube(kind, key, e))
    }

    async fn create<K: Namespaced>(&self, kind: ResourceKind, obj: &K) -> Result<K, ClusterError> {
        let key = object_key(kind, obj)?;
        debug!("CREATE {} {}", kind, key);
        self.api::<K>(&key.namespace)
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| ClusterError::from_kube(kind, &key, e))
    }

    async fn replace<K: Namespaced>(&self, kind: ResourceKind, obj: &K) -> Result<K, ClusterError> {
        let key = object_key(kind, obj)?;
        debug!("UPDATE {} {}", kind, key);
        self.api::<K>(&key.namespace)
            .replace(&key.name, &PostParams::default(), obj)
            .await
            .map_err(|e| ClusterError::from_kube(kind, &key, e))
    }

    async fn delete<K: Namespaced>(&self, kind: ResourceKind, key: &ObjectKey) -> Result<(), ClusterError> {
        debug!("DELETE {} {}", kind, key);
        self.api::<K>(&key.namespace)
            .delete(&key.name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| ClusterError::from_kube(kind, key, e))
    }
}

fn object_key<K: Resource>(kind: ResourceKind, obj: &K) -> Result<ObjectKey, ClusterError> {
    ObjectKey::from_resource(obj)
        .ok_or_else(|| ClusterError::Api(format!("{} is missing metadata.name", kind)))
}

#[async_trait::async_trait]
impl ClusterClientTrait for ClusterClient {
    async fn get_web_service(&self, key: &ObjectKey) -> Result<WebService, ClusterError> {
        self.get(ResourceKind::WebService, key).await
    }

    async fn get_deployment(&self, key: &ObjectKey) -> Result<Deployment, ClusterError> {
        self.get(ResourceKind::Deployment, key).await
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment, ClusterError> {
        self.create(ResourceKind::Deployment, deployment).await
    }

    async fn update_deployment(&self, deployment: &Deployment) -> Result<Deployment, ClusterError> {
        self.replace(ResourceKind::Deployment, deployment).await
    }

    async fn delete_deployment(&self, key: &ObjectKey) -> Result<(), ClusterError> {
        self.delete::<Deployment>(ResourceKind::Deployment, key).await
    }

    async fn get_service(&self, key: &ObjectKey) -> Result<Service, ClusterError> {
        self.get(ResourceKind::Service, key).await
    }

    async fn create_service(&self, service: &Service) -> Result<Service, ClusterError> {
        self.create(ResourceKind::Service, service).await
    }

    async fn delete_service(&self, key: &ObjectKey) -> Result<(), ClusterError> {
        self.delete::<Service>(ResourceKind::Service, key).await
    }
}
