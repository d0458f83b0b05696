//! Kubernetes resource watchers.
//!
//! Each watcher turns change events on one kind into work queue keys. A
//! WebService, its Deployment and its Service share a namespace/name, so all
//! three map to the same key.

use crate::error::ControllerError;
use crate::queue::WorkQueue;
use crate::resources::OWNED_BY_ANNOTATION;
use cluster_client::{ObjectKey, ResourceKind};
use crds::WebService;
use futures::StreamExt;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::{Api, Client, Resource};
use kube_runtime::{WatchStreamExt, watcher};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Watches WebServices and their dependents for changes.
pub struct Watcher {
    client: Client,
    namespace: Option<String>,
    queue: Arc<WorkQueue>,
}

impl Watcher {
    /// Creates a new watcher over `namespace`, or the whole cluster when `None`.
    pub fn new(client: Client, namespace: Option<String>, queue: Arc<WorkQueue>) -> Self {
        Self {
            client,
            namespace,
            queue,
        }
    }

    fn api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
    {
        match &self.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }

    /// Watches WebService resources. Every event is relevant.
    pub async fn watch_web_services(&self, cancel: CancellationToken) -> Result<(), ControllerError> {
        self.watch::<WebService>(ResourceKind::WebService, false, cancel)
            .await
    }

    /// Watches Deployments carrying the ownership annotation.
    pub async fn watch_deployments(&self, cancel: CancellationToken) -> Result<(), ControllerError> {
        self.watch::<Deployment>(ResourceKind::Deployment, true, cancel)
            .await
    }

    /// Watches Services carrying the ownership annotation.
    pub async fn watch_services(&self, cancel: CancellationToken) -> Result<(), ControllerError> {
        self.watch::<Service>(ResourceKind::Service, true, cancel)
            .await
    }

    async fn watch<K>(
        &self,
        kind: ResourceKind,
        owned_only: bool,
        cancel: CancellationToken,
    ) -> Result<(), ControllerError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Debug
            + Send
            + 'static,
    {
        info!("Starting {} watcher", kind);

        let mut stream = watcher(self.api::<K>(), watcher::Config::default())
            .default_backoff()
            .boxed();

        loop {
            let next = tokio::select! {
                () = cancel.cancelled() => break,
                next = stream.next() => next,
            };

            match next {
                Some(Ok(event)) => self.handle_event(kind, owned_only, event),
                Some(Err(e)) => warn!("{} watcher stream error: {}", kind, e),
                None => {
                    return Err(ControllerError::Watch(format!(
                        "{} watcher stream ended",
                        kind
                    )));
                }
            }
        }

        info!("{} watcher stopped", kind);
        Ok(())
    }

    fn handle_event<K: Resource>(&self, kind: ResourceKind, owned_only: bool, event: watcher::Event<K>) {
        match event {
            watcher::Event::Apply(obj) | watcher::Event::InitApply(obj) => {
                if let Some(key) = key_for(&obj, owned_only) {
                    debug!("{} {} changed", kind, key);
                    self.queue.remember(key.clone());
                    self.queue.enqueue(key);
                }
            }
            watcher::Event::Delete(obj) => {
                if let Some(key) = key_for(&obj, owned_only) {
                    info!("{} {} deleted", kind, key);
                    self.queue.remember(key.clone());
                    self.queue.enqueue(key);
                }
            }
            watcher::Event::Init => debug!("{} watcher initialized", kind),
            watcher::Event::InitDone => info!("{} watcher initialization complete", kind),
        }
    }
}

/// Queue key for an observed object, or `None` when the event is not ours.
fn key_for<K: Resource>(obj: &K, owned_only: bool) -> Option<ObjectKey> {
    if owned_only {
        let owned = obj
            .meta()
            .annotations
            .as_ref()
            .is_some_and(|a| a.contains_key(OWNED_BY_ANNOTATION));
        if !owned {
            return None;
        }
    }
    ObjectKey::from_resource(obj)
}
