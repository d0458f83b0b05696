//! Mock ClusterClient for unit testing
//!
//! This module provides an in-memory implementation of `ClusterClientTrait`
//! that behaves like the API server for the handful of calls the controller
//! makes, records every call, and can be told to fail a specific call once.

use crate::cluster_trait::ClusterClientTrait;
use crate::error::ClusterError;
use crate::key::{ObjectKey, ResourceKind};
use crds::WebService;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::Resource;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Kind of API round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Get,
    Create,
    Update,
    Delete,
}

impl Operation {
    /// True for calls that write to the cluster.
    pub fn is_mutation(self) -> bool {
        !matches!(self, Operation::Get)
    }
}

/// One recorded call against the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: Operation,
    pub kind: ResourceKind,
    pub key: ObjectKey,
}

impl Call {
    pub fn new(op: Operation, kind: ResourceKind, key: ObjectKey) -> Self {
        Self { op, kind, key }
    }
}

type CallHook = Box<dyn FnOnce() + Send>;

/// Mock ClusterClient for testing
#[derive(Clone, Default)]
pub struct MockClusterClient {
    pub(crate) web_services: Arc<Mutex<HashMap<ObjectKey, WebService>>>,
    pub(crate) deployments: Arc<Mutex<HashMap<ObjectKey, Deployment>>>,
    pub(crate) services: Arc<Mutex<HashMap<ObjectKey, Service>>>,
    pub(crate) calls: Arc<Mutex<Vec<Call>>>,
    pub(crate) faults: Arc<Mutex<HashMap<(Operation, ResourceKind), String>>>,
    // Runs once the call log reaches the given length
    pub(crate) hook: Arc<Mutex<Option<(usize, CallHook)>>>,
    // Counter for generating resourceVersions
    pub(crate) next_version: Arc<Mutex<u64>>,
}

impl std::fmt::Debug for MockClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockClusterClient")
            .field("calls", &self.calls.lock().unwrap().len())
            .finish_non_exhaustive()
    }
}

impl MockClusterClient {
    /// Create a new, empty mock client
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a WebService to the mock store (for test setup)
    pub fn add_web_service(&self, ws: WebService) {
        let key = key_of(&ws);
        self.web_services.lock().unwrap().insert(key, ws);
    }

    /// Remove a WebService from the mock store, as a user deletion would
    pub fn remove_web_service(&self, key: &ObjectKey) {
        self.web_services.lock().unwrap().remove(key);
    }

    /// Add a Deployment to the mock store (for test setup)
    pub fn add_deployment(&self, mut deployment: Deployment) {
        self.stamp(&mut deployment);
        let key = key_of(&deployment);
        self.deployments.lock().unwrap().insert(key, deployment);
    }

    /// Add a Service to the mock store (for test setup)
    pub fn add_service(&self, mut service: Service) {
        self.stamp(&mut service);
        let key = key_of(&service);
        self.services.lock().unwrap().insert(key, service);
    }

    /// Current stored Deployment, bypassing the call log
    pub fn deployment(&self, key: &ObjectKey) -> Option<Deployment> {
        self.deployments.lock().unwrap().get(key).cloned()
    }

    /// Current stored Service, bypassing the call log
    pub fn service(&self, key: &ObjectKey) -> Option<Service> {
        self.services.lock().unwrap().get(key).cloned()
    }

    /// Mutate a stored Deployment in place, as an external writer would
    pub fn edit_deployment(&self, key: &ObjectKey, edit: impl FnOnce(&mut Deployment)) {
        let mut deployments = self.deployments.lock().unwrap();
        if let Some(deployment) = deployments.get_mut(key) {
            edit(deployment);
        }
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Only the calls that wrote to the cluster, in order
    pub fn mutations(&self) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.op.is_mutation())
            .cloned()
            .collect()
    }

    /// Forget the recorded calls
    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Make the next `op` on `kind` fail with `ClusterError::Api(message)`
    pub fn fail_next(&self, op: Operation, kind: ResourceKind, message: impl Into<String>) {
        self.faults.lock().unwrap().insert((op, kind), message.into());
    }

    /// Run `hook` while the `n`-th call (1-based) is being served; the call
    /// itself still completes normally
    pub fn on_call(&self, n: usize, hook: impl FnOnce() + Send + 'static) {
        *self.hook.lock().unwrap() = Some((n, Box::new(hook)));
    }

    fn record(&self, op: Operation, kind: ResourceKind, key: &ObjectKey) -> Result<(), ClusterError> {
        let count = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Call::new(op, kind, key.clone()));
            calls.len()
        };
        let due = {
            let mut hook = self.hook.lock().unwrap();
            if matches!(hook.as_ref(), Some((n, _)) if *n == count) {
                hook.take().map(|(_, f)| f)
            } else {
                None
            }
        };
        if let Some(run) = due {
            run();
        }
        match self.faults.lock().unwrap().remove(&(op, kind)) {
            Some(message) => Err(ClusterError::Api(message)),
            None => Ok(()),
        }
    }

    fn stamp<K: Resource>(&self, obj: &mut K) {
        let mut version = self.next_version.lock().unwrap();
        *version += 1;
        obj.meta_mut().resource_version = Some(version.to_string());
    }

    fn get_from<K: Clone>(
        &self,
        store: &Mutex<HashMap<ObjectKey, K>>,
        kind: ResourceKind,
        key: &ObjectKey,
    ) -> Result<K, ClusterError> {
        self.record(Operation::Get, kind, key)?;
        store
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| ClusterError::NotFound { kind, key: key.clone() })
    }

    fn create_in<K: Resource + Clone>(
        &self,
        store: &Mutex<HashMap<ObjectKey, K>>,
        kind: ResourceKind,
        obj: &K,
    ) -> Result<K, ClusterError> {
        let key = key_of(obj);
        self.record(Operation::Create, kind, &key)?;
        let mut store = store.lock().unwrap();
        if store.contains_key(&key) {
            return Err(ClusterError::Conflict {
                kind,
                key,
                message: "already exists".to_string(),
            });
        }
        let mut created = obj.clone();
        self.stamp(&mut created);
        store.insert(key, created.clone());
        Ok(created)
    }

    fn update_in<K: Resource + Clone>(
        &self,
        store: &Mutex<HashMap<ObjectKey, K>>,
        kind: ResourceKind,
        obj: &K,
    ) -> Result<K, ClusterError> {
        let key = key_of(obj);
        self.record(Operation::Update, kind, &key)?;
        let mut store = store.lock().unwrap();
        let live_version = match store.get(&key) {
            Some(live) => live.meta().resource_version.clone(),
            None => return Err(ClusterError::NotFound { kind, key }),
        };
        if obj.meta().resource_version.is_some() && obj.meta().resource_version != live_version {
            return Err(ClusterError::Conflict {
                kind,
                key,
                message: "the object has been modified".to_string(),
            });
        }
        let mut updated = obj.clone();
        self.stamp(&mut updated);
        store.insert(key, updated.clone());
        Ok(updated)
    }

    fn delete_from<K>(
        &self,
        store: &Mutex<HashMap<ObjectKey, K>>,
        kind: ResourceKind,
        key: &ObjectKey,
    ) -> Result<(), ClusterError> {
        self.record(Operation::Delete, kind, key)?;
        store
            .lock()
            .unwrap()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| ClusterError::NotFound { kind, key: key.clone() })
    }
}

fn key_of<K: Resource>(obj: &K) -> ObjectKey {
    ObjectKey::from_resource(obj).unwrap_or_else(|| ObjectKey::new("default", ""))
}

#[async_trait::async_trait]
impl ClusterClientTrait for MockClusterClient {
    async fn get_web_service(&self, key: &ObjectKey) -> Result<WebService, ClusterError> {
        self.get_from(&self.web_services, ResourceKind::WebService, key)
    }

    async fn get_deployment(&self, key: &ObjectKey) -> Result<Deployment, ClusterError> {
        self.get_from(&self.deployments, ResourceKind::Deployment, key)
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment, ClusterError> {
        self.create_in(&self.deployments, ResourceKind::Deployment, deployment)
    }

    async fn update_deployment(&self, deployment: &Deployment) -> Result<Deployment, ClusterError> {
        self.update_in(&self.deployments, ResourceKind::Deployment, deployment)
    }

    async fn delete_deployment(&self, key: &ObjectKey) -> Result<(), ClusterError> {
        self.delete_from(&self.deployments, ResourceKind::Deployment, key)
    }

    async fn get_service(&self, key: &ObjectKey) -> Result<Service, ClusterError> {
        self.get_from(&self.services, ResourceKind::Service, key)
    }

    async fn create_service(&self, service: &Service) -> Result<Service, ClusterError> {
        self.create_in(&self.services, ResourceKind::Service, service)
    }

    async fn delete_service(&self, key: &ObjectKey) -> Result<(), ClusterError> {
        self.delete_from(&self.services, ResourceKind::Service, key)
    }
}
