//! Reconciliation logic for WebService CRDs.
//!
//! One pass reads the current state of a WebService and of its Deployment and
//! Service (all addressed by the same namespace/name key), then issues the
//! creates, updates or deletes needed to converge. Nothing is carried between
//! passes: every decision is made on what the pass itself just fetched, so a
//! pass interrupted at any point is safe to re-run.
//!
//! Only "not found" is treated as a normal answer. Every other error aborts
//! the pass and is returned to the caller, which owns backoff and retry.

use crate::error::ControllerError;
use crate::metrics;
use crate::resources::{apply_workload_spec, desired_deployment, desired_service, workload_drift};
use cluster_client::{ClusterClientTrait, ClusterError, ObjectKey, ResourceKind};
use crds::WebService;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Which branch a pass took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    /// The WebService exists; dependents were created or brought in line.
    Converge,
    /// The WebService is gone; dependents were removed.
    Teardown,
}

/// A mutating call made during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    CreatedDeployment,
    UpdatedDeployment,
    CreatedService,
    DeletedService,
    DeletedDeployment,
}

impl Mutation {
    pub fn resource(self) -> ResourceKind {
        match self {
            Mutation::CreatedDeployment
            | Mutation::UpdatedDeployment
            | Mutation::DeletedDeployment => ResourceKind::Deployment,
            Mutation::CreatedService | Mutation::DeletedService => ResourceKind::Service,
        }
    }

    pub fn operation(self) -> &'static str {
        match self {
            Mutation::CreatedDeployment | Mutation::CreatedService => "create",
            Mutation::UpdatedDeployment => "update",
            Mutation::DeletedService | Mutation::DeletedDeployment => "delete",
        }
    }
}

/// Outcome of a converged pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub branch: Branch,
    pub mutations: Vec<Mutation>,
}

impl ReconcileReport {
    fn new(branch: Branch) -> Self {
        Self {
            branch,
            mutations: Vec::new(),
        }
    }

    /// Notes a mutation the moment it lands, so the metric counts it even if
    /// a later step of the same pass fails.
    fn record(&mut self, mutation: Mutation) {
        metrics::record_mutation(mutation);
        self.mutations.push(mutation);
    }

    /// True when the pass found everything already in place.
    pub fn is_noop(&self) -> bool {
        self.mutations.is_empty()
    }
}

/// Reconciles WebService resources against the cluster.
pub struct Reconciler<C> {
    client: Arc<C>,
}

impl<C> std::fmt::Debug for Reconciler<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler").finish_non_exhaustive()
    }
}

impl<C: ClusterClientTrait> Reconciler<C> {
    /// Creates a new reconciler over the given cluster client.
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    /// Runs one reconcile pass for `key`.
    ///
    /// `Ok` means converged. `Err` means the pass stopped early and must be
    /// re-invoked; any mutations already made stay in place.
    pub async fn reconcile(
        &self,
        key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<ReconcileReport, ControllerError> {
        info!(namespace = %key.namespace, name = %key.name, "Reconciling WebService");

        let report = match self.lookup(cancel, self.client.get_web_service(key)).await? {
            None => self.teardown(key, cancel).await?,
            Some(ws) => self.converge(key, &ws, cancel).await?,
        };

        info!(
            namespace = %key.namespace,
            name = %key.name,
            branch = ?report.branch,
            mutations = report.mutations.len(),
            "WebService reconciled"
        );
        Ok(report)
    }

    /// Removes the Service, then the Deployment.
    ///
    /// The Service goes first so traffic stops being routed before the pods
    /// behind it disappear.
    async fn teardown(
        &self,
        key: &ObjectKey,
        cancel: &CancellationToken,
    ) -> Result<ReconcileReport, ControllerError> {
        let mut report = ReconcileReport::new(Branch::Teardown);

        if self.lookup(cancel, self.client.get_service(key)).await?.is_some() {
            info!("Deleting Service {} (WebService gone)", key);
            if self
                .absent_ok(cancel, self.client.delete_service(key))
                .await
                .inspect_err(|e| error!("Failed to delete Service {}: {}", key, e))?
            {
                report.record(Mutation::DeletedService);
            }
        } else {
            debug!("No Service {} to delete", key);
        }

        if self.lookup(cancel, self.client.get_deployment(key)).await?.is_some() {
            info!("Deleting Deployment {} (WebService gone)", key);
            if self
                .absent_ok(cancel, self.client.delete_deployment(key))
                .await
                .inspect_err(|e| error!("Failed to delete Deployment {}: {}", key, e))?
            {
                report.record(Mutation::DeletedDeployment);
            }
        } else {
            debug!("No Deployment {} to delete", key);
        }

        Ok(report)
    }

    /// Creates or corrects the Deployment, then creates the Service if missing.
    async fn converge(
        &self,
        key: &ObjectKey,
        ws: &WebService,
        cancel: &CancellationToken,
    ) -> Result<ReconcileReport, ControllerError> {
        let mut report = ReconcileReport::new(Branch::Converge);

        match self.lookup(cancel, self.client.get_deployment(key)).await? {
            None => {
                info!("Deployment {} not found, creating", key);
                let deployment = desired_deployment(ws)?;
                self.call(cancel, self.client.create_deployment(&deployment))
                    .await
                    .inspect_err(|e| error!("Failed to create Deployment {}: {}", key, e))?;
                report.record(Mutation::CreatedDeployment);
            }
            Some(mut live) => {
                let drift = workload_drift(&live, &ws.spec);
                if drift.any() {
                    info!(
                        "Updating Deployment {} (replicas drifted: {}, image drifted: {})",
                        key, drift.replicas, drift.image
                    );
                    apply_workload_spec(&mut live, ws)?;
                    self.call(cancel, self.client.update_deployment(&live))
                        .await
                        .inspect_err(|e| error!("Failed to update Deployment {}: {}", key, e))?;
                    report.record(Mutation::UpdatedDeployment);
                } else {
                    debug!("Deployment {} up to date", key);
                }
            }
        }

        // The Service is only ever created; its fields are not diffed.
        if self.lookup(cancel, self.client.get_service(key)).await?.is_none() {
            info!("Service {} not found, creating", key);
            let service = desired_service(ws)?;
            self.call(cancel, self.client.create_service(&service))
                .await
                .inspect_err(|e| error!("Failed to create Service {}: {}", key, e))?;
            report.record(Mutation::CreatedService);
        }

        Ok(report)
    }

    /// Awaits one cluster round trip, aborting if the pass is cancelled.
    async fn call<T>(
        &self,
        cancel: &CancellationToken,
        request: impl Future<Output = Result<T, ClusterError>>,
    ) -> Result<T, ControllerError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ControllerError::Cancelled),
            result = request => result.map_err(ControllerError::from),
        }
    }

    /// Like [`Self::call`] for a lookup, mapping "not found" to `None`.
    async fn lookup<T>(
        &self,
        cancel: &CancellationToken,
        request: impl Future<Output = Result<T, ClusterError>>,
    ) -> Result<Option<T>, ControllerError> {
        match self.call(cancel, request).await {
            Ok(obj) => Ok(Some(obj)),
            Err(ControllerError::Cluster(e)) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Like [`Self::call`] for a delete; returns `false` if the object was
    /// already gone by the time the delete landed.
    async fn absent_ok(
        &self,
        cancel: &CancellationToken,
        request: impl Future<Output = Result<(), ClusterError>>,
    ) -> Result<bool, ControllerError> {
        Ok(self.lookup(cancel, request).await?.is_some())
    }
}
