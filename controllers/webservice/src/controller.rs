//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the reconciler,
//! work queue and watchers together and runs them until shutdown.

use crate::backoff::{FibonacciBackoff, KeyedBackoff};
use crate::config::Config;
use crate::error::ControllerError;
use crate::metrics;
use crate::queue::{self, WorkQueue};
use crate::reconciler::{Branch, Reconciler};
use crate::server::ServerState;
use crate::watcher::Watcher;
use cluster_client::{ClusterClient, ClusterClientTrait, ObjectKey};
use kube::Client;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Main controller for WebService management.
pub struct Controller {
    config: Config,
    kube_client: Client,
    state: Arc<ServerState>,
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(config: Config, state: Arc<ServerState>) -> Result<Self, ControllerError> {
        info!("Initializing WebService Controller");

        let kube_client = Client::try_default().await?;

        Ok(Self {
            config,
            kube_client,
            state,
        })
    }

    /// Runs the controller until Ctrl-C or until a watcher fails.
    pub async fn run(self) -> Result<(), ControllerError> {
        let cancel = CancellationToken::new();

        let reconciler = Arc::new(Reconciler::new(Arc::new(ClusterClient::new(
            self.kube_client.clone(),
        ))));
        let backoff = Arc::new(KeyedBackoff::new(FibonacciBackoff::new(
            self.config.backoff_min_secs,
            self.config.backoff_max_secs,
        )));
        let (work_queue, rx) = WorkQueue::new();

        let runner = {
            let work_queue = Arc::clone(&work_queue);
            let cancel = cancel.clone();
            let handler = {
                let work_queue = Arc::clone(&work_queue);
                let cancel = cancel.clone();
                move |key: ObjectKey| {
                    let reconciler = Arc::clone(&reconciler);
                    let work_queue = Arc::clone(&work_queue);
                    let backoff = Arc::clone(&backoff);
                    let pass_cancel = cancel.child_token();
                    async move {
                        process_key(&key, &reconciler, &work_queue, &backoff, &pass_cancel).await;
                    }
                }
            };
            tokio::spawn(queue::run(
                work_queue,
                rx,
                self.config.max_concurrent_reconciles,
                cancel,
                handler,
            ))
        };

        let resync = tokio::spawn(queue::resync_every(
            Arc::clone(&work_queue),
            self.config.resync_interval,
            cancel.clone(),
        ));

        let watcher = Arc::new(Watcher::new(
            self.kube_client.clone(),
            self.config.namespace.clone(),
            Arc::clone(&work_queue),
        ));
        let mut web_service_watcher = spawn_watch(&watcher, &cancel, |w, c| async move {
            w.watch_web_services(c).await
        });
        let mut deployment_watcher = spawn_watch(&watcher, &cancel, |w, c| async move {
            w.watch_deployments(c).await
        });
        let mut service_watcher = spawn_watch(&watcher, &cancel, |w, c| async move {
            w.watch_services(c).await
        });

        self.state.mark_ready();
        info!("WebService Controller running");

        let outcome = tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                match signal {
                    Ok(()) => info!("Received Ctrl-C, shutting down"),
                    Err(e) => warn!("Failed to listen for Ctrl-C: {}, shutting down", e),
                }
                Ok(())
            }
            result = &mut web_service_watcher => flatten("WebService", result),
            result = &mut deployment_watcher => flatten("Deployment", result),
            result = &mut service_watcher => flatten("Service", result),
        };

        cancel.cancel();
        for handle in [web_service_watcher, deployment_watcher, service_watcher] {
            if !handle.is_finished() {
                let _ = handle.await;
            }
        }
        let _ = resync.await;
        let _ = runner.await;

        info!("WebService Controller stopped");
        outcome
    }
}

fn spawn_watch<F, Fut>(
    watcher: &Arc<Watcher>,
    cancel: &CancellationToken,
    watch: F,
) -> JoinHandle<Result<(), ControllerError>>
where
    F: FnOnce(Arc<Watcher>, CancellationToken) -> Fut,
    Fut: Future<Output = Result<(), ControllerError>> + Send + 'static,
{
    tokio::spawn(watch(Arc::clone(watcher), cancel.clone()))
}

fn flatten(
    kind: &str,
    result: Result<Result<(), ControllerError>, tokio::task::JoinError>,
) -> Result<(), ControllerError> {
    result
        .map_err(|e| ControllerError::Watch(format!("{} watcher panicked: {}", kind, e)))?
        .inspect_err(|e| error!("{} watcher failed: {}", kind, e))
}

/// Runs one pass for `key` and schedules whatever follows it.
///
/// A failed pass is retried after the key's backoff delay. A successful
/// converge keeps the key on resync; a successful teardown drops it, since
/// nothing is left to watch over.
pub(crate) async fn process_key<C: ClusterClientTrait>(
    key: &ObjectKey,
    reconciler: &Reconciler<C>,
    work_queue: &Arc<WorkQueue>,
    backoff: &KeyedBackoff,
    cancel: &CancellationToken,
) {
    let started = Instant::now();
    metrics::increment_reconciliations();

    let result = reconciler.reconcile(key, cancel).await;
    metrics::observe_reconciliation_duration(started.elapsed().as_secs_f64());

    match result {
        Ok(report) => {
            backoff.reset(key);
            match report.branch {
                Branch::Converge => work_queue.remember(key.clone()),
                Branch::Teardown => work_queue.forget(key),
            }
        }
        Err(ControllerError::Cancelled) => {
            info!("Reconcile of {} cancelled", key);
        }
        Err(e) => {
            metrics::increment_reconciliation_errors();
            let delay = backoff.record_failure(key);
            warn!(
                "Reconcile of {} failed: {}; retrying in {}s",
                key,
                e,
                delay.as_secs()
            );
            work_queue.enqueue_after(key.clone(), delay);
        }
    }
}
