//! WebService Controller
//!
//! Keeps one Deployment and one ClusterIP Service in step with every
//! `WebService` custom resource, and removes both once the WebService is gone.

mod backoff;
mod config;
mod controller;
mod error;
mod metrics;
mod queue;
mod reconciler;
mod resources;
mod server;
mod watcher;

#[cfg(test)]
mod test_utils;
#[cfg(test)]
mod reconciler_test;

use crate::config::Config;
use crate::error::ControllerError;
use crate::server::ServerState;
use controller::Controller;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    // Must run before the kube client opens its first TLS connection
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider already installed");
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "webservice_controller=info,cluster_client=info".into()),
        )
        .init();

    info!("Starting WebService Controller");

    let config = Config::from_env()?;
    info!("Configuration:");
    info!(
        "  Namespace: {}",
        config.namespace.as_deref().unwrap_or("all namespaces")
    );
    info!("  Metrics port: {}", config.metrics_port);
    info!("  Resync interval: {}s", config.resync_interval.as_secs());
    info!("  Max concurrent reconciles: {}", config.max_concurrent_reconciles);
    info!(
        "  Backoff: {}s..{}s",
        config.backoff_min_secs, config.backoff_max_secs
    );

    metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let port = config.metrics_port;
    let server_handle = {
        let server_state = Arc::clone(&server_state);
        tokio::spawn(async move {
            if let Err(e) = server::start_server(port, server_state).await {
                error!("HTTP server failed: {}", e);
            }
        })
    };

    let controller = Controller::new(config, server_state).await?;
    let result = controller.run().await;

    server_handle.abort();
    result
}
