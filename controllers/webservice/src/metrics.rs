//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `webservice_reconciliations_total` - Total number of reconcile passes
//! - `webservice_reconciliation_errors_total` - Total number of failed passes
//! - `webservice_reconciliation_duration_seconds` - Duration of reconcile passes
//! - `webservice_mutations_total{resource,operation}` - Creates, updates and deletes issued

use crate::error::ControllerError;
use crate::reconciler::Mutation;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "webservice_reconciliations_total",
        "Total number of reconcile passes",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "webservice_reconciliation_errors_total",
        "Total number of reconcile passes that ended in an error",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "webservice_reconciliation_duration_seconds",
            "Duration of reconcile passes in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static MUTATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "webservice_mutations_total",
            "Mutating calls issued against dependent resources",
        ),
        &["resource", "operation"],
    )
    .expect("Failed to create MUTATIONS_TOTAL metric - this should never happen")
});

/// Registers all metrics with the registry. Call once at startup.
pub fn register_metrics() -> Result<(), ControllerError> {
    let register = |collector: Box<dyn prometheus::core::Collector>| {
        REGISTRY
            .register(collector)
            .map_err(|e| ControllerError::Server(format!("Failed to register metric: {}", e)))
    };
    register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    register(Box::new(RECONCILIATION_DURATION.clone()))?;
    register(Box::new(MUTATIONS_TOTAL.clone()))?;
    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(seconds: f64) {
    RECONCILIATION_DURATION.observe(seconds);
}

pub fn record_mutation(mutation: Mutation) {
    MUTATIONS_TOTAL
        .with_label_values(&[mutation.resource().as_str(), mutation.operation()])
        .inc();
}

#[cfg(test)]
pub(crate) fn mutation_count(mutation: Mutation) -> u64 {
    MUTATIONS_TOTAL
        .with_label_values(&[mutation.resource().as_str(), mutation.operation()])
        .get()
}
