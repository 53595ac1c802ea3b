//! Prometheus metrics for the controller
//!
//! | Metric                                      | Labels               |
//! |---------------------------------------------|----------------------|
//! | `rollout_reconciliations_total`             | `result`, `mode`     |
//! | `rollout_reconciliation_duration_seconds`   | `result`             |
//! | `rollout_stages_completed_total`            | `namespace`, `final` |
//! | `rollout_pods_force_deleted_total`          | `namespace`          |

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

pub type SharedMetrics = Arc<ControllerMetrics>;

pub struct ControllerMetrics {
    registry: Registry,
    reconciliations: IntCounterVec,
    reconcile_duration: HistogramVec,
    stages_completed: IntCounterVec,
    pods_force_deleted: IntCounterVec,
}

/// Build a registry with every controller metric registered
pub fn create_metrics() -> Result<SharedMetrics, prometheus::Error> {
    let registry = Registry::new_custom(Some("rollout".to_string()), None)?;

    let reconciliations = IntCounterVec::new(
        Opts::new(
            "reconciliations_total",
            "RolloutOrchestrator reconciliations grouped by result and rollout mode",
        ),
        &["result", "mode"],
    )?;
    let reconcile_duration = HistogramVec::new(
        HistogramOpts::new(
            "reconciliation_duration_seconds",
            "Time spent reconciling one RolloutOrchestrator",
        )
        .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["result"],
    )?;
    let stages_completed = IntCounterVec::new(
        Opts::new(
            "stages_completed_total",
            "Rollout stages achieved, with final=true for the last stage",
        ),
        &["namespace", "final"],
    )?;
    let pods_force_deleted = IntCounterVec::new(
        Opts::new(
            "pods_force_deleted_total",
            "Terminating pods force-deleted with a zero grace period",
        ),
        &["namespace"],
    )?;

    registry.register(Box::new(reconciliations.clone()))?;
    registry.register(Box::new(reconcile_duration.clone()))?;
    registry.register(Box::new(stages_completed.clone()))?;
    registry.register(Box::new(pods_force_deleted.clone()))?;

    Ok(Arc::new(ControllerMetrics {
        registry,
        reconciliations,
        reconcile_duration,
        stages_completed,
        pods_force_deleted,
    }))
}

impl ControllerMetrics {
    pub fn record_reconciliation_success(&self, mode: &str, duration_secs: f64) {
        self.reconciliations
            .with_label_values(&["success", mode])
            .inc();
        self.reconcile_duration
            .with_label_values(&["success"])
            .observe(duration_secs);
    }

    /// Duration is 0 when the failure is recorded from `error_policy`
    pub fn record_reconciliation_error(&self, mode: &str, duration_secs: f64) {
        self.reconciliations
            .with_label_values(&["error", mode])
            .inc();
        self.reconcile_duration
            .with_label_values(&["error"])
            .observe(duration_secs);
    }

    pub fn record_stage_completed(&self, namespace: &str, last_stage: bool) {
        let last = if last_stage { "true" } else { "false" };
        self.stages_completed
            .with_label_values(&[namespace, last])
            .inc();
    }

    pub fn record_pod_force_deleted(&self, namespace: &str) {
        self.pods_force_deleted.with_label_values(&[namespace]).inc();
    }

    /// Text exposition format for `/metrics`
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
