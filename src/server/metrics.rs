//! Prometheus metrics for the controller
//!
//! One registry per process, shared between the reconcile loop (which
//! records) and the health server (which encodes for scraping).

use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Shared handle to the controller metrics registry
pub type SharedMetrics = Arc<ControllerMetrics>;

pub struct ControllerMetrics {
    registry: Registry,

    /// Completed reconciliations, labeled by outcome (success/error)
    reconciliations_total: IntCounterVec,

    /// Wall-clock duration of successful reconciliations
    reconciliation_duration_seconds: Histogram,

    /// Pods deleted by remediation passes
    pods_restarted_total: IntCounter,

    /// Unix timestamp of the last remediation, per workload
    last_remediation_timestamp_seconds: IntGaugeVec,
}

impl ControllerMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let reconciliations_total = IntCounterVec::new(
            Opts::new(
                "kunto_reconciliations_total",
                "Completed reconciliations by outcome",
            ),
            &["result"],
        )?;
        registry.register(Box::new(reconciliations_total.clone()))?;

        let reconciliation_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "kunto_reconciliation_duration_seconds",
            "Duration of successful reconciliations in seconds",
        ))?;
        registry.register(Box::new(reconciliation_duration_seconds.clone()))?;

        let pods_restarted_total = IntCounter::new(
            "kunto_pods_restarted_total",
            "Pods deleted by remediation passes",
        )?;
        registry.register(Box::new(pods_restarted_total.clone()))?;

        let last_remediation_timestamp_seconds = IntGaugeVec::new(
            Opts::new(
                "kunto_last_remediation_timestamp_seconds",
                "Unix timestamp of the last remediation per workload",
            ),
            &["namespace", "deployment"],
        )?;
        registry.register(Box::new(last_remediation_timestamp_seconds.clone()))?;

        Ok(ControllerMetrics {
            registry,
            reconciliations_total,
            reconciliation_duration_seconds,
            pods_restarted_total,
            last_remediation_timestamp_seconds,
        })
    }

    pub fn record_reconciliation_success(&self, duration_secs: f64) {
        self.reconciliations_total
            .with_label_values(&["success"])
            .inc();
        self.reconciliation_duration_seconds.observe(duration_secs);
    }

    pub fn record_reconciliation_error(&self, duration_secs: f64) {
        self.reconciliations_total
            .with_label_values(&["error"])
            .inc();
        if duration_secs > 0.0 {
            self.reconciliation_duration_seconds.observe(duration_secs);
        }
    }

    pub fn record_pods_restarted(&self, count: usize) {
        self.pods_restarted_total.inc_by(count as u64);
    }

    pub fn set_last_remediation(&self, namespace: &str, deployment: &str, timestamp_secs: i64) {
        self.last_remediation_timestamp_seconds
            .with_label_values(&[namespace, deployment])
            .set(timestamp_secs);
    }

    /// Encode all registered series in Prometheus text exposition format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

/// Create the process-wide metrics registry
pub fn create_metrics() -> Result<SharedMetrics, prometheus::Error> {
    Ok(Arc::new(ControllerMetrics::new()?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
#[path = "metrics_test.rs"]
mod tests;
