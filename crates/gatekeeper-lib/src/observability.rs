//! Observability infrastructure for the gatekeeper
//!
//! Provides:
//! - Prometheus metrics (archive intake, chart outcomes, gate and tool latency, artifact versions)
//! - Structured JSON logging with tracing

use crate::models::{BatchReport, ChartOutcome, OutcomeStatus};
use prometheus::{
    register_gauge_vec, register_histogram, register_histogram_vec, register_int_counter,
    register_int_counter_vec, GaugeVec, Histogram, HistogramVec, IntCounter, IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Gate evaluation is in-process arithmetic
const GATE_LATENCY_BUCKETS: &[f64] = &[
    0.000_01, 0.000_05, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05,
];

/// Tool calls are subprocesses talking to a cluster
const TOOL_LATENCY_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

static GLOBAL_METRICS: OnceLock<GatekeeperMetricsInner> = OnceLock::new();

struct GatekeeperMetricsInner {
    archives_received: IntCounter,
    archives_rejected: IntCounter,
    chart_outcomes: IntCounterVec,
    gate_latency_seconds: Histogram,
    tool_latency_seconds: HistogramVec,
    artifact_version_info: GaugeVec,
}

impl GatekeeperMetricsInner {
    fn new() -> Self {
        Self {
            archives_received: register_int_counter!(
                "chart_gatekeeper_archives_received_total",
                "Archives submitted for deployment"
            )
            .expect("Failed to register archives_received"),

            archives_rejected: register_int_counter!(
                "chart_gatekeeper_archives_rejected_total",
                "Archives that could not be extracted"
            )
            .expect("Failed to register archives_rejected"),

            chart_outcomes: register_int_counter_vec!(
                "chart_gatekeeper_chart_outcomes_total",
                "Terminal chart outcomes by status",
                &["status"]
            )
            .expect("Failed to register chart_outcomes"),

            gate_latency_seconds: register_histogram!(
                "chart_gatekeeper_gate_latency_seconds",
                "Time spent scoring one feature record",
                GATE_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register gate_latency_seconds"),

            tool_latency_seconds: register_histogram_vec!(
                "chart_gatekeeper_tool_latency_seconds",
                "Time spent in release tool invocations",
                &["operation"],
                TOOL_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register tool_latency_seconds"),

            artifact_version_info: register_gauge_vec!(
                "chart_gatekeeper_artifact_version_info",
                "Versions of the loaded gate artifacts",
                &["transform", "classifier"]
            )
            .expect("Failed to register artifact_version_info"),
        }
    }
}

/// Handle to the process-wide gatekeeper metrics; clones share the registry
#[derive(Clone)]
pub struct GatekeeperMetrics {
    _private: (),
}

impl Default for GatekeeperMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl GatekeeperMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(GatekeeperMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &GatekeeperMetricsInner {
        GLOBAL_METRICS.get_or_init(GatekeeperMetricsInner::new)
    }

    pub fn inc_archives_received(&self) {
        self.inner().archives_received.inc();
    }

    pub fn inc_archives_rejected(&self) {
        self.inner().archives_rejected.inc();
    }

    pub fn record_outcome(&self, status: OutcomeStatus) {
        self.inner()
            .chart_outcomes
            .with_label_values(&[status.as_str()])
            .inc();
    }

    pub fn observe_gate_latency(&self, duration_secs: f64) {
        self.inner().gate_latency_seconds.observe(duration_secs);
    }

    pub fn observe_tool_latency(&self, operation: &str, duration_secs: f64) {
        self.inner()
            .tool_latency_seconds
            .with_label_values(&[operation])
            .observe(duration_secs);
    }

    pub fn set_artifact_versions(&self, transform: &str, classifier: &str) {
        self.inner().artifact_version_info.reset();
        self.inner()
            .artifact_version_info
            .with_label_values(&[transform, classifier])
            .set(1.0);
    }

    pub fn outcome_count(&self, status: OutcomeStatus) -> u64 {
        self.inner()
            .chart_outcomes
            .with_label_values(&[status.as_str()])
            .get()
    }
}

/// Event-tagged logging for requests and releases
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_archive_received(&self, filename: &str, size_bytes: usize) {
        info!(
            event = "archive_received",
            instance = %self.instance,
            filename = %filename,
            size_bytes = size_bytes,
            "Archive received"
        );
    }

    pub fn log_archive_rejected(&self, filename: &str, reason: &str) {
        warn!(
            event = "archive_rejected",
            instance = %self.instance,
            filename = %filename,
            reason = %reason,
            "Archive rejected"
        );
    }

    pub fn log_chart_outcome(&self, outcome: &ChartOutcome) {
        let workload = outcome
            .features
            .map(|f| f.workload_type.as_str())
            .unwrap_or("-");
        if outcome.status.is_error() {
            warn!(
                event = "chart_outcome",
                instance = %self.instance,
                chart = %outcome.chart,
                chart_path = %outcome.chart_path,
                status = %outcome.status.as_str(),
                workload_type = %workload,
                score = ?outcome.score,
                error = ?outcome.error,
                "Chart not deployed"
            );
        } else {
            info!(
                event = "chart_outcome",
                instance = %self.instance,
                chart = %outcome.chart,
                chart_path = %outcome.chart_path,
                status = %outcome.status.as_str(),
                workload_type = %workload,
                score = ?outcome.score,
                "Chart processed"
            );
        }
    }

    pub fn log_batch_complete(&self, filename: &str, report: &BatchReport) {
        info!(
            event = "batch_complete",
            instance = %self.instance,
            filename = %filename,
            charts = report.deployments.len(),
            deployed = report.count(OutcomeStatus::Deployed),
            skipped = report.count(OutcomeStatus::SkippedAnomalous),
            "Archive processed"
        );
    }

    pub fn log_release_uninstalled(&self, release: &str, success: bool) {
        if success {
            info!(
                event = "release_uninstalled",
                instance = %self.instance,
                release = %release,
                "Release uninstalled"
            );
        } else {
            warn!(
                event = "release_uninstall_failed",
                instance = %self.instance,
                release = %release,
                "Release uninstall failed"
            );
        }
    }

    pub fn log_release_status(&self, release: &str, found: bool) {
        info!(
            event = "release_status",
            instance = %self.instance,
            release = %release,
            found = found,
            "Release status queried"
        );
    }

    pub fn log_startup(&self, version: &str, transform_version: &str, classifier_version: &str) {
        info!(
            event = "gatekeeper_started",
            instance = %self.instance,
            gatekeeper_version = %version,
            transform_version = %transform_version,
            classifier_version = %classifier_version,
            "Chart gatekeeper started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "gatekeeper_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Chart gatekeeper shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_handles_share_registry() {
        let metrics = GatekeeperMetrics::new();
        let before = metrics.outcome_count(OutcomeStatus::GateError);

        GatekeeperMetrics::new().record_outcome(OutcomeStatus::GateError);
        assert!(metrics.outcome_count(OutcomeStatus::GateError) > before);

        metrics.inc_archives_received();
        metrics.observe_gate_latency(0.0001);
        metrics.observe_tool_latency("status", 0.2);
        metrics.set_artifact_versions("t1", "c1");
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("gatekeeper-0");
        assert_eq!(logger.instance, "gatekeeper-0");
    }
}
