//! Observability infrastructure for the operator
//!
//! Provides:
//! - Prometheus metrics (tick latency, delivery latency, dispatch and write counters)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for tick latency (in seconds)
const TICK_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

/// Histogram buckets for a single probe delivery (in seconds)
const DELIVERY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0, 10.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<OperatorMetricsInner> = OnceLock::new();

struct OperatorMetricsInner {
    tick_latency_seconds: Histogram,
    delivery_latency_seconds: Histogram,
    ticks: IntCounter,
    list_errors: IntCounter,
    objects_listed: IntGauge,
    objects_processed: IntCounter,
    objects_skipped: IntCounter,
    objects_malformed: IntCounter,
    deliveries_succeeded: IntCounter,
    deliveries_failed: IntCounter,
    status_writes: IntCounter,
    status_write_errors: IntCounter,
    probes_discovered: IntGauge,
}

impl OperatorMetricsInner {
    fn new() -> Self {
        Self {
            tick_latency_seconds: register_histogram!(
                "kpt_operator_tick_latency_seconds",
                "Time spent on one reconciliation tick",
                TICK_BUCKETS.to_vec()
            )
            .expect("Failed to register tick_latency_seconds"),

            delivery_latency_seconds: register_histogram!(
                "kpt_operator_delivery_latency_seconds",
                "Time spent delivering a monitoring request to one probe",
                DELIVERY_BUCKETS.to_vec()
            )
            .expect("Failed to register delivery_latency_seconds"),

            ticks: register_int_counter!(
                "kpt_operator_ticks_total",
                "Total number of reconciliation ticks started"
            )
            .expect("Failed to register ticks"),

            list_errors: register_int_counter!(
                "kpt_operator_list_errors_total",
                "Ticks abandoned because the resource store could not be read"
            )
            .expect("Failed to register list_errors"),

            objects_listed: register_int_gauge!(
                "kpt_operator_objects_listed",
                "Number of KptMonitor objects seen on the last successful list"
            )
            .expect("Failed to register objects_listed"),

            objects_processed: register_int_counter!(
                "kpt_operator_objects_processed_total",
                "KptMonitor objects dispatched and written"
            )
            .expect("Failed to register objects_processed"),

            objects_skipped: register_int_counter!(
                "kpt_operator_objects_skipped_total",
                "KptMonitor objects skipped as already processed or monitoring"
            )
            .expect("Failed to register objects_skipped"),

            objects_malformed: register_int_counter!(
                "kpt_operator_objects_malformed_total",
                "KptMonitor objects that failed to decode"
            )
            .expect("Failed to register objects_malformed"),

            deliveries_succeeded: register_int_counter!(
                "kpt_operator_deliveries_succeeded_total",
                "Probe deliveries answered with 200"
            )
            .expect("Failed to register deliveries_succeeded"),

            deliveries_failed: register_int_counter!(
                "kpt_operator_deliveries_failed_total",
                "Probe deliveries that errored or were rejected"
            )
            .expect("Failed to register deliveries_failed"),

            status_writes: register_int_counter!(
                "kpt_operator_status_writes_total",
                "Successful status subresource writes"
            )
            .expect("Failed to register status_writes"),

            status_write_errors: register_int_counter!(
                "kpt_operator_status_write_errors_total",
                "Status subresource writes that failed and were dropped"
            )
            .expect("Failed to register status_write_errors"),

            probes_discovered: register_int_gauge!(
                "kpt_operator_probes_discovered",
                "Number of probe pods found on the last dispatch"
            )
            .expect("Failed to register probes_discovered"),
        }
    }
}

/// Operator metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share it.
#[derive(Clone)]
pub struct OperatorMetrics {
    _private: (),
}

impl Default for OperatorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl OperatorMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(OperatorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &OperatorMetricsInner {
        GLOBAL_METRICS.get_or_init(OperatorMetricsInner::new)
    }

    pub fn observe_tick_latency(&self, duration_secs: f64) {
        self.inner().tick_latency_seconds.observe(duration_secs);
    }

    pub fn observe_delivery_latency(&self, duration_secs: f64) {
        self.inner().delivery_latency_seconds.observe(duration_secs);
    }

    pub fn inc_ticks(&self) {
        self.inner().ticks.inc();
    }

    pub fn inc_list_errors(&self) {
        self.inner().list_errors.inc();
    }

    pub fn set_objects_listed(&self, count: i64) {
        self.inner().objects_listed.set(count);
    }

    pub fn inc_objects_processed(&self) {
        self.inner().objects_processed.inc();
    }

    pub fn inc_objects_skipped(&self) {
        self.inner().objects_skipped.inc();
    }

    pub fn inc_objects_malformed(&self) {
        self.inner().objects_malformed.inc();
    }

    pub fn inc_deliveries_succeeded(&self) {
        self.inner().deliveries_succeeded.inc();
    }

    pub fn inc_deliveries_failed(&self) {
        self.inner().deliveries_failed.inc();
    }

    pub fn inc_status_writes(&self) {
        self.inner().status_writes.inc();
    }

    pub fn inc_status_write_errors(&self) {
        self.inner().status_write_errors.inc();
    }

    pub fn set_probes_discovered(&self, count: i64) {
        self.inner().probes_discovered.set(count);
    }
}

/// Structured logger for operator events
///
/// Consistent JSON-friendly events for startup, reconciliation passes and
/// status changes.
#[derive(Clone)]
pub struct StructuredLogger {
    operator_namespace: String,
}

impl StructuredLogger {
    pub fn new(operator_namespace: impl Into<String>) -> Self {
        Self {
            operator_namespace: operator_namespace.into(),
        }
    }

    /// Log operator startup
    pub fn log_startup(&self, version: &str, reconcile_interval_secs: u64, probe_enabled: bool) {
        info!(
            event = "operator_started",
            operator_namespace = %self.operator_namespace,
            operator_version = %version,
            reconcile_interval_secs = reconcile_interval_secs,
            probe_enabled = probe_enabled,
            "KPT operator started"
        );
    }

    /// Log operator shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "operator_shutdown",
            operator_namespace = %self.operator_namespace,
            reason = %reason,
            "KPT operator shutting down"
        );
    }

    /// Log a completed tick
    pub fn log_tick(
        &self,
        listed: usize,
        processed: usize,
        skipped: usize,
        malformed: usize,
        write_errors: usize,
        elapsed_ms: u128,
    ) {
        info!(
            event = "tick_complete",
            operator_namespace = %self.operator_namespace,
            listed = listed,
            processed = processed,
            skipped = skipped,
            malformed = malformed,
            write_errors = write_errors,
            elapsed_ms = elapsed_ms,
            "Reconciliation tick complete"
        );
    }

    /// Log a status write outcome
    pub fn log_status_written(
        &self,
        resource: &str,
        resource_version: &str,
        phase: &str,
        message: &str,
        success: bool,
    ) {
        if success {
            info!(
                event = "status_written",
                resource = %resource,
                resource_version = %resource_version,
                phase = %phase,
                message = %message,
                "Updated KptMonitor status"
            );
        } else {
            warn!(
                event = "status_write_failed",
                resource = %resource,
                resource_version = %resource_version,
                phase = %phase,
                message = %message,
                "Failed to update KptMonitor status, dropping until the object changes"
            );
        }
    }

    /// Log the fleet composition
    pub fn log_fleet(&self, role: &str, pods: usize) {
        info!(
            event = "fleet_report",
            operator_namespace = %self.operator_namespace,
            role = %role,
            pods = pods,
            "Fleet role pods found"
        );
    }
}
