//! KptMonitor reconciliation loop
//!
//! On every tick: list all KptMonitors, skip the ones already handled,
//! dispatch the rest to the probe fleet one object at a time, write back the
//! derived status and record the processed version in the dedup ledger.
//!
//! A failed list (or probe discovery) abandons the tick; the next tick is the
//! only retry.

use crate::dispatcher::Dispatcher;
use crate::error::{OperatorError, Result};
use crate::health::{components, HealthRegistry};
use crate::ledger::DedupLedger;
use crate::models::{MonitorObject, MonitorPhase};
use crate::observability::{OperatorMetrics, StructuredLogger};
use crate::status::{merge_status, next_status, DispatchOutcome};
use crate::store::MonitorStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Configuration for the reconciliation loop
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Tick interval (default: 10 seconds)
    pub interval: Duration,
    /// Deliver requests to probes; when false only `Created` is stamped
    pub probe_enabled: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            probe_enabled: true,
        }
    }
}

/// Why an object was not processed this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Ledger already holds the current resource version
    AlreadyProcessed,
    /// Status is already `Monitoring`
    Monitoring,
}

/// Skip predicate applied to every listed object
pub fn skip_reason(ledger: &DedupLedger, object: &MonitorObject) -> Option<SkipReason> {
    if ledger.is_processed(&object.key, &object.resource_version) {
        Some(SkipReason::AlreadyProcessed)
    } else if object.phase() == Some(MonitorPhase::Monitoring) {
        Some(SkipReason::Monitoring)
    } else {
        None
    }
}

/// Counters for one tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub listed: usize,
    pub processed: usize,
    pub skipped: usize,
    pub malformed: usize,
    pub written: usize,
    pub write_errors: usize,
    /// Shutdown was requested before every object was handled
    pub cancelled: bool,
}

/// Result of processing a single object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteResult {
    Written,
    Failed,
    Unchanged,
    /// Shutdown arrived mid-dispatch; nothing written or recorded
    Cancelled,
}

/// Periodic reconciler. Owns the dedup ledger exclusively.
pub struct Reconciler {
    store: Arc<dyn MonitorStore>,
    dispatcher: Dispatcher,
    ledger: DedupLedger,
    config: ReconcilerConfig,
    health: HealthRegistry,
    metrics: OperatorMetrics,
    logger: StructuredLogger,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn MonitorStore>,
        dispatcher: Dispatcher,
        config: ReconcilerConfig,
        health: HealthRegistry,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            store,
            dispatcher,
            ledger: DedupLedger::new(),
            config,
            health,
            metrics: OperatorMetrics::new(),
            logger,
        }
    }

    pub fn ledger(&self) -> &DedupLedger {
        &self.ledger
    }

    /// Run until shutdown is signalled.
    ///
    /// Shutdown is observed between ticks, between objects and during a
    /// dispatch, where pending deliveries are dropped.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            probe_enabled = self.config.probe_enabled,
            "Starting reconciliation loop"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.tick(&mut shutdown).await {
                        Ok(report) if report.cancelled => {
                            info!("Shutdown requested mid-tick");
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(error = %e, "Reconciliation tick abandoned, retrying next tick");
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down reconciliation loop");
                    break;
                }
            }
        }
    }

    /// Run one reconciliation pass over every listed object
    pub async fn tick(&mut self, shutdown: &mut broadcast::Receiver<()>) -> Result<TickReport> {
        let start = Instant::now();
        self.metrics.inc_ticks();

        let objects = match self.store.list().await {
            Ok(objects) => {
                self.health.set_healthy(components::RESOURCE_STORE).await;
                objects
            }
            Err(e) => {
                self.metrics.inc_list_errors();
                self.health
                    .set_degraded(components::RESOURCE_STORE, e.to_string())
                    .await;
                return Err(e);
            }
        };

        let mut report = TickReport {
            listed: objects.len(),
            ..Default::default()
        };
        self.metrics.set_objects_listed(objects.len() as i64);
        debug!(count = objects.len(), "Found KptMonitor objects");

        for raw in objects {
            if shutdown_requested(shutdown) {
                report.cancelled = true;
                break;
            }

            let object = match MonitorObject::decode(raw) {
                Ok(object) => object,
                Err(e) if e.is_object_scoped() => {
                    warn!(error = %e, "Skipping malformed KptMonitor");
                    self.metrics.inc_objects_malformed();
                    report.malformed += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            if let Some(reason) = skip_reason(&self.ledger, &object) {
                debug!(
                    resource = %object.key,
                    resource_version = %object.resource_version,
                    reason = ?reason,
                    "Skipping KptMonitor"
                );
                self.metrics.inc_objects_skipped();
                report.skipped += 1;
                continue;
            }

            match self.reconcile_object(&object, shutdown).await? {
                WriteResult::Written => report.written += 1,
                WriteResult::Failed => report.write_errors += 1,
                WriteResult::Unchanged => {}
                WriteResult::Cancelled => {
                    report.cancelled = true;
                    break;
                }
            }
            report.processed += 1;
        }

        let elapsed = start.elapsed();
        self.metrics.observe_tick_latency(elapsed.as_secs_f64());
        self.health.set_healthy(components::RECONCILER).await;
        self.logger.log_tick(
            report.listed,
            report.processed,
            report.skipped,
            report.malformed,
            report.write_errors,
            elapsed.as_millis(),
        );

        Ok(report)
    }

    /// Dispatch one object and write back its status.
    ///
    /// The ledger advances to the version read at the start of the pass even
    /// when the status write fails.
    async fn reconcile_object(
        &mut self,
        object: &MonitorObject,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<WriteResult> {
        info!(
            resource = %object.key,
            resource_version = %object.resource_version,
            current_status = object.phase().map(|p| p.as_str()).unwrap_or("Not set"),
            "Processing KptMonitor"
        );

        let outcome = if self.config.probe_enabled {
            let outcome = tokio::select! {
                outcome = self.dispatch(object) => outcome?,
                _ = shutdown.recv() => {
                    info!(resource = %object.key, "Shutdown requested, dropping in-flight dispatch");
                    return Ok(WriteResult::Cancelled);
                }
            };
            Some(outcome)
        } else {
            None
        };

        let result = match next_status(object.status.as_ref(), outcome.as_ref()) {
            Some(update) => {
                let merged = merge_status(&object.raw, &update, Utc::now());
                let written = self.store.replace_status(&object.key, &merged).await;

                if let Err(e) = &written {
                    warn!(resource = %object.key, error = %e, "Status write failed");
                    self.metrics.inc_status_write_errors();
                } else {
                    self.metrics.inc_status_writes();
                }
                self.logger.log_status_written(
                    &object.key.to_string(),
                    &object.resource_version,
                    update.phase.as_str(),
                    &update.message,
                    written.is_ok(),
                );

                if written.is_ok() {
                    WriteResult::Written
                } else {
                    WriteResult::Failed
                }
            }
            None => WriteResult::Unchanged,
        };

        self.ledger
            .record(object.key.clone(), object.resource_version.clone());
        self.metrics.inc_objects_processed();

        Ok(result)
    }

    async fn dispatch(&self, object: &MonitorObject) -> Result<DispatchOutcome> {
        match self.dispatcher.dispatch(&object.key, &object.spec).await {
            Ok(outcome) => {
                if outcome.total == 0 {
                    self.health
                        .set_degraded(components::PROBE_FLEET, "No probes found")
                        .await;
                } else {
                    self.health.set_healthy(components::PROBE_FLEET).await;
                }
                Ok(outcome)
            }
            Err(e) => {
                self.health
                    .set_degraded(components::PROBE_FLEET, e.to_string())
                    .await;
                Err(e)
            }
        }
    }
}

/// True once a shutdown was sent or every sender is gone
fn shutdown_requested(shutdown: &mut broadcast::Receiver<()>) -> bool {
    !matches!(shutdown.try_recv(), Err(TryRecvError::Empty))
}

/// Builder for the reconciliation loop
pub struct ReconcilerBuilder {
    store: Option<Arc<dyn MonitorStore>>,
    dispatcher: Option<Dispatcher>,
    health: HealthRegistry,
    logger: Option<StructuredLogger>,
    config: ReconcilerConfig,
}

impl ReconcilerBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            dispatcher: None,
            health: HealthRegistry::new(),
            logger: None,
            config: ReconcilerConfig::default(),
        }
    }

    pub fn store(mut self, store: Arc<dyn MonitorStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn probe_enabled(mut self, enabled: bool) -> Self {
        self.config.probe_enabled = enabled;
        self
    }

    pub fn build(self) -> Result<Reconciler> {
        let store = self
            .store
            .ok_or_else(|| OperatorError::Config("resource store is required".to_string()))?;
        let dispatcher = self
            .dispatcher
            .ok_or_else(|| OperatorError::Config("dispatcher is required".to_string()))?;
        if self.config.interval.is_zero() {
            return Err(OperatorError::Config(
                "reconcile interval must be positive".to_string(),
            ));
        }
        let logger = self
            .logger
            .unwrap_or_else(|| StructuredLogger::new("kpt-system"));

        Ok(Reconciler::new(
            store,
            dispatcher,
            self.config,
            self.health,
            logger,
        ))
    }
}

impl Default for ReconcilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
