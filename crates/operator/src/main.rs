//! KPT Operator - KptMonitor reconciliation controller
//!
//! Periodically lists `KptMonitor` resources, forwards each new version to
//! the probe fleet and writes the outcome back to the resource status.

use anyhow::{Context, Result};
use operator_lib::{
    bootstrap::{ensure_crds, CrdRegistry, KubeCrdRegistry},
    client::build_client,
    discovery::{KubeWorkerDiscovery, WorkerDiscovery},
    dispatcher::{Dispatcher, HttpProbeClient},
    fleet::run_fleet_reporter,
    health::{components, HealthRegistry},
    observability::{OperatorMetrics, StructuredLogger},
    reconciler::ReconcilerBuilder,
    store::KubeMonitorStore,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const OPERATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Configuration first so log_level applies to the subscriber
    let config = config::OperatorConfig::load()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)))
        .with(fmt::layer().json())
        .init();

    info!(namespace = %config.namespace, "Starting kpt-operator");

    let client = build_client(config.kubeconfig.as_deref())
        .await
        .context("failed to build Kubernetes client")?;

    let crds: Arc<dyn CrdRegistry> = Arc::new(KubeCrdRegistry::new(client.clone()));
    let actions = ensure_crds(crds.as_ref(), &config.crd_dir)
        .await
        .with_context(|| format!("failed to bootstrap CRDs from {}", config.crd_dir.display()))?;
    info!(crds = actions.len(), "CRD bootstrap complete");

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register(components::RECONCILER).await;
    health_registry.register(components::RESOURCE_STORE).await;
    health_registry.register(components::PROBE_FLEET).await;

    // Register metrics before the first scrape
    let _metrics = OperatorMetrics::new();

    let logger = StructuredLogger::new(&config.namespace);
    logger.log_startup(
        OPERATOR_VERSION,
        config.reconcile_interval_secs,
        config.probe_enabled,
    );

    let dispatch_config = config.dispatch_config();
    let discovery: Arc<dyn WorkerDiscovery> = Arc::new(KubeWorkerDiscovery::new(client.clone()));
    let transport = Arc::new(HttpProbeClient::new(&dispatch_config)?);
    let dispatcher = Dispatcher::new(discovery.clone(), transport, &dispatch_config);

    let reconciler = ReconcilerBuilder::new()
        .store(Arc::new(KubeMonitorStore::new(client)))
        .dispatcher(dispatcher)
        .health(health_registry.clone())
        .logger(logger.clone())
        .interval(config.reconcile_interval())
        .probe_enabled(config.probe_enabled)
        .build()?;

    let (shutdown_tx, _) = broadcast::channel(1);

    let reconciler_handle = tokio::spawn(reconciler.run(shutdown_tx.subscribe()));
    let fleet_handle = tokio::spawn(run_fleet_reporter(
        discovery,
        crds,
        config.fleet_report_interval(),
        logger.clone(),
        shutdown_tx.subscribe(),
    ));

    let app_state = Arc::new(api::AppState::new(health_registry.clone()));
    health_registry.set_ready(true).await;
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    let reason = shutdown_signal().await?;
    logger.log_shutdown(reason);

    // No receivers left only means both loops already exited
    let _ = shutdown_tx.send(());
    if let Err(e) = reconciler_handle.await {
        warn!(error = %e, "Reconciliation loop ended abnormally");
    }
    if let Err(e) = fleet_handle.await {
        warn!(error = %e, "Fleet reporter ended abnormally");
    }
    api_handle.abort();

    info!("Shutdown complete");
    Ok(())
}

/// Wait for SIGINT or, on unix, SIGTERM
async fn shutdown_signal() -> Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                Ok("SIGINT received")
            }
            _ = terminate.recv() => Ok("SIGTERM received"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok("SIGINT received")
    }
}
