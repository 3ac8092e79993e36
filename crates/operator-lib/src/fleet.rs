//! Fleet composition report
//!
//! Read-only view of the KPT CRDs and the manager, probe and visor pods.
//! Only probes are ever dispatched to.

use crate::bootstrap::{CrdRegistry, CRD_SELECTOR};
use crate::discovery::{WorkerDiscovery, MANAGER_SELECTOR, PROBE_SELECTOR, VISOR_SELECTOR};
use crate::models::WorkerTarget;
use crate::observability::StructuredLogger;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{info, warn};

/// Role of a pod in the KPT fleet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FleetRole {
    Manager,
    Probe,
    Visor,
}

impl FleetRole {
    pub const ALL: [FleetRole; 3] = [FleetRole::Manager, FleetRole::Probe, FleetRole::Visor];

    pub fn selector(&self) -> &'static str {
        match self {
            FleetRole::Manager => MANAGER_SELECTOR,
            FleetRole::Probe => PROBE_SELECTOR,
            FleetRole::Visor => VISOR_SELECTOR,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FleetRole::Manager => "manager",
            FleetRole::Probe => "probe",
            FleetRole::Visor => "visor",
        }
    }
}

/// A fleet pod as shown in the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FleetPod {
    pub namespace: String,
    pub name: String,
    pub phase: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl From<WorkerTarget> for FleetPod {
    fn from(target: WorkerTarget) -> Self {
        Self {
            namespace: target.namespace,
            name: target.name,
            phase: target.phase.unwrap_or_else(|| "Unknown".to_string()),
            address: target.address,
        }
    }
}

/// Pods found for one role, or the error that prevented the lookup
#[derive(Debug, Clone, Serialize)]
pub struct RoleReport {
    pub role: FleetRole,
    pub pods: Vec<FleetPod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Installed KPT CRDs, or the error that prevented the lookup
#[derive(Debug, Clone, Default, Serialize)]
pub struct CrdReport {
    pub names: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Report across the KPT CRDs and all fleet roles
#[derive(Debug, Clone, Serialize)]
pub struct FleetReport {
    pub crds: CrdReport,
    pub roles: Vec<RoleReport>,
}

impl FleetReport {
    pub fn role(&self, role: FleetRole) -> Option<&RoleReport> {
        self.roles.iter().find(|r| r.role == role)
    }
}

/// Look up the KPT CRDs and every fleet role. A failed lookup only affects
/// its own section of the report.
pub async fn fleet_report(discovery: &dyn WorkerDiscovery, crds: &dyn CrdRegistry) -> FleetReport {
    let crds = match crds.list_names(CRD_SELECTOR).await {
        Ok(mut names) => {
            names.sort();
            CrdReport { names, error: None }
        }
        Err(e) => {
            warn!(selector = CRD_SELECTOR, error = %e, "Failed to list KPT CRDs");
            CrdReport {
                names: Vec::new(),
                error: Some(e.to_string()),
            }
        }
    };

    let mut roles = Vec::with_capacity(FleetRole::ALL.len());

    for role in FleetRole::ALL {
        let report = match discovery.discover(role.selector()).await {
            Ok(targets) => RoleReport {
                role,
                pods: targets.into_iter().map(FleetPod::from).collect(),
                error: None,
            },
            Err(e) => {
                warn!(role = role.as_str(), error = %e, "Failed to list fleet pods");
                RoleReport {
                    role,
                    pods: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        };
        roles.push(report);
    }

    FleetReport { crds, roles }
}

/// Log a fleet report every `period` until shutdown
pub async fn run_fleet_reporter(
    discovery: Arc<dyn WorkerDiscovery>,
    crds: Arc<dyn CrdRegistry>,
    period: Duration,
    logger: StructuredLogger,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = interval(period);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = fleet_report(discovery.as_ref(), crds.as_ref()).await;
                if report.crds.error.is_none() {
                    info!(crds = ?report.crds.names, "Found KPT CRDs");
                }
                for role in &report.roles {
                    if role.error.is_none() {
                        logger.log_fleet(role.role.as_str(), role.pods.len());
                    }
                }
            }
            _ = shutdown.recv() => {
                info!("Shutting down fleet reporter");
                break;
            }
        }
    }
}
