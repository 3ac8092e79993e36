//! Label-based lookup of fleet pods

use crate::error::{OperatorError, Result};
use crate::models::WorkerTarget;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::ListParams;
use kube::{Api, Client};

/// Selector for dispatch targets
pub const PROBE_SELECTOR: &str = "app=kpt-probe";
/// Selector for manager pods (reporting only)
pub const MANAGER_SELECTOR: &str = "app=kpt-manager";
/// Selector for visor pods (reporting only)
pub const VISOR_SELECTOR: &str = "app=kpt-visor";

/// Resolves fleet pods by label selector
#[async_trait]
pub trait WorkerDiscovery: Send + Sync {
    /// Find all pods matching `selector` across all namespaces
    async fn discover(&self, selector: &str) -> Result<Vec<WorkerTarget>>;
}

/// [`WorkerDiscovery`] backed by the Kubernetes pod API
#[derive(Clone)]
pub struct KubeWorkerDiscovery {
    client: Client,
}

impl KubeWorkerDiscovery {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WorkerDiscovery for KubeWorkerDiscovery {
    async fn discover(&self, selector: &str) -> Result<Vec<WorkerTarget>> {
        let pods: Api<Pod> = Api::all(self.client.clone());
        let list = pods
            .list(&ListParams::default().labels(selector))
            .await
            .map_err(|source| OperatorError::Discovery {
                selector: selector.to_string(),
                source,
            })?;

        Ok(list.items.iter().map(worker_target).collect())
    }
}

fn worker_target(pod: &Pod) -> WorkerTarget {
    let status = pod.status.as_ref();
    WorkerTarget {
        name: pod.metadata.name.clone().unwrap_or_default(),
        namespace: pod.metadata.namespace.clone().unwrap_or_default(),
        address: status
            .and_then(|s| s.pod_ip.clone())
            .filter(|ip| !ip.is_empty()),
        phase: status.and_then(|s| s.phase.clone()),
    }
}
