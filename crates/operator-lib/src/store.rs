//! Resource store access for KptMonitor objects

use crate::error::{OperatorError, Result};
use crate::models::{ResourceKey, GROUP, KIND, PLURAL, VERSION};
use async_trait::async_trait;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind, ListParams, PostParams};
use kube::{Api, Client};
use serde_json::Value;
use tracing::debug;

/// Store of KptMonitor objects.
///
/// Objects are exchanged as raw JSON so that a malformed object only fails
/// its own decode and status writes never re-encode spec fields.
#[async_trait]
pub trait MonitorStore: Send + Sync {
    /// List every KptMonitor in scope
    async fn list(&self) -> Result<Vec<Value>>;

    /// Replace the status subresource of an object with the given full object
    async fn replace_status(&self, key: &ResourceKey, object: &Value) -> Result<()>;
}

/// [`MonitorStore`] backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeMonitorStore {
    client: Client,
    resource: ApiResource,
    namespace: Option<String>,
}

impl KubeMonitorStore {
    /// Store over all namespaces
    pub fn new(client: Client) -> Self {
        let gvk = GroupVersionKind::gvk(GROUP, VERSION, KIND);
        Self {
            client,
            resource: ApiResource::from_gvk_with_plural(&gvk, PLURAL),
            namespace: None,
        }
    }

    /// Store limited to one namespace
    pub fn namespaced(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..Self::new(client)
        }
    }
}

#[async_trait]
impl MonitorStore for KubeMonitorStore {
    async fn list(&self) -> Result<Vec<Value>> {
        let api: Api<DynamicObject> = match &self.namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &self.resource),
            None => Api::all_with(self.client.clone(), &self.resource),
        };
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(OperatorError::Store)?;

        debug!(count = list.items.len(), "Listed KptMonitor objects");

        list.items
            .into_iter()
            .map(|obj| serde_json::to_value(obj).map_err(OperatorError::from))
            .collect()
    }

    async fn replace_status(&self, key: &ResourceKey, object: &Value) -> Result<()> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), &key.namespace, &self.resource);
        let data = serde_json::to_vec(object)?;

        api.replace_status(&key.name, &PostParams::default(), data)
            .await
            .map_err(OperatorError::Store)?;

        Ok(())
    }
}
