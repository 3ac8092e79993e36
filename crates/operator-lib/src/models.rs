//! Data models for KptMonitor resources and probe workers

use crate::error::{OperatorError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// API group of the KptMonitor custom resource
pub const GROUP: &str = "kpt.kubeseek.com";
/// API version of the KptMonitor custom resource
pub const VERSION: &str = "v1";
/// Kind of the KptMonitor custom resource
pub const KIND: &str = "KptMonitor";
/// Plural resource name used in API paths
pub const PLURAL: &str = "kptmonitors";

/// Identity of a namespaced resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Desired monitoring parameters. Opaque to the controller, owned by the probes.
///
/// Also the wire payload delivered to each probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KptMonitorSpec {
    /// Namespace where the target pods live
    pub namespace: String,
    /// Pod selector expression for the pods to tap
    pub target_pods: String,
    /// How long to tap for
    pub tap_duration: String,
}

/// Status phase of a KptMonitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitorPhase {
    Created,
    Monitoring,
    Failed,
}

impl MonitorPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorPhase::Created => "Created",
            MonitorPhase::Monitoring => "Monitoring",
            MonitorPhase::Failed => "Failed",
        }
    }

    /// Parse a phase as stored in `.status.status`
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Created" => Some(MonitorPhase::Created),
            "Monitoring" => Some(MonitorPhase::Monitoring),
            "Failed" => Some(MonitorPhase::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for MonitorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observed status of a KptMonitor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KptMonitorStatus {
    /// `None` when the field is absent or holds an unknown value
    pub phase: Option<MonitorPhase>,
    pub message: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl KptMonitorStatus {
    fn from_value(status: &Value) -> Self {
        Self {
            phase: status
                .get("status")
                .and_then(Value::as_str)
                .and_then(MonitorPhase::parse),
            message: status
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
            last_updated: status
                .get("lastUpdated")
                .and_then(Value::as_str)
                .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
                .map(|ts| ts.with_timezone(&Utc)),
        }
    }
}

/// A KptMonitor as listed from the resource store, decoded at the boundary.
///
/// `raw` keeps the full object so status writes only touch `.status`.
#[derive(Debug, Clone)]
pub struct MonitorObject {
    pub key: ResourceKey,
    pub resource_version: String,
    pub spec: KptMonitorSpec,
    /// `None` when the object has no status sub-object at all
    pub status: Option<KptMonitorStatus>,
    pub creation_timestamp: Option<DateTime<Utc>>,
    pub raw: Value,
}

impl MonitorObject {
    /// Decode a raw object. Missing metadata or spec fields fail closed.
    pub fn decode(raw: Value) -> Result<Self> {
        let metadata = raw.get("metadata");
        let meta_str = |field: &str| {
            metadata
                .and_then(|m| m.get(field))
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        let name = meta_str("name")
            .ok_or_else(|| OperatorError::malformed("<unknown>", "missing metadata.name"))?;
        let namespace = meta_str("namespace").ok_or_else(|| {
            OperatorError::malformed(format!("<unknown>/{}", name), "missing metadata.namespace")
        })?;
        let key = ResourceKey::new(namespace, name);

        let resource_version = meta_str("resourceVersion").ok_or_else(|| {
            OperatorError::malformed(key.to_string(), "missing metadata.resourceVersion")
        })?;

        let spec_value = raw
            .get("spec")
            .cloned()
            .ok_or_else(|| OperatorError::malformed(key.to_string(), "missing spec"))?;
        let spec: KptMonitorSpec = serde_json::from_value(spec_value)
            .map_err(|e| OperatorError::malformed(key.to_string(), format!("invalid spec: {}", e)))?;

        let status = match raw.get("status") {
            None | Some(Value::Null) => None,
            Some(status) if status.is_object() => Some(KptMonitorStatus::from_value(status)),
            Some(_) => {
                return Err(OperatorError::malformed(
                    key.to_string(),
                    "status is not an object",
                ))
            }
        };

        let creation_timestamp = meta_str("creationTimestamp")
            .and_then(|ts| DateTime::parse_from_rfc3339(&ts).ok())
            .map(|ts| ts.with_timezone(&Utc));

        Ok(Self {
            key,
            resource_version,
            spec,
            status,
            creation_timestamp,
            raw,
        })
    }

    /// Current status phase, if any
    pub fn phase(&self) -> Option<MonitorPhase> {
        self.status.as_ref().and_then(|s| s.phase)
    }
}

/// A probe (or other fleet) pod resolved by label selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerTarget {
    pub name: String,
    pub namespace: String,
    /// Pod IP; `None` while the pod has not been assigned one
    pub address: Option<String>,
    pub phase: Option<String>,
}
