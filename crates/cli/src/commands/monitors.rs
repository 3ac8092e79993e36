//! KptMonitor listing

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use kube::Client;
use operator_lib::store::{KubeMonitorStore, MonitorStore};
use operator_lib::MonitorObject;
use serde::Serialize;
use tabled::Tabled;

use crate::output::{
    color_status, format_age, print_json, print_table, print_warning, truncate, OutputFormat,
};

const MESSAGE_WIDTH: usize = 48;

/// One listed KptMonitor
#[derive(Debug, Clone, Serialize, Tabled)]
#[serde(rename_all = "camelCase")]
pub struct MonitorRow {
    #[tabled(rename = "Namespace")]
    pub namespace: String,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Target NS")]
    pub target_namespace: String,
    #[tabled(rename = "Target Pods")]
    pub target_pods: String,
    #[tabled(rename = "Tap Duration")]
    pub tap_duration: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Message")]
    pub message: String,
    #[tabled(rename = "Age")]
    pub age: String,
}

impl MonitorRow {
    pub fn from_object(object: &MonitorObject, now: DateTime<Utc>) -> Self {
        let status = object.status.as_ref();
        Self {
            namespace: object.key.namespace.clone(),
            name: object.key.name.clone(),
            target_namespace: object.spec.namespace.clone(),
            target_pods: object.spec.target_pods.clone(),
            tap_duration: object.spec.tap_duration.clone(),
            status: object
                .phase()
                .map(|phase| phase.as_str().to_string())
                .unwrap_or_default(),
            message: status.and_then(|s| s.message.clone()).unwrap_or_default(),
            age: format_age(object.creation_timestamp, now),
        }
    }
}

/// Decode listed objects into rows, sorted by namespace then name.
/// Objects that fail to decode are returned as error strings.
pub fn build_rows(
    raw: Vec<serde_json::Value>,
    now: DateTime<Utc>,
) -> (Vec<MonitorRow>, Vec<String>) {
    let mut rows = Vec::new();
    let mut invalid = Vec::new();

    for value in raw {
        match MonitorObject::decode(value) {
            Ok(object) => rows.push(MonitorRow::from_object(&object, now)),
            Err(e) => invalid.push(e.to_string()),
        }
    }

    rows.sort_by(|a, b| (&a.namespace, &a.name).cmp(&(&b.namespace, &b.name)));
    (rows, invalid)
}

/// `kptctl get monitors`
pub async fn get_monitors(
    client: Client,
    namespace: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let store = match namespace {
        Some(ns) => KubeMonitorStore::namespaced(client, ns),
        None => KubeMonitorStore::new(client),
    };

    let raw = store.list().await.context("Failed to list KptMonitors")?;
    let (rows, invalid) = build_rows(raw, Utc::now());

    for error in &invalid {
        print_warning(&format!("Skipping invalid KptMonitor: {}", error));
    }

    match format {
        OutputFormat::Json => print_json(&rows)?,
        OutputFormat::Table => {
            let rows: Vec<MonitorRow> = rows
                .into_iter()
                .map(|row| MonitorRow {
                    status: color_status(&row.status),
                    message: truncate(&row.message, MESSAGE_WIDTH),
                    ..row
                })
                .collect();
            print_table(&rows);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn monitor(namespace: &str, name: &str, status: Option<serde_json::Value>) -> serde_json::Value {
        let mut value = json!({
            "apiVersion": "kpt.kubeseek.com/v1",
            "kind": "KptMonitor",
            "metadata": {
                "name": name,
                "namespace": namespace,
                "resourceVersion": "7",
                "creationTimestamp": "2026-01-01T00:00:00Z"
            },
            "spec": {
                "namespace": "shop",
                "targetPods": "app=checkout",
                "tapDuration": "30s"
            }
        });
        if let Some(status) = status {
            value["status"] = status;
        }
        value
    }

    #[test]
    fn test_rows_sorted_and_filled() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 2, 0, 0).unwrap();
        let raw = vec![
            monitor("default", "b-tap", None),
            monitor(
                "default",
                "a-tap",
                Some(json!({"status": "Monitoring", "message": "Processed and sent to 2/2 probes"})),
            ),
        ];

        let (rows, invalid) = build_rows(raw, now);

        assert!(invalid.is_empty());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "a-tap");
        assert_eq!(rows[0].status, "Monitoring");
        assert_eq!(rows[0].message, "Processed and sent to 2/2 probes");
        assert_eq!(rows[0].target_pods, "app=checkout");
        assert_eq!(rows[0].age, "2h");
        assert_eq!(rows[1].status, "");
    }

    #[test]
    fn test_invalid_objects_reported() {
        let mut broken = monitor("default", "broken", None);
        broken["spec"] = json!({"namespace": "shop"});

        let (rows, invalid) = build_rows(vec![broken, monitor("default", "ok", None)], Utc::now());

        assert_eq!(rows.len(), 1);
        assert_eq!(invalid.len(), 1);
        assert!(invalid[0].contains("default/broken"));
    }

    #[test]
    fn test_json_uses_camel_case() {
        let (rows, _) = build_rows(vec![monitor("default", "tap", None)], Utc::now());
        let value = serde_json::to_value(&rows[0]).unwrap();

        assert_eq!(value["targetNamespace"], "shop");
        assert_eq!(value["tapDuration"], "30s");
    }
}
