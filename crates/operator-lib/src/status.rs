//! Status derivation and merging
//!
//! The next status is a pure function of the latest dispatch outcome. Any
//! phase can reach any other; there is no legality table.

use crate::models::{KptMonitorStatus, MonitorPhase};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

pub const MSG_CREATED: &str = "CR has been created";
pub const MSG_NO_PROBES: &str = "No probes found";
pub const MSG_ALL_FAILED: &str = "Failed to send to any probe";

/// Aggregated result of delivering one request to the probe fleet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub succeeded: usize,
    pub total: usize,
}

impl DispatchOutcome {
    pub fn new(succeeded: usize, total: usize) -> Self {
        Self { succeeded, total }
    }

    pub fn no_targets() -> Self {
        Self::new(0, 0)
    }
}

/// Status fields computed for one reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub phase: MonitorPhase,
    pub message: String,
}

impl StatusUpdate {
    pub fn new(phase: MonitorPhase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
        }
    }

    pub fn created() -> Self {
        Self::new(MonitorPhase::Created, MSG_CREATED)
    }
}

/// Map a dispatch outcome to a status. Any success at all means monitoring.
pub fn status_from_outcome(outcome: &DispatchOutcome) -> StatusUpdate {
    if outcome.succeeded > 0 {
        StatusUpdate::new(
            MonitorPhase::Monitoring,
            format!(
                "Processed and sent to {}/{} probes",
                outcome.succeeded, outcome.total
            ),
        )
    } else if outcome.total == 0 {
        StatusUpdate::new(MonitorPhase::Failed, MSG_NO_PROBES)
    } else {
        StatusUpdate::new(MonitorPhase::Failed, MSG_ALL_FAILED)
    }
}

/// Compute the status to write for this pass.
///
/// With no outcome (dispatch disabled) only an object without any status
/// gets stamped `Created`; otherwise nothing is written.
pub fn next_status(
    current: Option<&KptMonitorStatus>,
    outcome: Option<&DispatchOutcome>,
) -> Option<StatusUpdate> {
    match (outcome, current) {
        (Some(outcome), _) => Some(status_from_outcome(outcome)),
        (None, None) => Some(StatusUpdate::created()),
        (None, Some(_)) => None,
    }
}

/// Merge `update` into the object's status sub-object.
///
/// Field-level overwrite: other status fields and everything outside
/// `.status` are kept as they were.
pub fn merge_status(object: &Value, update: &StatusUpdate, now: DateTime<Utc>) -> Value {
    let mut merged = object.clone();

    if let Some(root) = merged.as_object_mut() {
        let status = root
            .entry("status")
            .or_insert_with(|| Value::Object(Map::new()));
        if !status.is_object() {
            *status = Value::Object(Map::new());
        }

        if let Some(fields) = status.as_object_mut() {
            fields.insert(
                "status".to_string(),
                Value::String(update.phase.as_str().to_string()),
            );
            fields.insert("message".to_string(), Value::String(update.message.clone()));
            fields.insert(
                "lastUpdated".to_string(),
                Value::String(now.to_rfc3339_opts(SecondsFormat::Secs, true)),
            );
        }
    }

    merged
}
