//! Dedup ledger of processed resource versions
//!
//! Process-local and advisory only. Owned by the reconciler and mutated
//! through `&mut self`, so it never needs locking.

use crate::models::ResourceKey;
use std::collections::HashMap;

/// Maps a resource identity to the last resource version that was processed
#[derive(Debug, Default)]
pub struct DedupLedger {
    entries: HashMap<ResourceKey, String>,
}

impl DedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `version` is the last version recorded for `key`
    pub fn is_processed(&self, key: &ResourceKey, version: &str) -> bool {
        self.entries
            .get(key)
            .map(|last| last == version)
            .unwrap_or(false)
    }

    /// Record the version just processed. Entries are never removed.
    pub fn record(&mut self, key: ResourceKey, version: impl Into<String>) {
        self.entries.insert(key, version.into());
    }

    pub fn last_version(&self, key: &ResourceKey) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
