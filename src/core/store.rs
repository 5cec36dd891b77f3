//! In-memory store of ongoing calls.
//!
//! Keyed by the PBX call identifier, so there is never more than one record
//! per call. The store is owned by the reconciler and lives only as long as
//! the process.

use std::collections::{HashMap, HashSet};

use crate::domain::CallRecord;

/// Ongoing calls known to the bridge
#[derive(Debug, Default)]
pub struct CallStore {
    calls: HashMap<String, CallRecord>,
}

impl CallStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&CallRecord> {
        self.calls.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.calls.contains_key(id)
    }

    /// Insert or overwrite the record stored under its id
    pub fn upsert(&mut self, record: CallRecord) {
        self.calls.insert(record.id.clone(), record);
    }

    pub fn remove(&mut self, id: &str) -> Option<CallRecord> {
        self.calls.remove(id)
    }

    /// Ids of stored calls that are missing from `seen`, sorted so that
    /// hangups go out in a stable order
    pub fn absent_from(&self, seen: &HashSet<String>) -> Vec<String> {
        let mut ended: Vec<String> = self
            .calls
            .keys()
            .filter(|id| !seen.contains(*id))
            .cloned()
            .collect();
        ended.sort();
        ended
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}
