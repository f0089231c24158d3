//! Capped ring of recent synchronization activity, kept for observability.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::Timestamp;

/// Which pass or action produced a history entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    EndpointToEndpoint,
    LedgerToEndpoints,
    EndpointsToLedger,
    Recovery,
    Reset,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncHistoryEntry {
    pub operation: SyncOperation,
    pub timestamp: Timestamp,
    pub synced: u64,
    pub errored: u64,
    pub emergency: bool,
    pub endpoints_connected: usize,
}

/// Append-only ring holding the most recent `capacity` entries.
#[derive(Clone, Debug)]
pub struct SyncHistory {
    entries: VecDeque<SyncHistoryEntry>,
    capacity: usize,
}

impl SyncHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: SyncHistoryEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// The newest `n` entries, oldest first.
    pub fn tail(&self, n: usize) -> Vec<SyncHistoryEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
