//! Read-side reports handed to the election-state controller.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::Timestamp;

/// How the encrypted ledger's most recent load went.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerIntegrity {
    /// No ledger file existed yet.
    #[default]
    Fresh,
    /// Primary file decrypted and its content hash matched.
    Verified,
    /// Primary file carried no hash; one was computed and persisted.
    Regenerated,
    /// Primary file was unreadable or tampered; the backup was used.
    RecoveredFromBackup,
    /// Primary and backup were both unusable; an empty ledger replaced them.
    Reinitialized,
}

impl LedgerIntegrity {
    /// Whether votes may have been lost on the way to this state.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::RecoveredFromBackup | Self::Reinitialized)
    }
}

/// Where a results tally was computed from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "endpoint")]
pub enum ResultsSource {
    Endpoint(String),
    Ledger,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataIntegrity {
    pub ledger: LedgerIntegrity,
    /// Whether the tallied store and the encrypted ledger hold the same count.
    pub consistent: bool,
    pub ledger_votes: u64,
    pub pending_votes: u64,
}

/// Per-position, per-candidate vote counts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionResults {
    pub positions: BTreeMap<String, BTreeMap<String, u64>>,
    pub total_votes: u64,
    pub source: ResultsSource,
    pub integrity: DataIntegrity,
}

/// The endpoint read paths should use right now.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ActiveEndpoint {
    Endpoint { name: String, account: String },
    /// No endpoint qualifies; reads are served from the encrypted ledger.
    Emergency,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointResetOutcome {
    pub endpoint: String,
    pub reset: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Summary of a full reset, also written to the audit archive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetReport {
    pub timestamp: Timestamp,
    pub previous_votes: u64,
    /// The in-memory clear always succeeds.
    pub memory_cleared: bool,
    pub ledger_reset: bool,
    pub endpoints: Vec<EndpointResetOutcome>,
    #[serde(default)]
    pub archive: Option<String>,
}

impl ResetReport {
    /// Whether every step, including every endpoint reset, succeeded.
    pub fn is_complete(&self) -> bool {
        self.memory_cleared && self.ledger_reset && self.endpoints.iter().all(|e| e.reset)
    }
}
