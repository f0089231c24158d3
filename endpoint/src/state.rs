//! Per-endpoint health record maintained by the monitor and reconciler.

use serde::{Deserialize, Serialize};
use tally_types::Timestamp;

/// Contract availability as last observed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    #[default]
    Unknown,
    /// Nothing deployed at the configured address.
    NoContract,
    /// The configured address is malformed.
    InvalidAddress,
    Synced,
    Error,
    /// A reconciliation pass toward this endpoint stopped midway.
    SyncFailed,
}

impl ContractStatus {
    /// Misconfiguration that only an operator can fix.
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::NoContract | Self::InvalidAddress)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointState {
    pub name: String,
    pub url: String,
    pub connected: bool,
    /// Discovered signing account used as `from` on writes.
    pub account: Option<String>,
    pub contract_status: ContractStatus,
    pub contract_bound: bool,
    /// Consecutive failed writes since the last success.
    pub failures: u32,
    /// Consecutive failed recovery attempts, drives the backoff.
    pub recovery_attempts: u32,
    pub next_recovery_at: Option<Timestamp>,
    pub last_sync: Option<Timestamp>,
    pub last_data_received: Option<Timestamp>,
    pub block_height: Option<u64>,
}

impl EndpointState {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            connected: false,
            account: None,
            contract_status: ContractStatus::Unknown,
            contract_bound: false,
            failures: 0,
            recovery_attempts: 0,
            next_recovery_at: None,
            last_sync: None,
            last_data_received: None,
            block_height: None,
        }
    }

    /// Eligible for writes and reconciliation.
    pub fn is_routable(&self) -> bool {
        self.connected && self.contract_bound && self.account.is_some()
    }

    /// Count a failed write. Returns `true` if this failure reached
    /// `ceiling` and disconnected the endpoint.
    pub fn record_failure(&mut self, ceiling: u32) -> bool {
        self.failures = self.failures.saturating_add(1);
        if self.connected && self.failures >= ceiling {
            self.connected = false;
            return true;
        }
        false
    }

    pub fn record_success(&mut self, now: Timestamp) {
        self.failures = 0;
        self.last_data_received = Some(now);
    }

    /// Whether the failure ceiling still holds the endpoint down.
    pub fn at_ceiling(&self, ceiling: u32) -> bool {
        self.failures >= ceiling
    }

    pub fn mark_synced(&mut self, now: Timestamp) {
        self.contract_status = ContractStatus::Synced;
        self.last_sync = Some(now);
    }

    pub fn mark_sync_failed(&mut self) {
        self.contract_status = ContractStatus::SyncFailed;
    }

    /// Clear recovery bookkeeping after the endpoint came back.
    pub fn reset_recovery(&mut self) {
        self.failures = 0;
        self.recovery_attempts = 0;
        self.next_recovery_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn routable() -> EndpointState {
        let mut state = EndpointState::new("primary", "http://127.0.0.1:8545");
        state.connected = true;
        state.contract_bound = true;
        state.account = Some("0xabc".into());
        state
    }

    #[test]
    fn ceiling_forces_disconnect() {
        let mut state = routable();
        assert!(!state.record_failure(3));
        assert!(!state.record_failure(3));
        assert!(state.record_failure(3));
        assert!(!state.connected);
        assert!(!state.is_routable());
        // further failures do not report a fresh disconnect
        assert!(!state.record_failure(3));
    }

    #[test]
    fn success_clears_failures() {
        let mut state = routable();
        state.record_failure(3);
        state.record_success(Timestamp::from_millis(5));
        assert_eq!(state.failures, 0);
        assert_eq!(state.last_data_received, Some(Timestamp::from_millis(5)));
    }

    #[test]
    fn routing_needs_account_and_contract() {
        let mut state = routable();
        state.account = None;
        assert!(!state.is_routable());
        let mut state = routable();
        state.contract_bound = false;
        assert!(!state.is_routable());
    }
}
