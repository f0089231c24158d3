//! The receipt returned for every accepted vote submission.

use serde::{Deserialize, Serialize};

use crate::{BallotId, SyncStatus, Timestamp, VoterId};

/// A write attempt that an endpoint refused or failed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointFailure {
    pub endpoint: String,
    pub error: String,
}

/// Outcome of a vote submission.
///
/// `simulated` is set when no endpoint accepted the vote and the reference is
/// synthetic; `sync_status` then stays `Pending` until reconciliation pushes
/// the vote to an endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_ref: String,
    pub voter_id: VoterId,
    pub ballot_id: BallotId,
    pub simulated: bool,
    pub sync_status: SyncStatus,
    /// Endpoints that hold the vote after this submission.
    pub endpoints: Vec<String>,
    pub failures: Vec<EndpointFailure>,
    /// Whether the encrypted ledger copy was written.
    pub backed_up: bool,
    pub timestamp: Timestamp,
}
