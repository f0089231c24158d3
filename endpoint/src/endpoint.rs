use std::future::Future;

use serde::{Deserialize, Serialize};
use tally_types::{BallotId, VoterId, WireVote};

use crate::EndpointError;

/// Acknowledgement of an accepted contract write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_ref: String,
    #[serde(default)]
    pub block_height: Option<u64>,
}

/// The contract-call surface of one ledger endpoint.
///
/// Every call is fallible and async. Implementations report an
/// already-present vote as [`EndpointError::AlreadyExists`] so callers can
/// treat resubmission as success.
pub trait LedgerEndpoint: Send + Sync + 'static {
    /// Logical name, e.g. `primary`.
    fn name(&self) -> &str;

    fn url(&self) -> &str;

    /// Transport liveness, independent of any contract.
    fn is_listening(&self) -> impl Future<Output = Result<bool, EndpointError>> + Send;

    /// Signing accounts usable as the `from` address of writes.
    fn accounts(&self) -> impl Future<Output = Result<Vec<String>, EndpointError>> + Send;

    fn block_height(&self) -> impl Future<Output = Result<u64, EndpointError>> + Send;

    /// Bind the vote contract at `address`, failing with
    /// [`EndpointError::InvalidAddress`] or [`EndpointError::NoContract`].
    fn bind_contract(
        &self,
        address: &str,
    ) -> impl Future<Output = Result<(), EndpointError>> + Send;

    fn submit_vote(
        &self,
        from: &str,
        vote: &WireVote,
    ) -> impl Future<Output = Result<TxReceipt, EndpointError>> + Send;

    fn vote_exists(
        &self,
        ballot: &BallotId,
    ) -> impl Future<Output = Result<bool, EndpointError>> + Send;

    fn get_vote(
        &self,
        ballot: &BallotId,
    ) -> impl Future<Output = Result<WireVote, EndpointError>> + Send;

    /// Every ballot id on the endpoint, in the contract's enumeration order.
    fn get_all_votes(&self) -> impl Future<Output = Result<Vec<BallotId>, EndpointError>> + Send;

    fn get_total_votes(&self) -> impl Future<Output = Result<u64, EndpointError>> + Send;

    fn has_voted(
        &self,
        voter: &VoterId,
    ) -> impl Future<Output = Result<bool, EndpointError>> + Send;

    fn reset_votes(&self, from: &str) -> impl Future<Output = Result<(), EndpointError>> + Send;
}
