use tally_types::{BallotId, ElectionStatus, VoterId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("ledger error: {0}")]
    Ledger(#[from] tally_ledger::LedgerError),

    #[error("endpoint error: {0}")]
    Endpoint(#[from] tally_endpoint::EndpointError),

    #[error("election error: {0}")]
    Election(#[from] tally_election::ElectionError),

    #[error("invalid input: {0}")]
    InvalidInput(#[from] tally_types::TypeError),

    #[error("config error: {0}")]
    Config(String),

    #[error("service not initialized")]
    NotInitialized,

    #[error("voter {0} already cast a different ballot")]
    AlreadyVoted(VoterId),

    #[error("ballot {0} already belongs to another voter")]
    BallotConflict(BallotId),

    #[error("election is {0}; votes are not accepted")]
    ElectionClosed(ElectionStatus),

    #[error("background task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
