//! Fundamental types for the tally vote-availability core.
//!
//! This crate defines the types shared across every other crate in the
//! workspace: voter and ballot identifiers, vote records, election state,
//! receipts, sync history and the read-side snapshots handed to callers.

pub mod election;
pub mod error;
pub mod history;
pub mod ids;
pub mod receipt;
pub mod report;
pub mod time;
pub mod vote;

pub use election::{ElectionState, ElectionStatus};
pub use error::TypeError;
pub use history::{SyncHistory, SyncHistoryEntry, SyncOperation};
pub use ids::{BallotId, VoterId};
pub use receipt::{EndpointFailure, Receipt};
pub use report::{
    ActiveEndpoint, DataIntegrity, ElectionResults, EndpointResetOutcome, LedgerIntegrity,
    ResetReport, ResultsSource,
};
pub use time::Timestamp;
pub use vote::{RecordSource, Selection, SyncStatus, VoteRecord, WireVote};
