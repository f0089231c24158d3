use tally_types::ElectionStatus;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ElectionError {
    #[error("cannot move election from {from} to {to}")]
    InvalidTransition {
        from: ElectionStatus,
        to: ElectionStatus,
    },

    #[error("election is finished; only a full reset re-arms it")]
    Finished,
}
