use thiserror::Error;

#[derive(Debug, Error)]
pub enum TypeError {
    #[error("{0} must not be empty")]
    EmptyIdentifier(&'static str),

    #[error("unknown election status: {0}")]
    UnknownStatus(String),

    #[error("invalid vote payload: {0}")]
    InvalidPayload(String),
}
