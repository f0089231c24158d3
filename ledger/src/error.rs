use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("crypto error: {0}")]
    Crypto(#[from] tally_crypto::CryptoError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("content hash mismatch in {0}")]
    Tampered(String),

    #[error("ledger unrecoverable: {0}")]
    Unrecoverable(String),
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        LedgerError::Serialization(e.to_string())
    }
}
