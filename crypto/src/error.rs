use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("encryption failed: {0}")]
    Encrypt(String),

    #[error("decryption failed: wrong secret or corrupted data")]
    Decrypt,

    #[error("integrity checksum mismatch")]
    ChecksumMismatch,

    #[error("unsupported envelope version: {0}")]
    UnsupportedVersion(u32),

    #[error("malformed envelope: {0}")]
    Malformed(String),
}
