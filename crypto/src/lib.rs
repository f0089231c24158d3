//! Cryptographic primitives for the encrypted vote ledger.
//!
//! - **Argon2id** derives the ledger key from the operator secret
//! - **AES-256-GCM** seals the ledger file (primary mode, version 2)
//! - **ChaCha20-Poly1305 + HMAC-SHA256** seals it in compatibility mode (version 1)
//! - **Blake2b** computes the tamper-evidence content hash

pub mod envelope;
pub mod error;
pub mod hash;
pub mod kdf;

pub use envelope::{open, seal, CipherMode, Envelope, VERSION_AES_GCM, VERSION_CHACHA_HMAC};
pub use error::CryptoError;
pub use hash::{content_hash, digest};
pub use kdf::{KdfParams, LedgerKey};
