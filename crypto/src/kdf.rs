//! Argon2id derivation of the ledger key from the operator secret.
//!
//! The salt is fixed so that the same secret always yields the same key
//! across restarts; the ledger file itself carries no KDF state.

use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::CryptoError;

/// Fixed Argon2 salt for ledger key derivation.
const LEDGER_SALT: &[u8] = b"tally-encrypted-ledger/v1";

const KEY_LEN: usize = 32;

/// Argon2id cost parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    /// 19 MiB, 2 passes, 1 lane.
    fn default() -> Self {
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// A 256-bit symmetric key for the ledger file.
///
/// Wiped on drop. `Debug` never prints key material.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct LedgerKey {
    bytes: [u8; KEY_LEN],
}

impl fmt::Debug for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerKey")
            .field("bytes", &"[redacted]")
            .finish()
    }
}

impl LedgerKey {
    /// Derive the ledger key from `secret` using Argon2id and the fixed salt.
    pub fn derive(secret: &str, params: &KdfParams) -> Result<Self, CryptoError> {
        if secret.is_empty() {
            return Err(CryptoError::KeyDerivation("secret must not be empty".into()));
        }

        let params = Params::new(
            params.memory_kib,
            params.iterations,
            params.parallelism,
            Some(KEY_LEN),
        )
        .map_err(|e| CryptoError::KeyDerivation(format!("Argon2 params error: {e}")))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut bytes = [0u8; KEY_LEN];
        argon2
            .hash_password_into(secret.as_bytes(), LEDGER_SALT, &mut bytes)
            .map_err(|e| CryptoError::KeyDerivation(format!("Argon2 hashing failed: {e}")))?;

        Ok(Self { bytes })
    }

    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIGHT: KdfParams = KdfParams {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    };

    #[test]
    fn derivation_is_deterministic() {
        let a = LedgerKey::derive("operator-secret", &LIGHT).unwrap();
        let b = LedgerKey::derive("operator-secret", &LIGHT).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn different_secrets_give_different_keys() {
        let a = LedgerKey::derive("secret-one", &LIGHT).unwrap();
        let b = LedgerKey::derive("secret-two", &LIGHT).unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn empty_secret_rejected() {
        assert!(LedgerKey::derive("", &LIGHT).is_err());
    }

    #[test]
    fn debug_redacts_key() {
        let key = LedgerKey::from_bytes([7u8; 32]);
        assert!(format!("{key:?}").contains("redacted"));
    }
}
