//! Versioned encryption envelope for the ledger file.
//!
//! Two modes, told apart by the envelope's `version` tag:
//! 1. **Version 2** (primary): AES-256-GCM with a random 96-bit IV. The
//!    authentication tag is stored in its own field next to the ciphertext.
//! 2. **Version 1** (compatibility): ChaCha20-Poly1305 with a random nonce,
//!    plus an explicit HMAC-SHA256 checksum over the plaintext.
//!
//! [`open`] dispatches on the stored version, so a ledger written in either
//! mode stays readable whichever mode the service is configured to write.

use aes_gcm::aead::{Aead, AeadCore, AeadInPlace, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce, Tag};
use chacha20poly1305::ChaCha20Poly1305;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::{digest, CryptoError, LedgerKey};

type HmacSha256 = Hmac<Sha256>;

pub const VERSION_CHACHA_HMAC: u32 = 1;
pub const VERSION_AES_GCM: u32 = 2;

const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;
const AES_AAD: &[u8] = b"tally-ledger/v2";

/// Which envelope version new writes use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CipherMode {
    #[default]
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
    #[serde(rename = "chacha20-poly1305-hmac")]
    ChaCha20Poly1305Hmac,
}

impl CipherMode {
    pub fn version(&self) -> u32 {
        match self {
            Self::Aes256Gcm => VERSION_AES_GCM,
            Self::ChaCha20Poly1305Hmac => VERSION_CHACHA_HMAC,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Aes256Gcm => "aes-256-gcm",
            Self::ChaCha20Poly1305Hmac => "chacha20-poly1305-hmac",
        }
    }
}

/// The on-disk form of an encrypted ledger file, serialized as JSON.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: u32,
    pub cipher: String,
    /// Hex-encoded IV / nonce.
    pub iv: String,
    /// Hex-encoded AES-GCM authentication tag (version 2 only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Hex-encoded HMAC-SHA256 of the plaintext (version 1 only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Hex-encoded ciphertext.
    pub ciphertext: String,
}

/// Encrypt `plaintext` under `key` in the given mode.
pub fn seal(key: &LedgerKey, mode: CipherMode, plaintext: &[u8]) -> Result<Envelope, CryptoError> {
    match mode {
        CipherMode::Aes256Gcm => seal_aes_gcm(key, plaintext),
        CipherMode::ChaCha20Poly1305Hmac => seal_chacha_hmac(key, plaintext),
    }
}

/// Decrypt an envelope, dispatching on its version tag.
pub fn open(key: &LedgerKey, envelope: &Envelope) -> Result<Vec<u8>, CryptoError> {
    match envelope.version {
        VERSION_AES_GCM => open_aes_gcm(key, envelope),
        VERSION_CHACHA_HMAC => open_chacha_hmac(key, envelope),
        other => Err(CryptoError::UnsupportedVersion(other)),
    }
}

fn seal_aes_gcm(key: &LedgerKey, plaintext: &[u8]) -> Result<Envelope, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::Encrypt(format!("AES key init failed: {e}")))?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(&nonce, AES_AAD, &mut buffer)
        .map_err(|e| CryptoError::Encrypt(e.to_string()))?;

    Ok(Envelope {
        version: VERSION_AES_GCM,
        cipher: CipherMode::Aes256Gcm.name().to_string(),
        iv: hex::encode(nonce),
        tag: Some(hex::encode(tag)),
        checksum: None,
        ciphertext: hex::encode(buffer),
    })
}

fn open_aes_gcm(key: &LedgerKey, envelope: &Envelope) -> Result<Vec<u8>, CryptoError> {
    let iv = decode_exact(&envelope.iv, IV_LEN, "iv")?;
    let tag_hex = envelope
        .tag
        .as_deref()
        .ok_or_else(|| CryptoError::Malformed("missing authentication tag".into()))?;
    let tag = decode_exact(tag_hex, TAG_LEN, "tag")?;
    let mut buffer = decode_hex(&envelope.ciphertext, "ciphertext")?;

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::Encrypt(format!("AES key init failed: {e}")))?;
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(&iv),
            AES_AAD,
            &mut buffer,
            Tag::from_slice(&tag),
        )
        .map_err(|_| CryptoError::Decrypt)?;

    Ok(buffer)
}

fn seal_chacha_hmac(key: &LedgerKey, plaintext: &[u8]) -> Result<Envelope, CryptoError> {
    let cipher = ChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::Encrypt(format!("ChaCha20 key init failed: {e}")))?;
    let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::Encrypt(e.to_string()))?;

    Ok(Envelope {
        version: VERSION_CHACHA_HMAC,
        cipher: CipherMode::ChaCha20Poly1305Hmac.name().to_string(),
        iv: hex::encode(nonce),
        tag: None,
        checksum: Some(hex::encode(checksum(key, plaintext)?)),
        ciphertext: hex::encode(ciphertext),
    })
}

fn open_chacha_hmac(key: &LedgerKey, envelope: &Envelope) -> Result<Vec<u8>, CryptoError> {
    let nonce = decode_exact(&envelope.iv, IV_LEN, "iv")?;
    let expected = envelope
        .checksum
        .as_deref()
        .ok_or_else(|| CryptoError::Malformed("missing integrity checksum".into()))?;
    let expected = decode_hex(expected, "checksum")?;
    let ciphertext = decode_hex(&envelope.ciphertext, "ciphertext")?;

    let cipher = ChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::Encrypt(format!("ChaCha20 key init failed: {e}")))?;
    let plaintext = cipher
        .decrypt(chacha20poly1305::Nonce::from_slice(&nonce), ciphertext.as_ref())
        .map_err(|_| CryptoError::Decrypt)?;

    let mut mac = mac_for(key)?;
    mac.update(&plaintext);
    mac.verify_slice(&expected)
        .map_err(|_| CryptoError::ChecksumMismatch)?;

    Ok(plaintext)
}

/// HMAC keyed by a subkey so the MAC and cipher never share key bytes.
fn mac_for(key: &LedgerKey) -> Result<HmacSha256, CryptoError> {
    let mac_key = digest(&[key.as_bytes(), b"tally-ledger-mac"]);
    <HmacSha256 as Mac>::new_from_slice(&mac_key)
        .map_err(|e| CryptoError::Encrypt(format!("HMAC key init failed: {e}")))
}

fn checksum(key: &LedgerKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut mac = mac_for(key)?;
    mac.update(plaintext);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn decode_hex(s: &str, field: &str) -> Result<Vec<u8>, CryptoError> {
    hex::decode(s).map_err(|e| CryptoError::Malformed(format!("invalid {field} hex: {e}")))
}

fn decode_exact(s: &str, len: usize, field: &str) -> Result<Vec<u8>, CryptoError> {
    let bytes = decode_hex(s, field)?;
    if bytes.len() != len {
        return Err(CryptoError::Malformed(format!(
            "invalid {field} length: expected {len}, got {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}
