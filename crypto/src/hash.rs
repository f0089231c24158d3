//! Blake2b digests: the ledger's tamper-evidence hash and derived identifiers.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

type Blake2b256 = Blake2b<U32>;

/// Blake2b-256 over the concatenation of `parts`, fed without copying.
pub fn digest(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// The ledger's content hash: `hex(blake2b(votes || secret))`.
///
/// Without the operator secret the hash cannot be recomputed after an edit
/// to the decrypted vote list.
pub fn content_hash(votes: &[u8], secret: &[u8]) -> String {
    hex::encode(digest(&[votes, secret]))
}
