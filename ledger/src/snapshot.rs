//! The versioned container held in each ledger file.
//!
//! The content hash covers the serialized vote list plus the operator
//! secret, so an edit to the decrypted votes that does not also recompute the
//! hash with the secret is detected on the next load.

use serde::{Deserialize, Serialize};

use tally_types::{BallotId, ElectionState, Timestamp, VoteRecord, VoterId};

/// Container schema version written by this build.
pub const SCHEMA_VERSION: u32 = 2;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerMetadata {
    pub created_at: Timestamp,
    pub last_updated: Timestamp,
    pub total_votes: u64,
    /// Copy of the election state as of the last write.
    #[serde(default)]
    pub election_state: ElectionState,
    /// Hex Blake2b of `votes || secret`; absent in files from older schemas.
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub schema_version: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub votes: Vec<VoteRecord>,
    pub metadata: LedgerMetadata,
}

/// Result of comparing the stored hash against the vote list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashCheck {
    Match,
    Missing,
    Mismatch,
}

impl LedgerSnapshot {
    /// A freshly initialized, empty ledger.
    pub fn empty(now: Timestamp) -> Self {
        Self {
            votes: Vec::new(),
            metadata: LedgerMetadata {
                created_at: now,
                last_updated: now,
                total_votes: 0,
                election_state: ElectionState::default(),
                hash: None,
                schema_version: SCHEMA_VERSION,
            },
        }
    }

    pub fn compute_hash(&self, secret: &[u8]) -> String {
        // Vec<VoteRecord> serializes field-by-field in declaration order.
        let votes = serde_json::to_vec(&self.votes).unwrap_or_default();
        tally_crypto::content_hash(&votes, secret)
    }

    pub fn verify(&self, secret: &[u8]) -> HashCheck {
        match self.metadata.hash.as_deref() {
            None | Some("") => HashCheck::Missing,
            Some(stored) if stored == self.compute_hash(secret) => HashCheck::Match,
            Some(_) => HashCheck::Mismatch,
        }
    }

    /// Recompute count, hash and schema version before a write.
    pub fn seal_metadata(&mut self, secret: &[u8], now: Timestamp) {
        self.metadata.total_votes = self.votes.len() as u64;
        self.metadata.hash = Some(self.compute_hash(secret));
        self.metadata.last_updated = now;
        self.metadata.schema_version = SCHEMA_VERSION;
    }

    /// Index of the record matching either the ballot id or the voter id.
    pub fn position_of(&self, ballot: &BallotId, voter: &VoterId) -> Option<usize> {
        self.votes
            .iter()
            .position(|v| &v.ballot_id == ballot || &v.voter_id == voter)
    }

    pub fn contains_ballot(&self, ballot: &BallotId) -> bool {
        self.votes.iter().any(|v| &v.ballot_id == ballot)
    }

    pub fn vote_by_voter(&self, voter: &VoterId) -> Option<&VoteRecord> {
        self.votes.iter().find(|v| &v.voter_id == voter)
    }

    /// Records still waiting to reach an endpoint, in ledger order.
    pub fn pending(&self) -> impl Iterator<Item = &VoteRecord> {
        self.votes.iter().filter(|v| v.needs_sync())
    }

    pub fn pending_count(&self) -> usize {
        self.pending().count()
    }
}
