//! Vote records and their endpoint wire form.

use serde::{Deserialize, Serialize};

use crate::{BallotId, Timestamp, TypeError, VoterId};

/// One position → candidate choice inside a ballot.
///
/// The core treats selections as opaque; it only preserves their order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub position: String,
    pub candidate: String,
}

/// Whether a record is known to be present on at least one ledger endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Synced,
}

/// How a record came to be in the encrypted ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordSource {
    /// Written to at least one endpoint, mirrored locally as a backup.
    PrimaryEndpointWrite,
    /// No endpoint accepted the vote; the ledger holds the only copy.
    EmergencyFallback,
    /// A fallback record that was later replaced by a resubmission.
    EmergencyFallbackUpdated,
    /// Pulled from an endpoint that knew a ballot the ledger did not.
    ReconciledFromEndpoint,
    /// A fallback record that reconciliation has since pushed to an endpoint.
    ReconciledFromLedger,
}

impl RecordSource {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::EmergencyFallback | Self::EmergencyFallbackUpdated)
    }
}

/// A single vote as stored in the encrypted ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    pub voter_id: VoterId,
    pub ballot_id: BallotId,
    pub selections: Vec<Selection>,
    /// Submission time as reported by the caller.
    pub timestamp: Timestamp,
    /// Opaque integrity tag supplied by the caller.
    pub voter_hash: String,
    /// Endpoint transaction reference, or a synthetic one for simulated receipts.
    #[serde(default)]
    pub tx_ref: Option<String>,
    pub sync_status: SyncStatus,
    pub source: RecordSource,
    /// Last time this record was written to the ledger.
    #[serde(default)]
    pub updated_at: Timestamp,
}

impl VoteRecord {
    /// Whether reconciliation still needs to push this record to an endpoint.
    pub fn needs_sync(&self) -> bool {
        self.sync_status == SyncStatus::Pending || self.source.is_fallback()
    }

    /// The contract-call form of this record.
    pub fn to_wire(&self) -> WireVote {
        WireVote {
            voter_id: self.voter_id.clone(),
            ballot_id: self.ballot_id.clone(),
            votes_payload: encode_payload(&self.selections),
            timestamp_secs: self.timestamp.as_secs(),
            voter_hash: self.voter_hash.clone(),
        }
    }

    /// Rebuild a ledger record from a vote fetched from an endpoint.
    pub fn from_wire(
        wire: WireVote,
        source: RecordSource,
        now: Timestamp,
    ) -> Result<Self, TypeError> {
        let selections = decode_payload(&wire.votes_payload)?;
        Ok(Self {
            voter_id: wire.voter_id,
            ballot_id: wire.ballot_id,
            selections,
            timestamp: Timestamp::from_secs(wire.timestamp_secs),
            voter_hash: wire.voter_hash,
            tx_ref: None,
            sync_status: SyncStatus::Synced,
            source,
            updated_at: now,
        })
    }
}

/// The tuple exchanged with a ledger endpoint's contract:
/// `(voterId, ballotId, votesPayload, unixTimestampSeconds, voterHash)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireVote {
    pub voter_id: VoterId,
    pub ballot_id: BallotId,
    pub votes_payload: String,
    pub timestamp_secs: u64,
    pub voter_hash: String,
}

/// Serialize selections into the contract's string payload.
pub fn encode_payload(selections: &[Selection]) -> String {
    // A Vec of two-string structs cannot fail to serialize.
    serde_json::to_string(selections).unwrap_or_else(|_| "[]".to_string())
}

/// Parse the contract's string payload back into selections.
pub fn decode_payload(payload: &str) -> Result<Vec<Selection>, TypeError> {
    serde_json::from_str(payload).map_err(|e| TypeError::InvalidPayload(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(source: RecordSource, status: SyncStatus) -> VoteRecord {
        VoteRecord {
            voter_id: VoterId::parse("V1").unwrap(),
            ballot_id: BallotId::parse("B1").unwrap(),
            selections: vec![
                Selection {
                    position: "president".into(),
                    candidate: "alice".into(),
                },
                Selection {
                    position: "treasurer".into(),
                    candidate: "bob".into(),
                },
            ],
            timestamp: Timestamp::from_secs(1_700_000_000),
            voter_hash: "h1".into(),
            tx_ref: None,
            sync_status: status,
            source,
            updated_at: Timestamp::from_secs(1_700_000_000),
        }
    }

    #[test]
    fn wire_form_preserves_selection_order() {
        let vote = record(RecordSource::PrimaryEndpointWrite, SyncStatus::Synced);
        let wire = vote.to_wire();
        assert_eq!(wire.timestamp_secs, 1_700_000_000);

        let back = VoteRecord::from_wire(
            wire,
            RecordSource::ReconciledFromEndpoint,
            Timestamp::from_secs(1),
        )
        .unwrap();
        assert_eq!(back.selections, vote.selections);
        assert_eq!(back.sync_status, SyncStatus::Synced);
    }

    #[test]
    fn malformed_payload_is_rejected() {
        assert!(decode_payload("not json").is_err());
    }

    #[test]
    fn fallback_records_need_sync_even_when_marked_synced() {
        assert!(record(RecordSource::EmergencyFallback, SyncStatus::Synced).needs_sync());
        assert!(record(RecordSource::PrimaryEndpointWrite, SyncStatus::Pending).needs_sync());
        assert!(!record(RecordSource::ReconciledFromLedger, SyncStatus::Synced).needs_sync());
    }

    #[test]
    fn sources_use_kebab_case_tags() {
        let json = serde_json::to_string(&RecordSource::EmergencyFallbackUpdated).unwrap();
        assert_eq!(json, "\"emergency-fallback-updated\"");
    }
}
