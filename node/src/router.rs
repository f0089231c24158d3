//! Vote routing: write to every routable endpoint, mirror into the encrypted
//! ledger, and fall back to the ledger alone when no endpoint accepts.

use serde::{Deserialize, Serialize};
use tracing::Instrument;

use tally_crypto::digest;
use tally_endpoint::LedgerEndpoint;
use tally_ledger::LedgerSnapshot;
use tally_types::{
    BallotId, EndpointFailure, Receipt, RecordSource, Selection, SyncStatus, Timestamp,
    VoteRecord, VoterId,
};

use crate::pool::{bounded, EndpointSlot};
use crate::tracing_spans::submit_span;
use crate::{NodeError, VoteService};

/// A vote as handed in by the caller.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VoteSubmission {
    pub voter_id: String,
    pub ballot_id: String,
    pub selections: Vec<Selection>,
    /// Defaults to the time of submission.
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
    #[serde(default)]
    pub voter_hash: String,
}

impl<E: LedgerEndpoint> VoteService<E> {
    /// Record a vote.
    ///
    /// The vote goes to every routable endpoint and is always mirrored into
    /// the encrypted ledger. An endpoint answering "already exists" counts as
    /// a success when its copy of the ballot belongs to the same voter. If no endpoint accepts, the receipt is simulated and the
    /// ledger copy is tagged for later reconciliation.
    pub async fn submit_vote(&self, submission: VoteSubmission) -> Result<Receipt, NodeError> {
        let span = submit_span(&submission.ballot_id);
        self.submit_inner(submission).instrument(span).await
    }

    async fn submit_inner(&self, submission: VoteSubmission) -> Result<Receipt, NodeError> {
        self.ensure_initialized()?;
        let voter_id = VoterId::parse(&submission.voter_id)?;
        let ballot_id = BallotId::parse(&submission.ballot_id)?;

        {
            let gate = self.gate.read().await;
            if !gate.writes_allowed() {
                return Err(NodeError::ElectionClosed(gate.status()));
            }
        }
        let snapshot = self.ledger_task(|ledger| ledger.load()).await?;
        self.reject_conflicting_voter(&snapshot, &voter_id, &ballot_id)
            .await?;

        let now = Timestamp::now();
        let emergency = {
            let mut gate = self.gate.write().await;
            gate.record_data(now);
            gate.is_emergency()
        };

        let mut record = VoteRecord {
            voter_id: voter_id.clone(),
            ballot_id: ballot_id.clone(),
            selections: submission.selections,
            timestamp: submission.timestamp.unwrap_or(now),
            voter_hash: submission.voter_hash,
            tx_ref: None,
            sync_status: SyncStatus::Pending,
            source: RecordSource::EmergencyFallback,
            updated_at: now,
        };
        let wire = record.to_wire();

        let mut accepted = Vec::new();
        let mut failures = Vec::new();
        let mut tx_ref = None;

        if emergency {
            tracing::warn!(ballot = %ballot_id, "emergency mode; vote stored in ledger only");
        } else {
            for slot in &self.slots {
                let Some(account) = slot.routable_account().await else {
                    continue;
                };
                let result = bounded(
                    self.config.request_timeout(),
                    "submit_vote",
                    slot.endpoint.submit_vote(&account, &wire),
                )
                .await;
                match result {
                    Ok(receipt) => {
                        tx_ref.get_or_insert(receipt.tx_ref);
                        accepted.push(slot.name().to_string());
                        self.record_success(slot).await;
                    }
                    Err(e) if e.is_already_exists() => {
                        if self.holds_ballot_for(slot, &ballot_id, &voter_id).await {
                            tracing::debug!(endpoint = slot.name(), "ballot already on endpoint");
                            accepted.push(slot.name().to_string());
                            self.record_success(slot).await;
                        } else {
                            tracing::warn!(endpoint = slot.name(), ballot = %ballot_id, error = %e, "endpoint holds a conflicting vote");
                            failures.push(EndpointFailure {
                                endpoint: slot.name().to_string(),
                                error: e.to_string(),
                            });
                        }
                    }
                    Err(e) => {
                        failures.push(EndpointFailure {
                            endpoint: slot.name().to_string(),
                            error: e.to_string(),
                        });
                        self.record_failure(slot, &e).await;
                    }
                }
            }
        }

        let simulated = accepted.is_empty();
        if !simulated {
            record.sync_status = SyncStatus::Synced;
            record.source = RecordSource::PrimaryEndpointWrite;
        }
        let tx_ref = tx_ref.unwrap_or_else(|| simulated_tx_ref(&voter_id, &ballot_id, now));
        record.tx_ref = Some(tx_ref.clone());
        let sync_status = record.sync_status;

        let election = self.election_state().await;
        let backed_up = self
            .ledger_task(move |ledger| Ok(ledger.upsert_vote(record, &election)))
            .await
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "ledger upsert did not run");
                false
            });
        if !backed_up {
            tracing::error!(ballot = %ballot_id, "vote was not mirrored into the encrypted ledger");
        }

        self.metrics().votes_submitted.inc();
        if simulated {
            self.metrics().fallback_votes.inc();
            tracing::warn!(ballot = %ballot_id, failures = failures.len(), "no endpoint accepted vote; ledger fallback");
        } else {
            tracing::info!(ballot = %ballot_id, endpoints = ?accepted, "vote recorded");
        }
        self.update_ledger_gauges();

        Ok(Receipt {
            tx_ref,
            voter_id,
            ballot_id,
            simulated,
            sync_status,
            endpoints: accepted,
            failures,
            backed_up,
            timestamp: now,
        })
    }

    /// Whether this voter has a vote on record, in the ledger or on any
    /// routable endpoint.
    ///
    /// An endpoint that errors is skipped, so `false` can also mean "every
    /// endpoint lookup failed"; that case is logged at warn.
    pub async fn check_voter_has_voted(&self, voter_id: &VoterId) -> Result<bool, NodeError> {
        self.ensure_initialized()?;
        let snapshot = self.ledger_task(|ledger| ledger.load()).await?;
        if snapshot.vote_by_voter(voter_id).is_some() {
            return Ok(true);
        }
        let mut asked = 0;
        let mut failed = 0;
        for slot in &self.slots {
            if slot.routable_account().await.is_none() {
                continue;
            }
            asked += 1;
            match bounded(
                self.config.request_timeout(),
                "has_voted",
                slot.endpoint.has_voted(voter_id),
            )
            .await
            {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(e) => {
                    failed += 1;
                    tracing::debug!(endpoint = slot.name(), error = %e, "has_voted lookup failed");
                }
            }
        }
        if asked > 0 && failed == asked {
            tracing::warn!(voter = %voter_id, "no endpoint answered has_voted; answer is from the ledger alone");
        }
        Ok(false)
    }

    /// A voter gets one ballot and a ballot id belongs to one voter.
    /// Resubmitting the same voter and ballot is allowed.
    async fn reject_conflicting_voter(
        &self,
        snapshot: &LedgerSnapshot,
        voter_id: &VoterId,
        ballot_id: &BallotId,
    ) -> Result<(), NodeError> {
        if let Some(existing) = snapshot.vote_by_voter(voter_id) {
            if &existing.ballot_id != ballot_id {
                return Err(NodeError::AlreadyVoted(voter_id.clone()));
            }
            return Ok(());
        }
        if snapshot.contains_ballot(ballot_id) {
            return Err(NodeError::BallotConflict(ballot_id.clone()));
        }

        let limit = self.config.request_timeout();
        for slot in &self.slots {
            if slot.routable_account().await.is_none() {
                continue;
            }
            match bounded(limit, "vote_exists", slot.endpoint.vote_exists(ballot_id)).await {
                Ok(true) => match bounded(limit, "get_vote", slot.endpoint.get_vote(ballot_id)).await {
                    Ok(existing) if &existing.voter_id != voter_id => {
                        return Err(NodeError::BallotConflict(ballot_id.clone()));
                    }
                    Ok(_) => return Ok(()),
                    Err(e) => {
                        tracing::debug!(endpoint = slot.name(), error = %e, "get_vote lookup failed")
                    }
                },
                Ok(false) => {
                    let voted = bounded(limit, "has_voted", slot.endpoint.has_voted(voter_id)).await;
                    if matches!(voted, Ok(true)) {
                        return Err(NodeError::AlreadyVoted(voter_id.clone()));
                    }
                }
                Err(e) => {
                    tracing::debug!(endpoint = slot.name(), error = %e, "vote_exists lookup failed")
                }
            }
        }
        Ok(())
    }

    /// Whether the endpoint's copy of `ballot_id` was cast by `voter_id`.
    async fn holds_ballot_for(
        &self,
        slot: &EndpointSlot<E>,
        ballot_id: &BallotId,
        voter_id: &VoterId,
    ) -> bool {
        let limit = self.config.request_timeout();
        match bounded(limit, "get_vote", slot.endpoint.get_vote(ballot_id)).await {
            Ok(existing) => &existing.voter_id == voter_id,
            Err(e) => {
                tracing::debug!(endpoint = slot.name(), error = %e, "cannot confirm ballot owner");
                false
            }
        }
    }
}

/// Deterministic reference for a receipt no endpoint confirmed.
fn simulated_tx_ref(voter_id: &VoterId, ballot_id: &BallotId, now: Timestamp) -> String {
    let hash = digest(&[
        voter_id.as_str().as_bytes(),
        ballot_id.as_str().as_bytes(),
        &now.as_millis().to_be_bytes(),
    ]);
    format!("sim-{}", hex::encode(hash))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_refs_are_distinct_per_ballot() {
        let voter = VoterId::parse("V1").unwrap();
        let now = Timestamp::from_millis(1_700_000_000_000);
        let a = simulated_tx_ref(&voter, &BallotId::parse("B1").unwrap(), now);
        let b = simulated_tx_ref(&voter, &BallotId::parse("B2").unwrap(), now);
        assert!(a.starts_with("sim-"));
        assert_eq!(a.len(), 4 + 64);
        assert_ne!(a, b);
    }

    #[test]
    fn submission_defaults_optional_fields() {
        let json = r#"{"voter_id":"V1","ballot_id":"B1","selections":[]}"#;
        let submission: VoteSubmission = serde_json::from_str(json).unwrap();
        assert!(submission.timestamp.is_none());
        assert!(submission.voter_hash.is_empty());
    }
}
