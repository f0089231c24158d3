//! Reconciliation between the two endpoints and the encrypted ledger.
//!
//! Three passes, each safe to repeat: endpoint → endpoint, ledger →
//! endpoints, endpoints → ledger. Every pass checks the election gate itself
//! and is a no-op while sync is not allowed.

use std::collections::HashSet;

use serde::Serialize;
use tracing::Instrument;

use tally_endpoint::{EndpointError, ErrorKind, LedgerEndpoint};
use tally_types::{BallotId, RecordSource, SyncOperation, Timestamp, VoteRecord, WireVote};

use crate::pool::{bounded, EndpointSlot};
use crate::tracing_spans::reconcile_span;
use crate::{NodeError, VoteService};

/// Counts from one reconciliation pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PassOutcome {
    pub synced: u64,
    pub errored: u64,
}

impl PassOutcome {
    fn absorb(&mut self, other: PassOutcome) {
        self.synced += other.synced;
        self.errored += other.errored;
    }
}

impl<E: LedgerEndpoint> VoteService<E> {
    /// Run all three passes in order and record each in the sync history.
    pub async fn run_reconciliation(&self) -> Result<PassOutcome, NodeError> {
        let mut total = PassOutcome::default();
        if !self.sync_allowed().await {
            return Ok(total);
        }

        let outcome = self
            .endpoint_to_endpoint()
            .instrument(reconcile_span("endpoint_to_endpoint"))
            .await;
        self.record_pass(SyncOperation::EndpointToEndpoint, outcome).await;
        total.absorb(outcome);

        let outcome = self
            .ledger_to_endpoints()
            .instrument(reconcile_span("ledger_to_endpoints"))
            .await?;
        self.record_pass(SyncOperation::LedgerToEndpoints, outcome).await;
        total.absorb(outcome);

        let outcome = self
            .endpoints_to_ledger()
            .instrument(reconcile_span("endpoints_to_ledger"))
            .await?;
        self.record_pass(SyncOperation::EndpointsToLedger, outcome).await;
        total.absorb(outcome);

        self.update_ledger_gauges();
        Ok(total)
    }

    /// Copy ballots from the endpoint holding the most votes to every other
    /// routable endpoint that lacks them.
    pub async fn endpoint_to_endpoint(&self) -> PassOutcome {
        let mut outcome = PassOutcome::default();
        if !self.sync_allowed().await {
            return outcome;
        }

        let limit = self.config.request_timeout();
        let mut candidates = Vec::new();
        for slot in &self.slots {
            let Some(account) = slot.routable_account().await else {
                continue;
            };
            match bounded(limit, "get_total_votes", slot.endpoint.get_total_votes()).await {
                Ok(total) => candidates.push((slot, account, total)),
                Err(e) => {
                    tracing::warn!(endpoint = slot.name(), error = %e, "vote count unavailable");
                    slot.state.write().await.mark_sync_failed();
                }
            }
        }
        if candidates.len() < 2 {
            return outcome;
        }
        let Some(max) = candidates.iter().map(|(_, _, total)| *total).max() else {
            return outcome;
        };
        if candidates.iter().all(|(_, _, total)| *total == max) {
            let now = Timestamp::now();
            for (slot, _, _) in &candidates {
                slot.state.write().await.mark_synced(now);
            }
            return outcome;
        }

        // First endpoint with the highest count is the source.
        let Some(source_index) = candidates.iter().position(|(_, _, total)| *total == max) else {
            return outcome;
        };
        let source = candidates[source_index].0;
        let ballots = match bounded(limit, "get_all_votes", source.endpoint.get_all_votes()).await {
            Ok(ballots) => ballots,
            Err(e) => {
                tracing::warn!(endpoint = source.name(), error = %e, "cannot list source ballots");
                for (index, (slot, _, _)) in candidates.iter().enumerate() {
                    if index != source_index {
                        slot.state.write().await.mark_sync_failed();
                    }
                }
                outcome.errored += 1;
                return outcome;
            }
        };

        for (index, (target, account, _)) in candidates.iter().enumerate() {
            if index == source_index {
                continue;
            }
            let copied = self.copy_missing(source, target, account, &ballots).await;
            outcome.absorb(copied);
            if copied.errored == 0 {
                target.state.write().await.mark_synced(Timestamp::now());
            } else {
                target.state.write().await.mark_sync_failed();
            }
            tracing::info!(
                from = source.name(),
                to = target.name(),
                copied = copied.synced,
                errors = copied.errored,
                "endpoint to endpoint sync"
            );
        }
        outcome
    }

    /// Push every pending ledger record to each routable endpoint, then mark
    /// the ones at least one endpoint now holds as synced.
    pub async fn ledger_to_endpoints(&self) -> Result<PassOutcome, NodeError> {
        let mut outcome = PassOutcome::default();
        if !self.sync_allowed().await {
            return Ok(outcome);
        }
        let pending = self.pending_votes().await?;
        if pending.is_empty() {
            return Ok(outcome);
        }

        let mut delivered: HashSet<BallotId> = HashSet::new();
        for slot in &self.slots {
            let Some(account) = slot.routable_account().await else {
                continue;
            };
            let (ok, errors) = self.deliver_all(slot, &account, &pending).await;
            outcome.errored += errors;
            delivered.extend(ok);
        }

        let ballots: Vec<BallotId> = delivered.into_iter().collect();
        outcome.synced = self
            .ledger_task(move |ledger| ledger.mark_synced(&ballots))
            .await? as u64;
        if outcome.synced > 0 {
            tracing::info!(synced = outcome.synced, "ledger votes delivered to endpoints");
        }
        Ok(outcome)
    }

    /// Pull ballots an endpoint knows that the ledger does not.
    ///
    /// Reads from the first routable endpoint. Voter conflicts are resolved
    /// in the ledger's favour.
    pub async fn endpoints_to_ledger(&self) -> Result<PassOutcome, NodeError> {
        let mut outcome = PassOutcome::default();
        if !self.sync_allowed().await {
            return Ok(outcome);
        }

        let mut source = None;
        for slot in &self.slots {
            if slot.routable_account().await.is_some() {
                source = Some(slot);
                break;
            }
        }
        let Some(slot) = source else {
            return Ok(outcome);
        };

        let limit = self.config.request_timeout();
        let ballots = match bounded(limit, "get_all_votes", slot.endpoint.get_all_votes()).await {
            Ok(ballots) => ballots,
            Err(e) => {
                tracing::warn!(endpoint = slot.name(), error = %e, "cannot list endpoint ballots");
                outcome.errored += 1;
                return Ok(outcome);
            }
        };

        let snapshot = self.ledger_task(|ledger| ledger.load()).await?;
        let now = Timestamp::now();
        let mut missing = Vec::new();
        for ballot in ballots.iter().filter(|b| !snapshot.contains_ballot(b)) {
            let fetched = bounded(limit, "get_vote", slot.endpoint.get_vote(ballot)).await;
            match fetched {
                Ok(wire) => match VoteRecord::from_wire(wire, RecordSource::ReconciledFromEndpoint, now) {
                    Ok(record) => missing.push(record),
                    Err(e) => {
                        tracing::warn!(ballot = %ballot, error = %e, "endpoint vote undecodable");
                        outcome.errored += 1;
                    }
                },
                Err(e) => {
                    tracing::warn!(endpoint = slot.name(), ballot = %ballot, error = %e, "vote fetch failed");
                    outcome.errored += 1;
                }
            }
        }

        if !missing.is_empty() {
            outcome.synced = self
                .ledger_task(move |ledger| ledger.append_reconciled(missing))
                .await? as u64;
            tracing::info!(endpoint = slot.name(), added = outcome.synced, "endpoint votes pulled into ledger");
        }
        Ok(outcome)
    }

    /// True when nothing is pending in the ledger and every routable endpoint
    /// reports the ledger's vote count.
    pub async fn is_converged(&self) -> Result<bool, NodeError> {
        let snapshot = self.ledger_task(|ledger| ledger.load()).await?;
        if snapshot.pending_count() > 0 {
            return Ok(false);
        }
        let expected = snapshot.votes.len() as u64;
        for slot in &self.slots {
            if slot.routable_account().await.is_none() {
                continue;
            }
            match bounded(
                self.config.request_timeout(),
                "get_total_votes",
                slot.endpoint.get_total_votes(),
            )
            .await
            {
                Ok(total) if total == expected => {}
                Ok(_) => return Ok(false),
                Err(_) => return Ok(false),
            }
        }
        Ok(true)
    }

    /// Deliver the ledger's pending votes to a single endpoint, used right
    /// after it recovers.
    pub(crate) async fn push_pending(&self, slot: &EndpointSlot<E>) -> Result<PassOutcome, NodeError> {
        let mut outcome = PassOutcome::default();
        let Some(account) = slot.routable_account().await else {
            return Ok(outcome);
        };
        let pending = self.pending_votes().await?;
        if pending.is_empty() {
            return Ok(outcome);
        }
        let (delivered, errors) = self.deliver_all(slot, &account, &pending).await;
        outcome.errored = errors;
        outcome.synced = self
            .ledger_task(move |ledger| ledger.mark_synced(&delivered))
            .await? as u64;
        tracing::info!(endpoint = slot.name(), synced = outcome.synced, "pending votes pushed");
        Ok(outcome)
    }

    async fn pending_votes(&self) -> Result<Vec<VoteRecord>, NodeError> {
        self.ledger_task(|ledger| Ok(ledger.load()?.pending().cloned().collect()))
            .await
    }

    async fn deliver_all(
        &self,
        slot: &EndpointSlot<E>,
        account: &str,
        votes: &[VoteRecord],
    ) -> (Vec<BallotId>, u64) {
        let mut delivered = Vec::new();
        let mut errors = 0;
        for vote in votes {
            match self.deliver(slot, account, &vote.to_wire()).await {
                Ok(_) => delivered.push(vote.ballot_id.clone()),
                Err(e) => {
                    tracing::warn!(endpoint = slot.name(), ballot = %vote.ballot_id, error = %e, "delivery failed");
                    errors += 1;
                    if self.abandon_target(slot, &e).await {
                        break;
                    }
                }
            }
            self.pause_between_writes().await;
        }
        (delivered, errors)
    }

    /// Submit a vote unless the endpoint already has it. Returns whether a
    /// write happened.
    async fn deliver(
        &self,
        slot: &EndpointSlot<E>,
        account: &str,
        vote: &WireVote,
    ) -> Result<bool, EndpointError> {
        let limit = self.config.request_timeout();
        if bounded(limit, "vote_exists", slot.endpoint.vote_exists(&vote.ballot_id)).await? {
            return Ok(false);
        }
        self.write(slot, account, vote).await
    }

    /// Submit without an existence check; "already exists" is not an error.
    async fn write(
        &self,
        slot: &EndpointSlot<E>,
        account: &str,
        vote: &WireVote,
    ) -> Result<bool, EndpointError> {
        let limit = self.config.request_timeout();
        match bounded(limit, "submit_vote", slot.endpoint.submit_vote(account, vote)).await {
            Ok(_) => {
                self.metrics().votes_reconciled.inc();
                Ok(true)
            }
            Err(e) if e.is_already_exists() => Ok(false),
            Err(e) => {
                self.record_failure(slot, &e).await;
                Err(e)
            }
        }
    }

    /// Whether to stop writing to `slot` for the rest of the pass: the
    /// endpoint looks unreachable or has dropped out of routing.
    async fn abandon_target(&self, slot: &EndpointSlot<E>, error: &EndpointError) -> bool {
        let abandon =
            error.kind() == ErrorKind::Transient || slot.routable_account().await.is_none();
        if abandon {
            tracing::warn!(endpoint = slot.name(), error = %error, "abandoning endpoint for this pass");
        }
        abandon
    }

    async fn copy_missing(
        &self,
        source: &EndpointSlot<E>,
        target: &EndpointSlot<E>,
        account: &str,
        ballots: &[BallotId],
    ) -> PassOutcome {
        let mut outcome = PassOutcome::default();
        let limit = self.config.request_timeout();
        for ballot in ballots {
            match bounded(limit, "vote_exists", target.endpoint.vote_exists(ballot)).await {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(endpoint = target.name(), ballot = %ballot, error = %e, "existence check failed");
                    outcome.errored += 1;
                    if self.abandon_target(target, &e).await {
                        break;
                    }
                    continue;
                }
            }
            let wire = match bounded(limit, "get_vote", source.endpoint.get_vote(ballot)).await {
                Ok(wire) => wire,
                Err(e) => {
                    tracing::warn!(endpoint = source.name(), ballot = %ballot, error = %e, "vote fetch failed");
                    outcome.errored += 1;
                    if e.kind() == ErrorKind::Transient {
                        break;
                    }
                    continue;
                }
            };
            match self.write(target, account, &wire).await {
                Ok(true) => outcome.synced += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(endpoint = target.name(), ballot = %ballot, error = %e, "copy failed");
                    outcome.errored += 1;
                    if self.abandon_target(target, &e).await {
                        break;
                    }
                }
            }
            self.pause_between_writes().await;
        }
        outcome
    }

    async fn pause_between_writes(&self) {
        let delay = self.config.resync_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    async fn record_pass(&self, operation: SyncOperation, outcome: PassOutcome) {
        if outcome == PassOutcome::default() {
            return;
        }
        self.push_history(operation, outcome.synced, outcome.errored).await;
    }
}
