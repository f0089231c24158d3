//! End-to-end scenarios over two in-memory endpoints: failover into the
//! encrypted ledger, recovery, divergence repair and duplicate handling.

mod common;

use std::time::Duration;

use common::{submission, voting_service, wire};
use tally_endpoint::ContractStatus;
use tally_node::{NodeError, PassOutcome};
use tally_types::{ActiveEndpoint, ElectionStatus, RecordSource, ResultsSource, SyncStatus, VoterId};

#[tokio::test]
async fn vote_reaches_both_endpoints_and_the_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let svc = voting_service(&dir).await;

    let receipt = svc.submit_vote(submission("V1", "B1")).await.unwrap();
    assert!(!receipt.simulated);
    assert!(receipt.backed_up);
    assert_eq!(receipt.endpoints, vec!["primary", "secondary"]);
    assert!(receipt.failures.is_empty());
    assert_eq!(receipt.tx_ref, "primary-tx-1");

    assert_eq!(svc.primary().total(), 1);
    assert_eq!(svc.secondary().total(), 1);
    let ledger = svc.ledger().load().unwrap();
    assert_eq!(ledger.votes.len(), 1);
    assert_eq!(ledger.votes[0].source, RecordSource::PrimaryEndpointWrite);
    assert_eq!(ledger.votes[0].sync_status, SyncStatus::Synced);
}

#[tokio::test]
async fn both_endpoints_down_then_back() {
    let dir = tempfile::tempdir().unwrap();
    let svc = voting_service(&dir).await;
    svc.submit_vote(submission("V1", "B1")).await.unwrap();

    svc.primary().set_online(false);
    svc.secondary().set_online(false);
    svc.run_sync_tick().await;

    assert!(svc.is_emergency().await);
    assert_eq!(svc.election_state().await.status, ElectionStatus::Paused);
    // No vote since the forced pause: sync is frozen.
    assert!(!svc.sync_allowed().await);

    tokio::time::sleep(Duration::from_millis(5)).await;
    let receipt = svc.submit_vote(submission("V2", "B2")).await.unwrap();
    assert!(receipt.simulated);
    assert!(receipt.tx_ref.starts_with("sim-"));
    assert_eq!(receipt.sync_status, SyncStatus::Pending);
    assert!(receipt.endpoints.is_empty());
    assert!(svc.sync_allowed().await);

    let status = svc.get_status_snapshot().await.unwrap();
    assert!(status.emergency);
    assert_eq!(status.active_endpoint, ActiveEndpoint::Emergency);
    assert_eq!(status.ledger.pending, 1);

    svc.primary().set_online(true);
    svc.secondary().set_online(true);
    svc.run_sync_tick().await;

    assert!(!svc.is_emergency().await);
    assert_eq!(svc.primary().total(), 2);
    assert_eq!(svc.secondary().total(), 2);
    let ledger = svc.ledger().load().unwrap();
    assert_eq!(ledger.pending_count(), 0);
    let v2 = ledger
        .votes
        .iter()
        .find(|v| v.ballot_id.as_str() == "B2")
        .unwrap();
    assert_eq!(v2.source, RecordSource::ReconciledFromLedger);
    assert_eq!(v2.sync_status, SyncStatus::Synced);
}

#[tokio::test]
async fn forced_pause_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let svc = voting_service(&dir).await;
        svc.primary().set_online(false);
        svc.secondary().set_online(false);
        svc.run_sync_tick().await;
        assert_eq!(svc.election_state().await.status, ElectionStatus::Paused);
    }

    let svc = common::service_with(common::config(&dir));
    svc.init().await.unwrap();
    let state = svc.election_state().await;
    assert_eq!(state.status, ElectionStatus::Paused);
    assert!(state.paused_at.is_some());
    assert!(svc.scheduler_running().await);
    svc.stop_scheduler().await;
}

#[tokio::test]
async fn failing_endpoint_is_dropped_at_the_ceiling_and_recovered() {
    let dir = tempfile::tempdir().unwrap();
    let svc = voting_service(&dir).await;
    svc.secondary().set_reject_writes(true);

    for i in 0..3 {
        let receipt = svc
            .submit_vote(submission(&format!("V{i}"), &format!("B{i}")))
            .await
            .unwrap();
        assert_eq!(receipt.endpoints, vec!["primary"]);
        assert_eq!(receipt.failures.len(), 1);
        assert_eq!(receipt.failures[0].endpoint, "secondary");
    }
    let states = svc.endpoint_states().await;
    assert!(!states[1].connected);
    assert_eq!(states[1].failures, 3);

    // Held offline even though it still answers probes.
    svc.refresh_all().await;
    assert!(!svc.endpoint_states().await[1].connected);

    let receipt = svc.submit_vote(submission("V3", "B3")).await.unwrap();
    assert_eq!(receipt.endpoints, vec!["primary"]);
    assert!(receipt.failures.is_empty());

    svc.secondary().set_reject_writes(false);
    assert_eq!(svc.attempt_recovery().await, 1);
    let secondary = &svc.endpoint_states().await[1];
    assert!(secondary.connected);
    assert_eq!(secondary.failures, 0);

    svc.run_sync_tick().await;
    assert_eq!(svc.secondary().total(), 4);
    assert_eq!(svc.primary().total(), 4);
}

#[tokio::test]
async fn unreachable_endpoint_backs_off() {
    let dir = tempfile::tempdir().unwrap();
    let svc = voting_service(&dir).await;
    svc.secondary().set_online(false);
    svc.refresh_all().await;

    assert_eq!(svc.attempt_recovery().await, 0);
    let first = svc.endpoint_states().await[1].clone();
    assert_eq!(first.recovery_attempts, 1);
    let next = first.next_recovery_at.unwrap();

    // Within the backoff window nothing is probed.
    assert_eq!(svc.attempt_recovery().await, 0);
    let second = svc.endpoint_states().await[1].clone();
    assert_eq!(second.recovery_attempts, 1);
    assert_eq!(second.next_recovery_at, Some(next));
}

#[tokio::test]
async fn divergent_endpoints_converge() {
    let dir = tempfile::tempdir().unwrap();
    let svc = voting_service(&dir).await;
    svc.primary().preload([wire("A", "BA"), wire("B", "BB")]);
    svc.secondary().preload([wire("C", "BC")]);

    svc.run_sync_tick().await;
    svc.run_sync_tick().await;

    assert_eq!(svc.primary().total(), 3);
    assert_eq!(svc.secondary().total(), 3);
    let ledger = svc.ledger().load().unwrap();
    assert_eq!(ledger.votes.len(), 3);
    assert!(ledger
        .votes
        .iter()
        .all(|v| v.source == RecordSource::ReconciledFromEndpoint));
    assert!(svc.is_converged().await.unwrap());
}

#[tokio::test]
async fn reconciliation_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let svc = voting_service(&dir).await;
    svc.primary().preload([wire("A", "BA")]);
    svc.run_sync_tick().await;
    assert!(svc.is_converged().await.unwrap());

    let primary = svc.primary().submissions();
    let secondary = svc.secondary().submissions();
    let outcome = svc.run_reconciliation().await.unwrap();
    assert_eq!(outcome.synced, 0);
    assert_eq!(outcome.errored, 0);
    svc.run_sync_tick().await;
    assert_eq!(svc.primary().submissions(), primary);
    assert_eq!(svc.secondary().submissions(), secondary);
    assert_eq!(svc.ledger().load().unwrap().votes.len(), 1);
}

#[tokio::test]
async fn one_ballot_per_voter() {
    let dir = tempfile::tempdir().unwrap();
    let svc = voting_service(&dir).await;
    svc.submit_vote(submission("V1", "B1")).await.unwrap();

    let err = svc.submit_vote(submission("V1", "B2")).await.unwrap_err();
    assert!(matches!(err, NodeError::AlreadyVoted(_)));

    let err = svc.submit_vote(submission("V2", "B1")).await.unwrap_err();
    assert!(matches!(err, NodeError::BallotConflict(_)));

    // Same ballot again: endpoints answer "already exists", still a success.
    let receipt = svc.submit_vote(submission("V1", "B1")).await.unwrap();
    assert!(!receipt.simulated);
    assert_eq!(receipt.endpoints.len(), 2);
    assert_eq!(svc.ledger().load().unwrap().votes.len(), 1);
    assert_eq!(svc.primary().submissions(), 1);
}

#[tokio::test]
async fn voter_known_only_to_an_endpoint_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let svc = voting_service(&dir).await;
    svc.primary().preload([wire("V9", "B9")]);

    let voter = VoterId::parse("V9").unwrap();
    assert!(svc.check_voter_has_voted(&voter).await.unwrap());
    assert!(!svc
        .check_voter_has_voted(&VoterId::parse("nobody").unwrap())
        .await
        .unwrap());

    let err = svc.submit_vote(submission("V9", "B10")).await.unwrap_err();
    assert!(matches!(err, NodeError::AlreadyVoted(_)));
}

#[tokio::test]
async fn endpoint_without_contract_is_not_routed() {
    let dir = tempfile::tempdir().unwrap();
    let svc = common::service_with(common::config(&dir));
    svc.secondary().set_contract_deployed(false);
    svc.init().await.unwrap();
    svc.transition_election_state(ElectionStatus::Voting, None)
        .await
        .unwrap();
    svc.stop_scheduler().await;

    let states = svc.endpoint_states().await;
    assert!(states[1].connected);
    assert!(!states[1].contract_bound);

    let receipt = svc.submit_vote(submission("V1", "B1")).await.unwrap();
    assert_eq!(receipt.endpoints, vec!["primary"]);
    assert!(receipt.failures.is_empty());

    // Missing bytecode is not retried until the service is reconfigured.
    svc.secondary().set_contract_deployed(true);
    svc.refresh_all().await;
    svc.refresh_all().await;
    let secondary = &svc.endpoint_states().await[1];
    assert!(!secondary.contract_bound);
    assert_eq!(secondary.contract_status, ContractStatus::NoContract);
}

#[tokio::test]
async fn results_prefer_endpoint_and_fall_back_to_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let svc = voting_service(&dir).await;
    svc.submit_vote(submission("V1", "B1")).await.unwrap();
    svc.submit_vote(submission("V2", "B2")).await.unwrap();

    let results = svc.get_election_results().await.unwrap();
    assert_eq!(results.source, ResultsSource::Endpoint("primary".into()));
    assert_eq!(results.total_votes, 2);
    assert!(results.integrity.consistent);
    assert_eq!(results.positions["chair"]["candidate-of-V1"], 1);

    svc.primary().set_online(false);
    svc.secondary().set_online(false);
    svc.refresh_all().await;
    let results = svc.get_election_results().await.unwrap();
    assert_eq!(results.source, ResultsSource::Ledger);
    assert_eq!(results.total_votes, 2);
    assert_eq!(results.positions["chair"].len(), 2);
}

#[tokio::test]
async fn active_endpoint_falls_back_to_secondary() {
    let dir = tempfile::tempdir().unwrap();
    let svc = voting_service(&dir).await;
    assert!(matches!(
        svc.get_active_endpoint().await,
        ActiveEndpoint::Endpoint { ref name, .. } if name == "primary"
    ));

    svc.primary().set_online(false);
    svc.refresh_all().await;
    assert!(matches!(
        svc.get_active_endpoint().await,
        ActiveEndpoint::Endpoint { ref name, .. } if name == "secondary"
    ));

    svc.secondary().set_online(false);
    svc.refresh_all().await;
    assert_eq!(svc.get_active_endpoint().await, ActiveEndpoint::Emergency);
}

#[tokio::test]
async fn ballot_held_by_another_voter_on_the_endpoints_is_a_conflict() {
    let dir = tempfile::tempdir().unwrap();
    let svc = voting_service(&dir).await;
    svc.primary().preload([wire("V2", "B1")]);
    svc.secondary().preload([wire("V2", "B1")]);

    let err = svc.submit_vote(submission("V3", "B1")).await.unwrap_err();
    assert!(matches!(err, NodeError::BallotConflict(_)));
    assert!(svc.ledger().load().unwrap().votes.is_empty());

    // The endpoints' owner is what reaches the ledger.
    svc.run_sync_tick().await;
    let ledger = svc.ledger().load().unwrap();
    assert_eq!(ledger.votes.len(), 1);
    assert_eq!(ledger.votes[0].voter_id.as_str(), "V2");
    assert!(svc.is_converged().await.unwrap());
}

#[tokio::test]
async fn resubmitting_a_ballot_only_the_endpoints_hold_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let svc = voting_service(&dir).await;
    svc.primary().preload([wire("V5", "B5")]);
    svc.secondary().preload([wire("V5", "B5")]);

    let receipt = svc.submit_vote(submission("V5", "B5")).await.unwrap();
    assert!(!receipt.simulated);
    assert_eq!(receipt.endpoints, vec!["primary", "secondary"]);
    assert!(receipt.failures.is_empty());
    let ledger = svc.ledger().load().unwrap();
    assert_eq!(ledger.votes.len(), 1);
    assert_eq!(ledger.votes[0].voter_id.as_str(), "V5");
}

#[tokio::test]
async fn failed_copies_count_toward_the_failure_ceiling() {
    let dir = tempfile::tempdir().unwrap();
    let svc = voting_service(&dir).await;
    svc.primary()
        .preload([wire("A", "B1"), wire("B", "B2"), wire("C", "B3"), wire("D", "B4")]);
    svc.secondary().set_reject_writes(true);

    // The third rejected write reaches the ceiling and ends the pass.
    let outcome = svc.endpoint_to_endpoint().await;
    assert_eq!(outcome, PassOutcome { synced: 0, errored: 3 });
    let secondary = &svc.endpoint_states().await[1];
    assert!(!secondary.connected);
    assert_eq!(secondary.failures, 3);
    assert_eq!(secondary.contract_status, ContractStatus::SyncFailed);
    assert!(!svc.is_emergency().await);

    // A dropped endpoint is no longer a copy target.
    assert_eq!(svc.endpoint_to_endpoint().await, PassOutcome::default());
    assert_eq!(svc.secondary().total(), 0);
}

#[tokio::test]
async fn lagging_endpoint_is_caught_up_and_marked_synced() {
    let dir = tempfile::tempdir().unwrap();
    let svc = voting_service(&dir).await;
    svc.primary().preload([wire("A", "B1"), wire("B", "B2")]);
    svc.secondary().preload([wire("A", "B1")]);
    let before = svc.endpoint_states().await[1].last_sync;

    let outcome = svc.endpoint_to_endpoint().await;
    assert_eq!(outcome, PassOutcome { synced: 1, errored: 0 });
    assert_eq!(svc.primary().total(), 2);
    assert_eq!(svc.secondary().total(), 2);

    let target = &svc.endpoint_states().await[1];
    assert_eq!(target.contract_status, ContractStatus::Synced);
    assert!(target.last_sync.is_some());
    assert!(target.last_sync >= before);
}

#[tokio::test]
async fn unreadable_source_marks_the_target_sync_failed() {
    let dir = tempfile::tempdir().unwrap();
    let svc = voting_service(&dir).await;
    svc.primary().preload([wire("A", "B1"), wire("B", "B2")]);
    svc.secondary().preload([wire("A", "B1")]);
    svc.primary().set_fail_listing(true);

    let outcome = svc.endpoint_to_endpoint().await;
    assert_eq!(outcome.errored, 1);
    assert_eq!(svc.secondary().total(), 1);
    let target = &svc.endpoint_states().await[1];
    assert_eq!(target.contract_status, ContractStatus::SyncFailed);
    assert!(target.connected);

    // Still routable, so the next pass repairs it.
    svc.primary().set_fail_listing(false);
    svc.endpoint_to_endpoint().await;
    assert_eq!(svc.secondary().total(), 2);
    assert_eq!(
        svc.endpoint_states().await[1].contract_status,
        ContractStatus::Synced
    );
}
