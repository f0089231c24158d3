//! Election lifecycle, scheduler control, reset and initialization failures.

mod common;

use common::{config, service_with, submission, voting_service};
use tally_ledger::CorruptionPolicy;
use tally_node::NodeError;
use tally_types::{ElectionStatus, LedgerIntegrity};

#[tokio::test]
async fn operations_require_init() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service_with(config(&dir));
    assert!(matches!(
        svc.submit_vote(submission("V1", "B1")).await,
        Err(NodeError::NotInitialized)
    ));
    assert!(matches!(
        svc.get_election_results().await,
        Err(NodeError::NotInitialized)
    ));
    let status = svc.get_status_snapshot().await.unwrap();
    assert!(!status.initialized);
}

#[tokio::test]
async fn writes_need_an_open_election() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service_with(config(&dir));
    svc.init().await.unwrap();

    let err = svc.submit_vote(submission("V1", "B1")).await.unwrap_err();
    assert!(matches!(err, NodeError::ElectionClosed(ElectionStatus::NotStarted)));
    assert_eq!(svc.primary().total(), 0);
}

#[tokio::test]
async fn transitions_drive_the_scheduler() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service_with(config(&dir));
    svc.init().await.unwrap();
    assert!(!svc.scheduler_running().await);

    let state = svc
        .transition_election_state(ElectionStatus::Voting, Some("polls open"))
        .await
        .unwrap();
    assert!(state.started_at.is_some());
    assert!(svc.scheduler_running().await);

    svc.transition_election_state(ElectionStatus::Paused, None)
        .await
        .unwrap();
    assert!(svc.scheduler_running().await);

    svc.transition_election_state(ElectionStatus::Finished, None)
        .await
        .unwrap();
    assert!(!svc.scheduler_running().await);

    let err = svc
        .transition_election_state(ElectionStatus::Voting, None)
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::Election(_)));

    let persisted = svc.ledger().load().unwrap().metadata.election_state;
    assert_eq!(persisted.status, ElectionStatus::Finished);
    assert!(persisted.finished_at.is_some());
}

#[tokio::test]
async fn reset_clears_everything_and_archives() {
    let dir = tempfile::tempdir().unwrap();
    let svc = voting_service(&dir).await;
    svc.submit_vote(submission("V1", "B1")).await.unwrap();
    svc.submit_vote(submission("V2", "B2")).await.unwrap();
    svc.run_sync_tick().await;

    let report = svc.reset_all().await.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.previous_votes, 2);
    assert!(report.ledger_reset);
    assert_eq!(report.endpoints.len(), 2);
    assert!(report.endpoints.iter().all(|e| e.reset));
    let archive = report.archive.clone().expect("archive written");
    assert!(std::path::Path::new(&archive).exists());

    assert_eq!(svc.primary().total(), 0);
    assert_eq!(svc.secondary().total(), 0);
    assert!(svc.ledger().load().unwrap().votes.is_empty());
    assert_eq!(svc.election_state().await.status, ElectionStatus::NotStarted);
    assert!(!svc.scheduler_running().await);

    let status = svc.get_status_snapshot().await.unwrap();
    assert_eq!(status.history.len(), 1);
}

#[tokio::test]
async fn reset_reports_unreachable_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let svc = voting_service(&dir).await;
    svc.submit_vote(submission("V1", "B1")).await.unwrap();
    svc.secondary().set_online(false);
    svc.refresh_all().await;

    let report = svc.reset_all().await.unwrap();
    assert!(!report.is_complete());
    assert!(report.endpoints[0].reset);
    assert!(!report.endpoints[1].reset);
    assert!(report.endpoints[1].error.is_some());
    // The unreachable endpoint keeps its copy.
    assert_eq!(svc.secondary().total(), 1);
}

#[tokio::test]
async fn corrupt_ledger_fails_fast_and_init_can_be_retried() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(&dir);
    cfg.ledger.corruption_policy = CorruptionPolicy::FailFast;

    std::fs::create_dir_all(dir.path()).unwrap();
    std::fs::write(cfg.ledger.primary_path(), b"not a ledger").unwrap();
    std::fs::write(cfg.ledger.backup_path(), b"not a backup either").unwrap();

    let svc = service_with(cfg.clone());
    assert!(matches!(svc.init().await, Err(NodeError::Ledger(_))));
    assert!(!svc.is_initialized());

    std::fs::remove_file(cfg.ledger.primary_path()).unwrap();
    std::fs::remove_file(cfg.ledger.backup_path()).unwrap();
    svc.init().await.unwrap();
    assert!(svc.is_initialized());
}

#[tokio::test]
async fn corrupt_ledger_reinitializes_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&dir);
    std::fs::write(cfg.ledger.primary_path(), b"garbage").unwrap();
    std::fs::write(cfg.ledger.backup_path(), b"garbage").unwrap();

    let svc = service_with(cfg);
    svc.init().await.unwrap();
    assert_eq!(svc.ledger().integrity(), LedgerIntegrity::Reinitialized);
    assert!(svc.ledger().load().unwrap().votes.is_empty());
}

#[tokio::test]
async fn metrics_track_submissions() {
    let dir = tempfile::tempdir().unwrap();
    let svc = voting_service(&dir).await;
    svc.submit_vote(submission("V1", "B1")).await.unwrap();
    svc.primary().set_online(false);
    svc.secondary().set_online(false);
    svc.refresh_all().await;
    svc.submit_vote(submission("V2", "B2")).await.unwrap();

    let text = svc.metrics().render().unwrap();
    assert!(text.contains("tally_votes_submitted_total 2"));
    assert!(text.contains("tally_fallback_votes_total 1"));
    assert!(text.contains("tally_emergency_mode 1"));
    assert!(text.contains("tally_pending_votes 1"));
}
