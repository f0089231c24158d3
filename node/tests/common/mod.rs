//! Shared fixtures: a service over two in-memory endpoints and a temporary
//! ledger directory.

#![allow(dead_code)]

use std::sync::Arc;

use tally_crypto::KdfParams;
use tally_ledger::LedgerConfig;
use tally_node::{ServiceConfig, VoteService, VoteSubmission};
use tally_nullables::NullEndpoint;
use tally_types::{BallotId, ElectionStatus, Selection, VoterId, WireVote};

pub const CONTRACT: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

pub type Service = Arc<VoteService<NullEndpoint>>;

pub fn config(dir: &tempfile::TempDir) -> ServiceConfig {
    let mut ledger = LedgerConfig::in_dir(dir.path());
    ledger.kdf = KdfParams {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    };
    ServiceConfig {
        fallback_contract_address: Some(CONTRACT.into()),
        encryption_secret: Some("test-secret".into()),
        ledger,
        resync_delay_ms: 0,
        probe_timeout_secs: 1,
        request_timeout_secs: 1,
        ..ServiceConfig::default()
    }
}

pub fn service_with(config: ServiceConfig) -> Service {
    VoteService::new(config, NullEndpoint::new("primary"), NullEndpoint::new("secondary"))
        .expect("service should build")
}

/// An initialized service with the election open and the background
/// scheduler stopped, so tests drive ticks by hand.
pub async fn voting_service(dir: &tempfile::TempDir) -> Service {
    let svc = service_with(config(dir));
    svc.init().await.expect("init");
    svc.transition_election_state(ElectionStatus::Voting, Some("test"))
        .await
        .expect("voting");
    svc.stop_scheduler().await;
    svc
}

pub fn submission(voter: &str, ballot: &str) -> VoteSubmission {
    VoteSubmission {
        voter_id: voter.into(),
        ballot_id: ballot.into(),
        selections: vec![Selection {
            position: "chair".into(),
            candidate: format!("candidate-of-{voter}"),
        }],
        timestamp: None,
        voter_hash: format!("hash-{voter}"),
    }
}

pub fn wire(voter: &str, ballot: &str) -> WireVote {
    WireVote {
        voter_id: VoterId::parse(voter).unwrap(),
        ballot_id: BallotId::parse(ballot).unwrap(),
        votes_payload: format!(r#"[{{"position":"chair","candidate":"candidate-of-{voter}"}}]"#),
        timestamp_secs: 1_700_000_000,
        voter_hash: format!("hash-{voter}"),
    }
}
