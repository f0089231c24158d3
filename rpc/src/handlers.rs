//! RPC request handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use tally_endpoint::LedgerEndpoint;
use tally_node::{StatusSnapshot, VoteService, VoteSubmission};
use tally_types::{ElectionResults, ElectionState, ElectionStatus, Receipt, ResetReport, VoterId};

use crate::RpcError;

pub type SharedService<E> = Arc<VoteService<E>>;

// ── Votes ────────────────────────────────────────────────────────────────

pub async fn submit_vote<E: LedgerEndpoint>(
    State(service): State<SharedService<E>>,
    Json(submission): Json<VoteSubmission>,
) -> Result<Json<Receipt>, RpcError> {
    Ok(Json(service.submit_vote(submission).await?))
}

#[derive(Serialize)]
pub struct VoterStatusResponse {
    pub voter_id: String,
    pub has_voted: bool,
}

pub async fn voter_status<E: LedgerEndpoint>(
    State(service): State<SharedService<E>>,
    Path(voter_id): Path<String>,
) -> Result<Json<VoterStatusResponse>, RpcError> {
    let voter = VoterId::parse(&voter_id).map_err(|e| RpcError::InvalidRequest(e.to_string()))?;
    let has_voted = service.check_voter_has_voted(&voter).await?;
    Ok(Json(VoterStatusResponse {
        voter_id: voter.as_str().to_string(),
        has_voted,
    }))
}

// ── Read side ────────────────────────────────────────────────────────────

pub async fn results<E: LedgerEndpoint>(
    State(service): State<SharedService<E>>,
) -> Result<Json<ElectionResults>, RpcError> {
    Ok(Json(service.get_election_results().await?))
}

pub async fn status<E: LedgerEndpoint>(
    State(service): State<SharedService<E>>,
) -> Result<Json<StatusSnapshot>, RpcError> {
    Ok(Json(service.get_status_snapshot().await?))
}

pub async fn metrics<E: LedgerEndpoint>(
    State(service): State<SharedService<E>>,
) -> Result<impl IntoResponse, RpcError> {
    let body = service
        .metrics()
        .render()
        .map_err(|e| RpcError::Server(e.to_string()))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}

// ── Administration ───────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct TransitionRequest {
    pub status: ElectionStatus,
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn transition<E: LedgerEndpoint>(
    State(service): State<SharedService<E>>,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<ElectionState>, RpcError> {
    let state = service
        .transition_election_state(request.status, request.reason.as_deref())
        .await?;
    Ok(Json(state))
}

pub async fn reset<E: LedgerEndpoint>(
    State(service): State<SharedService<E>>,
) -> Result<Json<ResetReport>, RpcError> {
    Ok(Json(service.reset_all().await?))
}

pub async fn health() -> &'static str {
    "ok"
}
