//! RPC error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use tally_node::NodeError;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("service not initialized")]
    NotInitialized,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{0}")]
    Closed(String),

    #[error("node error: {0}")]
    Node(String),

    #[error("server error: {0}")]
    Server(String),
}

impl RpcError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotInitialized => StatusCode::SERVICE_UNAVAILABLE,
            Self::Conflict(_) | Self::Closed(_) => StatusCode::CONFLICT,
            Self::Node(_) | Self::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<NodeError> for RpcError {
    fn from(e: NodeError) -> Self {
        match e {
            NodeError::InvalidInput(_) | NodeError::Config(_) => {
                RpcError::InvalidRequest(e.to_string())
            }
            NodeError::NotInitialized => RpcError::NotInitialized,
            NodeError::AlreadyVoted(_) | NodeError::BallotConflict(_) => {
                RpcError::Conflict(e.to_string())
            }
            NodeError::ElectionClosed(_) | NodeError::Election(_) => RpcError::Closed(e.to_string()),
            other => RpcError::Node(other.to_string()),
        }
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
