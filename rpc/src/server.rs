//! Axum-based HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use tally_endpoint::LedgerEndpoint;
use tally_node::VoteService;

use crate::handlers;
use crate::RpcError;

/// Build the API router over a shared service.
pub fn router<E: LedgerEndpoint>(service: Arc<VoteService<E>>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/votes", post(handlers::submit_vote::<E>))
        .route("/voters/:voter_id/voted", get(handlers::voter_status::<E>))
        .route("/results", get(handlers::results::<E>))
        .route("/status", get(handlers::status::<E>))
        .route("/metrics", get(handlers::metrics::<E>))
        .route("/election", post(handlers::transition::<E>))
        .route("/reset", post(handlers::reset::<E>))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(service)
}

pub struct RpcServer {
    pub port: u16,
}

impl RpcServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    /// Serve until the shutdown channel fires.
    pub async fn start<E: LedgerEndpoint>(
        &self,
        service: Arc<VoteService<E>>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), RpcError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RpcError::Server(format!("bind {addr}: {e}")))?;
        tracing::info!(%addr, "RPC server listening");
        serve(listener, service, shutdown).await
    }
}

/// Serve on an already-bound listener.
pub async fn serve<E: LedgerEndpoint>(
    listener: TcpListener,
    service: Arc<VoteService<E>>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), RpcError> {
    axum::serve(listener, router(service))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("RPC server shutting down");
        })
        .await
        .map_err(|e| RpcError::Server(e.to_string()))
}
