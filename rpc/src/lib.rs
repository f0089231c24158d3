//! HTTP API for the tally vote service.
//!
//! Provides endpoints for:
//! - Vote submission and voter lookup
//! - Election results with ledger fallback
//! - Service status and sync history
//! - Election-state transitions and full reset
//! - Prometheus metrics

pub mod error;
pub mod handlers;
pub mod server;

pub use error::RpcError;
pub use server::{router, serve, RpcServer};
