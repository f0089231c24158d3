//! Tally vote service: keeps votes available across two ledger endpoints
//! and an encrypted local ledger.
//!
//! The service:
//! - Monitors both endpoints and derives emergency mode when both are down
//! - Routes each vote to every routable endpoint and mirrors it locally
//! - Reconciles endpoints with each other and with the encrypted ledger
//! - Runs a periodic sync scheduler gated by the election state

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod monitor;
pub mod pool;
pub mod reconcile;
pub mod router;
pub mod scheduler;
pub mod service;
pub mod shutdown;
pub mod tracing_spans;

pub use config::{EndpointConfig, ServiceConfig};
pub use error::NodeError;
pub use logging::{init_logging, LogFormat};
pub use metrics::ServiceMetrics;
pub use reconcile::PassOutcome;
pub use router::VoteSubmission;
pub use service::{LedgerStatus, StatusSnapshot, VoteService};
pub use shutdown::{ShutdownController, ShutdownReason};
