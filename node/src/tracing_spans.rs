//! Pre-built [`tracing::Span`] constructors for common service operations.
//!
//! Using consistent span names and field sets across the codebase makes it
//! easy to filter, search, and correlate traces.

use tracing::{info_span, Span};

/// Span covering one vote submission, endpoint writes through ledger mirror.
pub fn submit_span(ballot_id: &str) -> Span {
    info_span!("submit_vote", ballot = %ballot_id)
}

/// Span covering a single reconciliation pass.
pub fn reconcile_span(pass: &str) -> Span {
    info_span!("reconcile", pass = %pass)
}

/// Span covering one scheduler tick.
pub fn tick_span(tick: u64) -> Span {
    info_span!("sync_tick", tick = tick)
}

/// Span covering a liveness probe of one endpoint.
pub fn probe_span(endpoint: &str) -> Span {
    info_span!("probe", endpoint = %endpoint)
}
