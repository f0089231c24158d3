//! Prometheus metrics for the vote service.
//!
//! The [`ServiceMetrics`] struct owns a dedicated [`Registry`] that the HTTP
//! `/metrics` route encodes into the Prometheus text exposition format.

use prometheus::{
    register_int_counter_with_registry, register_int_gauge_with_registry, Encoder, IntCounter,
    IntGauge, Opts, Registry, TextEncoder,
};

/// Central collection of all service-level Prometheus metrics.
pub struct ServiceMetrics {
    /// The Prometheus registry that owns every metric below.
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Accepted vote submissions.
    pub votes_submitted: IntCounter,
    /// Submissions that reached no endpoint and live only in the ledger.
    pub fallback_votes: IntCounter,
    /// Failed contract writes, across both endpoints.
    pub endpoint_write_failures: IntCounter,
    /// Ballots copied by any reconciliation pass.
    pub votes_reconciled: IntCounter,
    pub scheduler_ticks: IntCounter,
    pub tick_failures: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    pub connected_endpoints: IntGauge,
    pub ledger_votes: IntGauge,
    /// Ledger records still waiting to reach an endpoint.
    pub pending_votes: IntGauge,
    /// 1 while both endpoints are down.
    pub emergency_mode: IntGauge,
}

impl ServiceMetrics {
    /// Create a fresh set of metrics, all registered under a new
    /// [`Registry`].
    pub fn new() -> Self {
        let registry = Registry::new();

        // Counters
        let votes_submitted = register_int_counter_with_registry!(
            Opts::new("tally_votes_submitted_total", "Total accepted vote submissions"),
            registry
        )
        .expect("failed to register votes_submitted counter");

        let fallback_votes = register_int_counter_with_registry!(
            Opts::new(
                "tally_fallback_votes_total",
                "Total votes stored only in the encrypted ledger"
            ),
            registry
        )
        .expect("failed to register fallback_votes counter");

        let endpoint_write_failures = register_int_counter_with_registry!(
            Opts::new(
                "tally_endpoint_write_failures_total",
                "Total failed contract writes"
            ),
            registry
        )
        .expect("failed to register endpoint_write_failures counter");

        let votes_reconciled = register_int_counter_with_registry!(
            Opts::new(
                "tally_votes_reconciled_total",
                "Total ballots copied by reconciliation"
            ),
            registry
        )
        .expect("failed to register votes_reconciled counter");

        let scheduler_ticks = register_int_counter_with_registry!(
            Opts::new("tally_scheduler_ticks_total", "Total sync scheduler ticks"),
            registry
        )
        .expect("failed to register scheduler_ticks counter");

        let tick_failures = register_int_counter_with_registry!(
            Opts::new("tally_tick_failures_total", "Total failed sync scheduler ticks"),
            registry
        )
        .expect("failed to register tick_failures counter");

        // Gauges
        let connected_endpoints = register_int_gauge_with_registry!(
            Opts::new(
                "tally_connected_endpoints",
                "Current number of connected ledger endpoints"
            ),
            registry
        )
        .expect("failed to register connected_endpoints gauge");

        let ledger_votes = register_int_gauge_with_registry!(
            Opts::new("tally_ledger_votes", "Votes held in the encrypted ledger"),
            registry
        )
        .expect("failed to register ledger_votes gauge");

        let pending_votes = register_int_gauge_with_registry!(
            Opts::new(
                "tally_pending_votes",
                "Ledger votes not yet confirmed on an endpoint"
            ),
            registry
        )
        .expect("failed to register pending_votes gauge");

        let emergency_mode = register_int_gauge_with_registry!(
            Opts::new("tally_emergency_mode", "1 while both endpoints are down"),
            registry
        )
        .expect("failed to register emergency_mode gauge");

        Self {
            registry,
            votes_submitted,
            fallback_votes,
            endpoint_write_failures,
            votes_reconciled,
            scheduler_ticks,
            tick_failures,
            connected_endpoints,
            ledger_votes,
            pending_votes,
            emergency_mode,
        }
    }

    /// Encode every registered metric in the text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}
