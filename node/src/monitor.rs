//! Endpoint health: liveness probes, account and contract discovery, failure
//! accounting and backoff-driven recovery.

use std::sync::atomic::Ordering;

use tracing::Instrument;

use tally_election::EmergencyChange;
use tally_endpoint::{ContractStatus, EndpointError, LedgerEndpoint};
use tally_types::{ActiveEndpoint, SyncOperation, Timestamp};

use crate::pool::{bounded, EndpointSlot};
use crate::tracing_spans::probe_span;
use crate::VoteService;

/// Largest backoff exponent regardless of configuration.
const MAX_BACKOFF_SHIFT: u32 = 16;

impl<E: LedgerEndpoint> VoteService<E> {
    /// Probe one endpoint (by slot index, primary is 0) and recompute
    /// emergency mode. Timeouts and errors read as "not connected".
    pub async fn probe(&self, index: usize) -> bool {
        let Some(slot) = self.slots.get(index) else {
            return false;
        };
        let (_, connected) = self.probe_slot(slot).await;
        self.recompute_emergency().await;
        connected
    }

    /// Probe both endpoints; rediscover account, height and contract for any
    /// endpoint that just became reachable. Returns the connected count.
    pub async fn refresh_all(&self) -> usize {
        for slot in &self.slots {
            let (was, now) = self.probe_slot(slot).await;
            if !now {
                continue;
            }
            let incomplete = {
                let state = slot.state.read().await;
                state.account.is_none()
                    || (!state.contract_bound && !state.contract_status.is_configuration_error())
                    || state.contract_status == ContractStatus::Error
            };
            if !was || incomplete {
                self.rediscover(slot, false).await;
            }
        }
        self.recompute_emergency().await;
        let connected = self.connected_count().await;
        self.metrics().connected_endpoints.set(connected as i64);
        connected
    }

    /// Retry every disconnected endpoint whose backoff has elapsed.
    ///
    /// A recovered endpoint gets its failure counter cleared, its contract
    /// re-bound and, if sync is allowed, the ledger's pending votes pushed to
    /// it. Returns how many endpoints came back.
    pub async fn attempt_recovery(&self) -> usize {
        let now = Timestamp::now();
        let mut recovered = 0;
        let mut pushed = 0;
        let mut push_errors = 0;

        for slot in &self.slots {
            {
                let state = slot.state.read().await;
                if state.connected {
                    continue;
                }
                if state.next_recovery_at.is_some_and(|next| now < next) {
                    continue;
                }
            }

            let listening = bounded(
                self.config.probe_timeout(),
                "liveness probe",
                slot.endpoint.is_listening(),
            )
            .instrument(probe_span(slot.name()))
            .await;

            if !matches!(listening, Ok(true)) {
                let mut state = slot.state.write().await;
                state.recovery_attempts = state.recovery_attempts.saturating_add(1);
                let delay = self.recovery_delay_ms(state.recovery_attempts);
                state.next_recovery_at = Some(now.plus_millis(delay));
                tracing::debug!(
                    endpoint = slot.name(),
                    attempts = state.recovery_attempts,
                    retry_in_ms = delay,
                    "endpoint still unreachable"
                );
                continue;
            }

            {
                let mut state = slot.state.write().await;
                state.reset_recovery();
                state.connected = true;
            }
            self.rediscover(slot, true).await;
            tracing::info!(endpoint = slot.name(), "endpoint recovered");
            recovered += 1;

            if self.gate.read().await.sync_allowed() {
                match self.push_pending(slot).await {
                    Ok(outcome) => {
                        pushed += outcome.synced;
                        push_errors += outcome.errored;
                    }
                    Err(e) => {
                        tracing::warn!(endpoint = slot.name(), error = %e, "pending push after recovery failed");
                        push_errors += 1;
                    }
                }
            }
        }

        if recovered > 0 {
            self.recompute_emergency().await;
            self.push_history(SyncOperation::Recovery, pushed, push_errors)
                .await;
        }
        recovered
    }

    /// Count a failed write; at the failure ceiling the endpoint is forced
    /// offline until recovery clears it.
    pub(crate) async fn record_failure(&self, slot: &EndpointSlot<E>, error: &EndpointError) {
        self.metrics().endpoint_write_failures.inc();
        let disconnected = {
            let mut state = slot.state.write().await;
            let disconnected = state.record_failure(self.config.failure_ceiling);
            tracing::warn!(
                endpoint = slot.name(),
                failures = state.failures,
                error = %error,
                "endpoint write failed"
            );
            disconnected
        };
        if disconnected {
            tracing::warn!(
                endpoint = slot.name(),
                ceiling = self.config.failure_ceiling,
                "failure ceiling reached; endpoint disconnected"
            );
            self.recompute_emergency().await;
        }
    }

    pub(crate) async fn record_success(&self, slot: &EndpointSlot<E>) {
        slot.state.write().await.record_success(Timestamp::now());
    }

    /// Re-derive emergency mode from endpoint connectivity and apply its side
    /// effects: persist a forced pause, request reconciliation on exit.
    pub async fn recompute_emergency(&self) -> EmergencyChange {
        let all_down = self.connected_count().await == 0;
        let (change, state) = {
            let mut gate = self.gate.write().await;
            let change = gate.update_emergency(all_down, Timestamp::now());
            (change, gate.state().clone())
        };
        self.metrics().emergency_mode.set(i64::from(all_down));

        match change {
            EmergencyChange::Entered { paused: true } => {
                if let Err(e) = self
                    .ledger_task(move |ledger| ledger.store_election_state(&state))
                    .await
                {
                    tracing::error!(error = %e, "failed to persist forced pause");
                }
            }
            EmergencyChange::Exited { sync_allowed: true } => self.request_reconciliation(),
            _ => {}
        }
        change
    }

    /// The endpoint read paths should use: primary, then secondary, then any
    /// connected endpoint with an account, else the emergency pseudo-endpoint.
    pub async fn get_active_endpoint(&self) -> ActiveEndpoint {
        for slot in &self.slots {
            let state = slot.state.read().await;
            if !state.connected {
                continue;
            }
            if let Some(account) = &state.account {
                return ActiveEndpoint::Endpoint {
                    name: state.name.clone(),
                    account: account.clone(),
                };
            }
        }
        ActiveEndpoint::Emergency
    }

    /// Ask the scheduler to run a reconciliation as soon as possible.
    pub fn request_reconciliation(&self) {
        self.force_reconcile.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    /// Probe without recomputing emergency. Returns (was, is) connected.
    async fn probe_slot(&self, slot: &EndpointSlot<E>) -> (bool, bool) {
        let listening = bounded(
            self.config.probe_timeout(),
            "liveness probe",
            slot.endpoint.is_listening(),
        )
        .instrument(probe_span(slot.name()))
        .await;
        let reachable = matches!(listening, Ok(true));

        let mut state = slot.state.write().await;
        let was = state.connected;
        // Ceiling-held endpoints stay down until recovery clears them.
        let now = reachable && !state.at_ceiling(self.config.failure_ceiling);
        state.connected = now;
        if now && !was {
            state.reset_recovery();
        }

        match (was, now) {
            (true, false) => match listening {
                Err(e) => tracing::warn!(endpoint = slot.name(), error = %e, "endpoint lost"),
                Ok(_) => tracing::warn!(endpoint = slot.name(), "endpoint lost"),
            },
            (false, true) => tracing::info!(endpoint = slot.name(), "endpoint reachable"),
            _ => {}
        }
        (was, now)
    }

    /// Refresh account and height, then bind the contract if it is unbound,
    /// errored, or `force_bind` is set. Configuration errors are never re-bound.
    async fn rediscover(&self, slot: &EndpointSlot<E>, force_bind: bool) {
        let limit = self.config.request_timeout();

        match bounded(limit, "accounts", slot.endpoint.accounts()).await {
            Ok(accounts) => {
                let account = accounts.into_iter().next();
                if account.is_none() {
                    tracing::warn!(endpoint = slot.name(), "endpoint exposes no signing account");
                }
                slot.state.write().await.account = account;
            }
            Err(e) => tracing::warn!(endpoint = slot.name(), error = %e, "account discovery failed"),
        }

        match bounded(limit, "block_height", slot.endpoint.block_height()).await {
            Ok(height) => slot.state.write().await.block_height = Some(height),
            Err(e) => tracing::debug!(endpoint = slot.name(), error = %e, "block height unavailable"),
        }

        // A missing or malformed contract stays excluded until the process is
        // reconfigured.
        let needs_bind = {
            let state = slot.state.read().await;
            !state.contract_status.is_configuration_error()
                && (force_bind
                    || !state.contract_bound
                    || state.contract_status == ContractStatus::Error)
        };
        if needs_bind {
            self.bind(slot).await;
        }
    }

    async fn bind(&self, slot: &EndpointSlot<E>) -> bool {
        let result = bounded(
            self.config.request_timeout(),
            "bind_contract",
            slot.endpoint.bind_contract(&slot.contract_address),
        )
        .await;

        let mut state = slot.state.write().await;
        match result {
            Ok(()) => {
                state.contract_bound = true;
                if !matches!(state.contract_status, ContractStatus::SyncFailed) {
                    state.contract_status = ContractStatus::Synced;
                }
                tracing::debug!(endpoint = slot.name(), contract = %slot.contract_address, "contract bound");
                true
            }
            Err(e) => {
                state.contract_bound = false;
                state.contract_status = match &e {
                    EndpointError::InvalidAddress(_) => ContractStatus::InvalidAddress,
                    EndpointError::NoContract(_) => ContractStatus::NoContract,
                    _ => ContractStatus::Error,
                };
                tracing::warn!(
                    endpoint = slot.name(),
                    contract = %slot.contract_address,
                    status = ?state.contract_status,
                    error = %e,
                    "contract binding failed; endpoint excluded from routing"
                );
                false
            }
        }
    }

    /// Backoff before the next recovery probe: the sync interval doubled per
    /// failed attempt, the exponent capped by `sync_retry_ceiling`.
    fn recovery_delay_ms(&self, attempts: u32) -> u64 {
        let base = self.config.sync_interval().as_millis() as u64;
        let shift = attempts
            .saturating_sub(1)
            .min(self.config.sync_retry_ceiling)
            .min(MAX_BACKOFF_SHIFT);
        base.saturating_mul(1u64 << shift)
    }
}
