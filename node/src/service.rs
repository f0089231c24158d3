//! The vote service: owns both endpoint slots, the encrypted ledger, the
//! election gate and the sync scheduler, and exposes the operations the
//! election-state controller drives.
//!
//! The component logic lives in sibling modules as further `impl` blocks:
//! [`crate::monitor`], [`crate::router`], [`crate::reconcile`] and
//! [`crate::scheduler`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, Notify, RwLock};

use tally_election::{ElectionGate, SchedulerDirective};
use tally_endpoint::{EndpointState, LedgerEndpoint};
use tally_ledger::{EncryptedLedger, LedgerError};
use tally_types::vote::decode_payload;
use tally_types::{
    ActiveEndpoint, DataIntegrity, ElectionResults, ElectionState, ElectionStatus,
    EndpointResetOutcome, LedgerIntegrity, ResetReport, ResultsSource, Selection, SyncHistory,
    SyncHistoryEntry, SyncOperation, Timestamp,
};

use crate::pool::{bounded, EndpointSlot};
use crate::scheduler::SchedulerHandle;
use crate::{NodeError, ServiceConfig, ServiceMetrics};

/// How many history entries a status snapshot carries.
const STATUS_HISTORY_TAIL: usize = 20;

/// Per-position, per-candidate counts.
type Tally = BTreeMap<String, BTreeMap<String, u64>>;

/// Ledger summary included in a status snapshot.
#[derive(Clone, Debug, Serialize)]
pub struct LedgerStatus {
    pub integrity: LedgerIntegrity,
    pub votes: u64,
    pub pending: u64,
}

/// Point-in-time view of the service for the election-state controller.
#[derive(Clone, Debug, Serialize)]
pub struct StatusSnapshot {
    pub initialized: bool,
    pub election: ElectionState,
    pub emergency: bool,
    pub sync_allowed: bool,
    pub scheduler_running: bool,
    pub active_endpoint: ActiveEndpoint,
    pub endpoints: Vec<EndpointState>,
    pub ledger: LedgerStatus,
    pub consecutive_tick_failures: u32,
    pub history: Vec<SyncHistoryEntry>,
}

/// The dual-endpoint vote service.
///
/// Construct with [`VoteService::new`], then call [`VoteService::init`]
/// (retryable) before submitting votes.
pub struct VoteService<E: LedgerEndpoint> {
    pub(crate) config: ServiceConfig,
    pub(crate) slots: Vec<EndpointSlot<E>>,
    pub(crate) ledger: Arc<EncryptedLedger>,
    pub(crate) gate: RwLock<ElectionGate>,
    pub(crate) history: Mutex<SyncHistory>,
    pub(crate) scheduler: Mutex<Option<SchedulerHandle>>,
    /// Held for the whole of a scheduler tick or a reset.
    pub(crate) tick_lock: Mutex<()>,
    pub(crate) wake: Arc<Notify>,
    pub(crate) force_reconcile: AtomicBool,
    pub(crate) tick_count: AtomicU64,
    pub(crate) consecutive_tick_failures: AtomicU32,
    initialized: AtomicBool,
    metrics: Arc<ServiceMetrics>,
}

impl<E: LedgerEndpoint> VoteService<E> {
    /// Validate the config, derive the ledger key and wrap both endpoints.
    ///
    /// Touches neither the network nor the ledger file.
    pub fn new(config: ServiceConfig, primary: E, secondary: E) -> Result<Arc<Self>, NodeError> {
        config.validate()?;
        let secret = config
            .secret()
            .ok_or_else(|| NodeError::Config("encryption_secret is not set".into()))?;
        let ledger = Arc::new(EncryptedLedger::open(config.ledger.clone(), secret)?);

        let mut slots = Vec::with_capacity(2);
        for (endpoint, endpoint_config) in [(primary, &config.primary), (secondary, &config.secondary)] {
            let address = config
                .contract_address_for(endpoint_config)
                .ok_or_else(|| {
                    NodeError::Config(format!("no contract address for {}", endpoint_config.name))
                })?
                .to_string();
            slots.push(EndpointSlot::new(Arc::new(endpoint), address));
        }

        let history = SyncHistory::new(config.history_capacity);
        Ok(Arc::new(Self {
            config,
            slots,
            ledger,
            gate: RwLock::new(ElectionGate::new()),
            history: Mutex::new(history),
            scheduler: Mutex::new(None),
            tick_lock: Mutex::new(()),
            wake: Arc::new(Notify::new()),
            force_reconcile: AtomicBool::new(false),
            tick_count: AtomicU64::new(0),
            consecutive_tick_failures: AtomicU32::new(0),
            initialized: AtomicBool::new(false),
            metrics: Arc::new(ServiceMetrics::new()),
        }))
    }

    /// Load the ledger, restore the persisted election state, probe both
    /// endpoints and start the scheduler if the election is running.
    ///
    /// On failure the service stays uninitialized and `init` may be retried.
    pub async fn init(self: &Arc<Self>) -> Result<(), NodeError> {
        if self.is_initialized() {
            return Ok(());
        }

        let snapshot = self.ledger_task(|ledger| ledger.load()).await?;
        let restored = snapshot.metadata.election_state.clone();
        let status = restored.status;
        *self.gate.write().await = ElectionGate::from_state(restored);

        let connected = self.refresh_all().await;
        self.update_ledger_gauges();
        self.initialized.store(true, Ordering::SeqCst);

        tracing::info!(
            status = %status,
            votes = snapshot.votes.len(),
            pending = snapshot.pending_count(),
            integrity = ?self.ledger.integrity(),
            connected,
            "vote service initialized"
        );

        if matches!(status, ElectionStatus::Voting | ElectionStatus::Paused) {
            self.start_scheduler().await;
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<ServiceMetrics> {
        &self.metrics
    }

    pub fn ledger(&self) -> &EncryptedLedger {
        &self.ledger
    }

    pub async fn election_state(&self) -> ElectionState {
        self.gate.read().await.state().clone()
    }

    pub async fn is_emergency(&self) -> bool {
        self.gate.read().await.is_emergency()
    }

    pub async fn sync_allowed(&self) -> bool {
        self.gate.read().await.sync_allowed()
    }

    /// Health records of both endpoints, primary first.
    pub async fn endpoint_states(&self) -> Vec<EndpointState> {
        let mut states = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            states.push(slot.snapshot().await);
        }
        states
    }

    /// The primary endpoint client.
    pub fn primary(&self) -> &E {
        &self.slots[0].endpoint
    }

    pub fn secondary(&self) -> &E {
        &self.slots[1].endpoint
    }

    pub(crate) fn ensure_initialized(&self) -> Result<(), NodeError> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(NodeError::NotInitialized)
        }
    }

    // ── Controller operations ─────────────────────────────────────────────

    /// Tally the election from the active endpoint, falling back to the
    /// encrypted ledger when no endpoint can serve the read.
    pub async fn get_election_results(&self) -> Result<ElectionResults, NodeError> {
        self.ensure_initialized()?;
        let snapshot = self.ledger_task(|ledger| ledger.load()).await?;
        let ledger_votes = snapshot.votes.len() as u64;
        let pending_votes = snapshot.pending_count() as u64;

        let (positions, total_votes, source) = match self.tally_from_endpoint().await {
            Some((name, positions, total)) => (positions, total, ResultsSource::Endpoint(name)),
            None => {
                let mut positions = Tally::new();
                for vote in &snapshot.votes {
                    tally_into(&mut positions, &vote.selections);
                }
                (positions, ledger_votes, ResultsSource::Ledger)
            }
        };

        Ok(ElectionResults {
            positions,
            total_votes,
            source,
            integrity: DataIntegrity {
                ledger: self.ledger.integrity(),
                consistent: total_votes == ledger_votes,
                ledger_votes,
                pending_votes,
            },
        })
    }

    async fn tally_from_endpoint(&self) -> Option<(String, Tally, u64)> {
        let limit = self.config.request_timeout();
        for slot in &self.slots {
            if slot.routable_account().await.is_none() {
                continue;
            }
            let endpoint = &slot.endpoint;
            let ballots = match bounded(limit, "get_all_votes", endpoint.get_all_votes()).await {
                Ok(ballots) => ballots,
                Err(e) => {
                    tracing::warn!(endpoint = slot.name(), error = %e, "results read failed");
                    continue;
                }
            };

            let mut positions = Tally::new();
            let mut complete = true;
            for ballot in &ballots {
                let vote = match bounded(limit, "get_vote", endpoint.get_vote(ballot)).await {
                    Ok(vote) => vote,
                    Err(e) => {
                        tracing::warn!(endpoint = slot.name(), ballot = %ballot, error = %e, "results read failed");
                        complete = false;
                        break;
                    }
                };
                match decode_payload(&vote.votes_payload) {
                    Ok(selections) => tally_into(&mut positions, &selections),
                    Err(e) => {
                        tracing::warn!(ballot = %ballot, error = %e, "undecodable vote payload skipped");
                    }
                }
            }
            if complete {
                return Some((slot.name().to_string(), positions, ballots.len() as u64));
            }
        }
        None
    }

    /// Connectivity, emergency and sync flags plus the recent sync history.
    pub async fn get_status_snapshot(&self) -> Result<StatusSnapshot, NodeError> {
        let snapshot = self.ledger_task(|ledger| ledger.load()).await?;
        let (election, emergency, sync_allowed) = {
            let gate = self.gate.read().await;
            (gate.state().clone(), gate.is_emergency(), gate.sync_allowed())
        };
        let history = self.history.lock().await.tail(STATUS_HISTORY_TAIL);

        Ok(StatusSnapshot {
            initialized: self.is_initialized(),
            election,
            emergency,
            sync_allowed,
            scheduler_running: self.scheduler_running().await,
            active_endpoint: self.get_active_endpoint().await,
            endpoints: self.endpoint_states().await,
            ledger: LedgerStatus {
                integrity: self.ledger.integrity(),
                votes: snapshot.votes.len() as u64,
                pending: snapshot.pending_count() as u64,
            },
            consecutive_tick_failures: self.consecutive_tick_failures.load(Ordering::SeqCst),
            history,
        })
    }

    /// Apply an administrative status change, persist it, and start or stop
    /// the scheduler accordingly.
    pub async fn transition_election_state(
        self: &Arc<Self>,
        to: ElectionStatus,
        reason: Option<&str>,
    ) -> Result<ElectionState, NodeError> {
        self.ensure_initialized()?;
        let (directive, state) = {
            let mut gate = self.gate.write().await;
            let directive = gate.transition(to, Timestamp::now())?;
            (directive, gate.state().clone())
        };
        tracing::info!(status = %to, reason = reason.unwrap_or("-"), "election transition applied");

        let persisted = state.clone();
        if let Err(e) = self
            .ledger_task(move |ledger| ledger.store_election_state(&persisted))
            .await
        {
            tracing::error!(error = %e, "failed to persist election state");
        }

        match directive {
            SchedulerDirective::Start => self.start_scheduler().await,
            SchedulerDirective::Stop => self.stop_scheduler().await,
            SchedulerDirective::None => {}
        }
        Ok(state)
    }

    /// Clear memory, re-initialize the ledger, reset every reachable
    /// endpoint and archive the outcome.
    ///
    /// Endpoint and ledger failures are reported in the result, never raised.
    pub async fn reset_all(self: &Arc<Self>) -> Result<ResetReport, NodeError> {
        self.ensure_initialized()?;
        self.stop_scheduler().await;
        let _tick = self.tick_lock.lock().await;

        let timestamp = Timestamp::now();
        let previous = match self.ledger_task(|ledger| ledger.load()).await {
            Ok(snapshot) => snapshot.votes,
            Err(e) => {
                tracing::warn!(error = %e, "ledger unreadable before reset; archiving no votes");
                Vec::new()
            }
        };

        self.gate.write().await.reset();
        self.history.lock().await.clear();
        self.force_reconcile.store(false, Ordering::SeqCst);
        self.consecutive_tick_failures.store(0, Ordering::SeqCst);

        let ledger_reset = self
            .ledger_task(|ledger| Ok(ledger.reinitialize(&ElectionState::default())))
            .await
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "ledger reinitialization did not run");
                false
            });

        let limit = self.config.request_timeout();
        let mut endpoints = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            let outcome = match slot.routable_account().await {
                Some(account) => {
                    match bounded(limit, "reset_votes", slot.endpoint.reset_votes(&account)).await {
                        Ok(()) => EndpointResetOutcome {
                            endpoint: slot.name().to_string(),
                            reset: true,
                            error: None,
                        },
                        Err(e) => EndpointResetOutcome {
                            endpoint: slot.name().to_string(),
                            reset: false,
                            error: Some(e.to_string()),
                        },
                    }
                }
                None => EndpointResetOutcome {
                    endpoint: slot.name().to_string(),
                    reset: false,
                    error: Some("endpoint not reachable".into()),
                },
            };
            endpoints.push(outcome);
        }

        let mut report = ResetReport {
            timestamp,
            previous_votes: previous.len() as u64,
            memory_cleared: true,
            ledger_reset,
            endpoints,
            archive: None,
        };
        let archived = report.clone();
        let archive = self
            .ledger_task(move |ledger| {
                tally_ledger::archive::write_archive(ledger.config(), &archived, &previous)
            })
            .await;
        match archive {
            Ok(path) => report.archive = Some(path.display().to_string()),
            Err(e) => tracing::error!(error = %e, "failed to write reset archive"),
        }

        let reset_endpoints = report.endpoints.iter().filter(|e| e.reset).count() as u64;
        self.push_history(
            SyncOperation::Reset,
            reset_endpoints,
            (report.endpoints.len() as u64) - reset_endpoints,
        )
        .await;
        self.update_ledger_gauges();

        tracing::warn!(
            previous_votes = report.previous_votes,
            complete = report.is_complete(),
            "full reset performed"
        );
        Ok(report)
    }

    // ── Shared helpers ────────────────────────────────────────────────────

    pub(crate) async fn push_history(&self, operation: SyncOperation, synced: u64, errored: u64) {
        let emergency = self.gate.read().await.is_emergency();
        let endpoints_connected = self.connected_count().await;
        self.history.lock().await.push(SyncHistoryEntry {
            operation,
            timestamp: Timestamp::now(),
            synced,
            errored,
            emergency,
            endpoints_connected,
        });
    }

    pub(crate) async fn connected_count(&self) -> usize {
        let mut connected = 0;
        for slot in &self.slots {
            if slot.state.read().await.connected {
                connected += 1;
            }
        }
        connected
    }

    /// Run blocking ledger work (file I/O, decryption) off the async workers.
    pub(crate) async fn ledger_task<T, F>(&self, work: F) -> Result<T, NodeError>
    where
        F: FnOnce(&EncryptedLedger) -> Result<T, LedgerError> + Send + 'static,
        T: Send + 'static,
    {
        let ledger = Arc::clone(&self.ledger);
        let result = tokio::task::spawn_blocking(move || work(&ledger))
            .await
            .map_err(|e| NodeError::Task(format!("ledger task: {e}")))?;
        Ok(result?)
    }

    pub(crate) fn update_ledger_gauges(&self) {
        let counts = self.ledger.counts();
        self.metrics.ledger_votes.set(counts.votes as i64);
        self.metrics.pending_votes.set(counts.pending as i64);
    }
}

fn tally_into(positions: &mut Tally, selections: &[Selection]) {
    for selection in selections {
        *positions
            .entry(selection.position.clone())
            .or_default()
            .entry(selection.candidate.clone())
            .or_default() += 1;
    }
}
