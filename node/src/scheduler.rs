//! The periodic sync scheduler.
//!
//! One background task per service, started when the election enters
//! `voting` or `paused` and stopped on `finished` or a reset. Each tick
//! refreshes endpoint health, reconciles if sync is allowed and not yet
//! converged, and retries disconnected endpoints.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::Instrument;

use tally_endpoint::LedgerEndpoint;

use crate::tracing_spans::tick_span;
use crate::{NodeError, VoteService};

/// A running scheduler task.
pub(crate) struct SchedulerHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl<E: LedgerEndpoint> VoteService<E> {
    /// Start the scheduler task. No-op if it is already running.
    pub async fn start_scheduler(self: &Arc<Self>) {
        let mut guard = self.scheduler.lock().await;
        if guard.as_ref().is_some_and(|handle| !handle.task.is_finished()) {
            return;
        }

        let (stop, mut stop_rx) = oneshot::channel();
        let service: Weak<Self> = Arc::downgrade(self);
        let wake = Arc::clone(&self.wake);
        let period = self.config.sync_interval();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => {
                        tracing::info!("sync scheduler stopping");
                        break;
                    }
                    _ = interval.tick() => {}
                    _ = wake.notified() => {}
                }
                // The service owns this task; stop once it is gone.
                let Some(svc) = service.upgrade() else {
                    break;
                };
                svc.run_sync_tick().await;
            }
        });

        *guard = Some(SchedulerHandle { stop, task });
        tracing::info!(interval_secs = period.as_secs(), "sync scheduler started");
    }

    /// Stop the scheduler and wait for an in-flight tick to finish.
    pub async fn stop_scheduler(&self) {
        let Some(handle) = self.scheduler.lock().await.take() else {
            return;
        };
        let _ = handle.stop.send(());
        if let Err(e) = handle.task.await {
            tracing::error!(error = %e, "sync scheduler task failed");
        }
    }

    pub async fn scheduler_running(&self) -> bool {
        self.scheduler
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.task.is_finished())
    }

    /// Run one scheduler tick now. Ticks never overlap with each other or
    /// with a reset.
    ///
    /// A failed tick is logged and counted; after
    /// `max_consecutive_tick_failures` in a row the counter starts over.
    pub async fn run_sync_tick(&self) {
        let _tick = self.tick_lock.lock().await;
        let tick = self.tick_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.metrics().scheduler_ticks.inc();

        match self.tick_inner().instrument(tick_span(tick)).await {
            Ok(()) => {
                self.consecutive_tick_failures.store(0, Ordering::SeqCst);
            }
            Err(e) => {
                self.metrics().tick_failures.inc();
                let failures = self.consecutive_tick_failures.fetch_add(1, Ordering::SeqCst) + 1;
                tracing::warn!(tick, failures, error = %e, "sync tick failed");
                if failures >= self.config.max_consecutive_tick_failures {
                    tracing::error!(
                        failures,
                        "consecutive tick failure limit reached; resetting counter"
                    );
                    self.consecutive_tick_failures.store(0, Ordering::SeqCst);
                }
            }
        }
    }

    async fn tick_inner(&self) -> Result<(), NodeError> {
        // Leaving emergency mode during the refresh sets `force_reconcile`.
        self.refresh_all().await;

        let forced = self.force_reconcile.swap(false, Ordering::SeqCst);
        if self.sync_allowed().await && (forced || !self.is_converged().await?) {
            let outcome = self.run_reconciliation().await?;
            tracing::debug!(synced = outcome.synced, errored = outcome.errored, "reconciliation finished");
        }

        self.attempt_recovery().await;

        // Reload so a damaged ledger surfaces as a failed tick.
        self.ledger_task(|ledger| ledger.load().map(drop)).await?;
        self.update_ledger_gauges();
        Ok(())
    }
}
