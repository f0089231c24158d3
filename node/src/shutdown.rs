//! Process shutdown: OS signals fan out to the HTTP server and the daemon's
//! init loop, then the vote service's scheduler is drained.

use std::sync::atomic::Ordering;
use std::sync::OnceLock;

use tokio::signal;
use tokio::sync::broadcast;

use tally_endpoint::LedgerEndpoint;

use crate::VoteService;

/// What ended the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownReason {
    Interrupt,
    Terminate,
    Requested,
}

pub struct ShutdownController {
    tx: broadcast::Sender<()>,
    reason: OnceLock<ShutdownReason>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            reason: OnceLock::new(),
        }
    }

    /// A receiver that fires once shutdown begins.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Begin shutdown. Only the first reason is kept.
    pub fn trigger(&self, reason: ShutdownReason) {
        if self.reason.set(reason).is_ok() {
            tracing::info!(?reason, "shutdown requested");
        }
        let _ = self.tx.send(());
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        self.reason.get().copied()
    }

    /// Block until SIGINT or SIGTERM, then trigger shutdown.
    pub async fn wait_for_signal(&self) -> ShutdownReason {
        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "SIGTERM handler unavailable");
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        let reason = tokio::select! {
            _ = signal::ctrl_c() => ShutdownReason::Interrupt,
            _ = terminate => ShutdownReason::Terminate,
        };
        self.trigger(reason);
        reason
    }

    /// Stop the sync scheduler. The ledger is saved on every write, so there
    /// is nothing else to flush.
    pub async fn drain<E: LedgerEndpoint>(&self, service: &VoteService<E>) {
        service.stop_scheduler().await;
        tracing::info!(
            reason = ?self.reason(),
            ticks = service.tick_count.load(Ordering::Relaxed),
            "vote service drained"
        );
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}
