use tally_types::{ElectionState, ElectionStatus, Timestamp};

use crate::ElectionError;

/// What the sync scheduler should do after a status change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerDirective {
    /// Start the scheduler unless it is already running.
    Start,
    Stop,
    None,
}

/// Result of recomputing emergency mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmergencyChange {
    /// Both endpoints went down. `paused` is set when this forced a
    /// `voting → paused` transition.
    Entered { paused: bool },
    /// At least one endpoint came back. `sync_allowed` tells the caller
    /// whether to reconcile right away.
    Exited { sync_allowed: bool },
    Unchanged,
}

/// The election state plus the derived emergency flag.
#[derive(Clone, Debug, Default)]
pub struct ElectionGate {
    state: ElectionState,
    emergency: bool,
}

impl ElectionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from a persisted state. Emergency mode is re-derived by the
    /// first health check, so it starts cleared.
    pub fn from_state(state: ElectionState) -> Self {
        Self {
            state,
            emergency: false,
        }
    }

    pub fn state(&self) -> &ElectionState {
        &self.state
    }

    pub fn status(&self) -> ElectionStatus {
        self.state.status
    }

    pub fn is_emergency(&self) -> bool {
        self.emergency
    }

    /// Apply an administrative transition.
    ///
    /// Re-requesting the current status is accepted and repeats its
    /// scheduler directive. `not_started` is only reachable through
    /// [`ElectionGate::reset`].
    pub fn transition(
        &mut self,
        to: ElectionStatus,
        now: Timestamp,
    ) -> Result<SchedulerDirective, ElectionError> {
        use ElectionStatus::*;

        let from = self.state.status;
        if from == Finished && to != Finished {
            return Err(ElectionError::Finished);
        }
        if from != to {
            match (from, to) {
                (NotStarted, Voting) => self.state.started_at = Some(now),
                (Voting, Paused) => self.state.paused_at = Some(now),
                (Paused, Voting) => {}
                (Voting, Finished) | (Paused, Finished) => self.state.finished_at = Some(now),
                _ => return Err(ElectionError::InvalidTransition { from, to }),
            }
            self.state.status = to;
            tracing::info!(from = %from, to = %to, "election status changed");
        }

        Ok(match to {
            Voting | Paused => SchedulerDirective::Start,
            Finished => SchedulerDirective::Stop,
            NotStarted => SchedulerDirective::None,
        })
    }

    /// Back to `not_started` with every timestamp cleared.
    pub fn reset(&mut self) {
        self.state = ElectionState::default();
    }

    /// Whether reconciliation may run.
    ///
    /// Always while voting. While paused, only once a vote has been recorded
    /// after the pause time; a pause with no later data freezes sync.
    pub fn sync_allowed(&self) -> bool {
        match self.state.status {
            ElectionStatus::Voting => true,
            ElectionStatus::Paused => match (self.state.last_data_at, self.state.paused_at) {
                (Some(data), Some(paused)) => data > paused,
                (Some(_), None) => true,
                (None, _) => false,
            },
            ElectionStatus::NotStarted | ElectionStatus::Finished => false,
        }
    }

    /// Whether vote submissions are accepted.
    pub fn writes_allowed(&self) -> bool {
        matches!(
            self.state.status,
            ElectionStatus::Voting | ElectionStatus::Paused
        )
    }

    /// Recompute emergency mode from endpoint connectivity.
    pub fn update_emergency(&mut self, all_down: bool, now: Timestamp) -> EmergencyChange {
        match (self.emergency, all_down) {
            (false, true) => {
                self.emergency = true;
                let paused = self.state.status == ElectionStatus::Voting;
                if paused {
                    self.state.status = ElectionStatus::Paused;
                    self.state.paused_at = Some(now);
                }
                tracing::warn!(paused, "both endpoints down, entering emergency mode");
                EmergencyChange::Entered { paused }
            }
            (true, false) => {
                self.emergency = false;
                let sync_allowed = self.sync_allowed();
                tracing::info!(sync_allowed, "endpoint reachable again, leaving emergency mode");
                EmergencyChange::Exited { sync_allowed }
            }
            _ => EmergencyChange::Unchanged,
        }
    }

    /// Stamp the arrival of a vote.
    pub fn record_data(&mut self, now: Timestamp) {
        self.state.last_data_at = Some(now);
    }
}
