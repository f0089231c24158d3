//! Election lifecycle status and the timestamps that gate synchronization.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Timestamp, TypeError};

/// Administrative status of the election.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElectionStatus {
    #[default]
    NotStarted,
    Voting,
    Paused,
    /// Terminal until a full reset.
    Finished,
}

impl ElectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Voting => "voting",
            Self::Paused => "paused",
            Self::Finished => "finished",
        }
    }
}

impl fmt::Display for ElectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ElectionStatus {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "not_started" => Ok(Self::NotStarted),
            "voting" => Ok(Self::Voting),
            "paused" => Ok(Self::Paused),
            "finished" => Ok(Self::Finished),
            other => Err(TypeError::UnknownStatus(other.to_string())),
        }
    }
}

/// The election state, persisted alongside the ledger so a restart resumes it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionState {
    pub status: ElectionStatus,
    #[serde(default)]
    pub started_at: Option<Timestamp>,
    #[serde(default)]
    pub paused_at: Option<Timestamp>,
    #[serde(default)]
    pub finished_at: Option<Timestamp>,
    /// When the most recent vote was recorded.
    #[serde(default)]
    pub last_data_at: Option<Timestamp>,
}
