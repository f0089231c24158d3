//! Ledger file layout and recovery policy.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use tally_crypto::{CipherMode, KdfParams};

/// What `load` does when the primary and the backup are both unusable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorruptionPolicy {
    /// Quarantine the damaged files and continue with an empty ledger.
    /// Votes held only in the damaged files are lost; the loss is logged and
    /// reported as [`tally_types::LedgerIntegrity::Reinitialized`].
    #[default]
    Reinitialize,
    /// Refuse to load; the service stays uninitialized until an operator
    /// restores a readable file.
    FailFast,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_file_name")]
    pub file_name: String,

    #[serde(default = "default_backup_file_name")]
    pub backup_file_name: String,

    /// Where reset archives go. Defaults to `<data_dir>/archive`.
    #[serde(default)]
    pub archive_dir: Option<PathBuf>,

    /// Envelope used for new writes. Reads accept either version.
    #[serde(default)]
    pub cipher: CipherMode,

    #[serde(default)]
    pub kdf: KdfParams,

    #[serde(default)]
    pub corruption_policy: CorruptionPolicy,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./tally_data")
}

fn default_file_name() -> String {
    "emergency-ledger.enc".to_string()
}

fn default_backup_file_name() -> String {
    "emergency-ledger.enc.bak".to_string()
}

impl LedgerConfig {
    /// A config rooted at `data_dir` with every other field defaulted.
    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn primary_path(&self) -> PathBuf {
        self.data_dir.join(&self.file_name)
    }

    pub fn backup_path(&self) -> PathBuf {
        self.data_dir.join(&self.backup_file_name)
    }

    pub fn archive_path(&self) -> PathBuf {
        self.archive_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("archive"))
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            file_name: default_file_name(),
            backup_file_name: default_backup_file_name(),
            archive_dir: None,
            cipher: CipherMode::default(),
            kdf: KdfParams::default(),
            corruption_policy: CorruptionPolicy::default(),
        }
    }
}
