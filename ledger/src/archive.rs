//! Timestamped audit archive written on every full reset.

use std::fs;
use std::path::PathBuf;

use serde::Serialize;
use tally_types::{ResetReport, VoteRecord};

use crate::{LedgerConfig, LedgerError};

#[derive(Serialize)]
struct ArchiveFile<'a> {
    report: &'a ResetReport,
    votes: &'a [VoteRecord],
}

/// Write `reset-<millis>.json` into the archive directory and return its path.
///
/// The archive holds the report and the votes the ledger held before the
/// reset, in plaintext JSON; protect the archive directory accordingly.
pub fn write_archive(
    config: &LedgerConfig,
    report: &ResetReport,
    votes: &[VoteRecord],
) -> Result<PathBuf, LedgerError> {
    let dir = config.archive_path();
    fs::create_dir_all(&dir)?;
    let path = dir.join(format!("reset-{}.json", report.timestamp.as_millis()));
    let body = serde_json::to_vec_pretty(&ArchiveFile { report, votes })?;
    fs::write(&path, body)?;
    tracing::info!(file = %path.display(), votes = votes.len(), "wrote reset archive");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_types::Timestamp;

    #[test]
    fn archive_lands_in_default_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = LedgerConfig::in_dir(dir.path());
        let report = ResetReport {
            timestamp: Timestamp::from_millis(1234),
            previous_votes: 0,
            memory_cleared: true,
            ledger_reset: true,
            endpoints: Vec::new(),
            archive: None,
        };
        let path = write_archive(&config, &report, &[]).unwrap();
        assert_eq!(path, dir.path().join("archive").join("reset-1234.json"));

        let body: serde_json::Value = serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
        assert_eq!(body["report"]["previous_votes"], 0);
    }
}
