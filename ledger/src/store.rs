//! The encrypted ledger store.
//!
//! Every read-modify-write goes through [`EncryptedLedger::update`], which
//! holds the ledger mutex across load, mutation and save. Vote submission and
//! reconciliation therefore never interleave their writes.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tally_crypto::{Envelope, LedgerKey};
use tally_types::{
    BallotId, ElectionState, LedgerIntegrity, RecordSource, SyncStatus, Timestamp, VoteRecord,
};
use zeroize::Zeroizing;

use crate::snapshot::{HashCheck, LedgerSnapshot};
use crate::{CorruptionPolicy, LedgerConfig, LedgerError};

/// Outcome of reading one file.
enum FileRead {
    Missing,
    Loaded(LedgerSnapshot, HashCheck),
}

/// Vote and pending counts as of the last successful load or save.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LedgerCounts {
    pub votes: u64,
    pub pending: u64,
}

impl LedgerCounts {
    fn of(snapshot: &LedgerSnapshot) -> Self {
        Self {
            votes: snapshot.votes.len() as u64,
            pending: snapshot.pending_count() as u64,
        }
    }
}

/// State guarded by the ledger mutex.
struct Guarded {
    integrity: LedgerIntegrity,
    counts: LedgerCounts,
}

/// Durable, encrypted, tamper-evident vote storage.
pub struct EncryptedLedger {
    config: LedgerConfig,
    key: LedgerKey,
    secret: Zeroizing<String>,
    guarded: Mutex<Guarded>,
}

impl EncryptedLedger {
    /// Derive the ledger key and make sure the data directory exists.
    ///
    /// Key derivation is deliberately slow; it runs once here.
    pub fn open(config: LedgerConfig, secret: &str) -> Result<Self, LedgerError> {
        let key = LedgerKey::derive(secret, &config.kdf)?;
        fs::create_dir_all(&config.data_dir)?;
        Ok(Self {
            config,
            key,
            secret: Zeroizing::new(secret.to_string()),
            guarded: Mutex::new(Guarded {
                integrity: LedgerIntegrity::Fresh,
                counts: LedgerCounts::default(),
            }),
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// The outcome of the most recent load.
    pub fn integrity(&self) -> LedgerIntegrity {
        self.lock().integrity
    }

    /// Counts as of the last load or save, without touching the file.
    pub fn counts(&self) -> LedgerCounts {
        self.lock().counts
    }

    /// Load the ledger, falling back to the backup when the primary is
    /// unreadable or tampered.
    ///
    /// With [`CorruptionPolicy::Reinitialize`] this never fails: if both files
    /// are unusable an empty snapshot is returned. With
    /// [`CorruptionPolicy::FailFast`] that case is an error instead.
    pub fn load(&self) -> Result<LedgerSnapshot, LedgerError> {
        let mut guarded = self.lock();
        self.load_locked(&mut guarded)
    }

    /// Persist `snapshot`, rotating the current file into the backup slot.
    ///
    /// Recomputes the count and content hash first. Returns `false` (and logs)
    /// on failure rather than raising.
    pub fn save(&self, snapshot: &mut LedgerSnapshot) -> bool {
        let mut guarded = self.lock();
        match self.save_locked(snapshot) {
            Ok(()) => {
                guarded.counts = LedgerCounts::of(snapshot);
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to save encrypted ledger");
                false
            }
        }
    }

    /// Run `mutate` on the current snapshot under the ledger mutex and save
    /// if it reports a change. Returns whether a save happened.
    pub fn update<F>(&self, mutate: F) -> Result<bool, LedgerError>
    where
        F: FnOnce(&mut LedgerSnapshot) -> bool,
    {
        let mut guarded = self.lock();
        let mut snapshot = self.load_locked(&mut guarded)?;
        if !mutate(&mut snapshot) {
            return Ok(false);
        }
        self.save_locked(&mut snapshot)?;
        guarded.counts = LedgerCounts::of(&snapshot);
        Ok(true)
    }

    /// Insert a vote, or replace the record sharing its ballot id or voter id.
    ///
    /// A replaced fallback record is re-tagged
    /// [`RecordSource::EmergencyFallbackUpdated`]. The embedded election state
    /// is refreshed on every upsert.
    pub fn upsert_vote(&self, mut vote: VoteRecord, election: &ElectionState) -> bool {
        let now = Timestamp::now();
        vote.updated_at = now;
        let result = self.update(|snapshot| {
            match snapshot.position_of(&vote.ballot_id, &vote.voter_id) {
                Some(index) => {
                    if vote.source == RecordSource::EmergencyFallback {
                        vote.source = RecordSource::EmergencyFallbackUpdated;
                    }
                    tracing::debug!(ballot = %vote.ballot_id, "replacing existing ledger record");
                    snapshot.votes[index] = vote;
                }
                None => snapshot.votes.push(vote),
            }
            snapshot.metadata.election_state = election.clone();
            true
        });
        match result {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(error = %e, "failed to upsert vote into encrypted ledger");
                false
            }
        }
    }

    /// Mark the given ballots as synced. Returns how many records changed.
    pub fn mark_synced(&self, ballots: &[BallotId]) -> Result<usize, LedgerError> {
        if ballots.is_empty() {
            return Ok(0);
        }
        let now = Timestamp::now();
        let mut changed = 0;
        self.update(|snapshot| {
            for vote in snapshot.votes.iter_mut() {
                if vote.needs_sync() && ballots.contains(&vote.ballot_id) {
                    vote.sync_status = SyncStatus::Synced;
                    if vote.source.is_fallback() {
                        vote.source = RecordSource::ReconciledFromLedger;
                    }
                    vote.updated_at = now;
                    changed += 1;
                }
            }
            changed > 0
        })?;
        Ok(changed)
    }

    /// Append records pulled from an endpoint.
    ///
    /// Records whose ballot is already present, or whose voter already has a
    /// different ballot on record, are skipped. Returns how many were added.
    pub fn append_reconciled(&self, votes: Vec<VoteRecord>) -> Result<usize, LedgerError> {
        let mut added = 0;
        self.update(|snapshot| {
            for vote in votes {
                if snapshot.contains_ballot(&vote.ballot_id) {
                    continue;
                }
                if let Some(existing) = snapshot.vote_by_voter(&vote.voter_id) {
                    tracing::warn!(
                        voter = %vote.voter_id,
                        held = %existing.ballot_id,
                        offered = %vote.ballot_id,
                        "endpoint holds a second ballot for a voter; keeping the ledger's"
                    );
                    continue;
                }
                snapshot.votes.push(vote);
                added += 1;
            }
            added > 0
        })?;
        Ok(added)
    }

    /// Store a copy of the election state without touching the votes.
    pub fn store_election_state(&self, election: &ElectionState) -> Result<(), LedgerError> {
        self.update(|snapshot| {
            if &snapshot.metadata.election_state == election {
                return false;
            }
            snapshot.metadata.election_state = election.clone();
            true
        })?;
        Ok(())
    }

    /// Replace the ledger with an empty one.
    ///
    /// The previous contents survive one generation in the backup file.
    pub fn reinitialize(&self, election: &ElectionState) -> bool {
        let mut guarded = self.lock();
        let mut snapshot = LedgerSnapshot::empty(Timestamp::now());
        snapshot.metadata.election_state = election.clone();
        match self.save_locked(&mut snapshot) {
            Ok(()) => {
                guarded.integrity = LedgerIntegrity::Fresh;
                guarded.counts = LedgerCounts::default();
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to reinitialize encrypted ledger");
                false
            }
        }
    }

    // ── Internals ─────────────────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, Guarded> {
        self.guarded.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn load_locked(&self, guarded: &mut Guarded) -> Result<LedgerSnapshot, LedgerError> {
        let snapshot = self.read_locked(guarded)?;
        guarded.counts = LedgerCounts::of(&snapshot);
        Ok(snapshot)
    }

    fn read_locked(&self, guarded: &mut Guarded) -> Result<LedgerSnapshot, LedgerError> {
        let primary = self.config.primary_path();
        let backup = self.config.backup_path();

        match self.read_file(&primary) {
            Ok(FileRead::Loaded(snapshot, HashCheck::Match)) => {
                guarded.integrity = LedgerIntegrity::Verified;
                return Ok(snapshot);
            }
            Ok(FileRead::Loaded(mut snapshot, HashCheck::Missing)) => {
                tracing::info!("ledger has no content hash; regenerating");
                self.save_locked(&mut snapshot)?;
                guarded.integrity = LedgerIntegrity::Regenerated;
                return Ok(snapshot);
            }
            Ok(FileRead::Loaded(_, HashCheck::Mismatch)) => {
                tracing::warn!(file = %primary.display(), "ledger content hash mismatch; possible tampering");
            }
            Ok(FileRead::Missing) => {
                if !backup.exists() {
                    guarded.integrity = LedgerIntegrity::Fresh;
                    return Ok(LedgerSnapshot::empty(Timestamp::now()));
                }
                tracing::warn!("primary ledger file missing but backup present");
            }
            Err(e) => {
                tracing::warn!(file = %primary.display(), error = %e, "primary ledger unreadable");
            }
        }

        match self.read_file(&backup) {
            Ok(FileRead::Loaded(mut snapshot, check)) if check != HashCheck::Mismatch => {
                tracing::warn!(
                    votes = snapshot.votes.len(),
                    "recovered encrypted ledger from backup"
                );
                // Restore the primary in place; rotating would overwrite the
                // good backup with the damaged primary.
                self.write_primary(&mut snapshot)?;
                guarded.integrity = LedgerIntegrity::RecoveredFromBackup;
                Ok(snapshot)
            }
            other => {
                let reason = match other {
                    Ok(FileRead::Missing) => "backup missing".to_string(),
                    Ok(_) => "backup content hash mismatch".to_string(),
                    Err(e) => format!("backup unreadable: {e}"),
                };
                self.handle_double_corruption(guarded, &reason)
            }
        }
    }

    fn handle_double_corruption(
        &self,
        guarded: &mut Guarded,
        reason: &str,
    ) -> Result<LedgerSnapshot, LedgerError> {
        match self.config.corruption_policy {
            CorruptionPolicy::FailFast => {
                tracing::error!(reason, "primary and backup ledgers unusable; refusing to continue");
                Err(LedgerError::Unrecoverable(reason.to_string()))
            }
            CorruptionPolicy::Reinitialize => {
                tracing::error!(
                    reason,
                    "primary and backup ledgers unusable; continuing with an empty ledger, stored votes are lost"
                );
                self.quarantine();
                guarded.integrity = LedgerIntegrity::Reinitialized;
                Ok(LedgerSnapshot::empty(Timestamp::now()))
            }
        }
    }

    /// Move damaged files aside so the next save does not rotate them into
    /// the backup slot and so an operator can inspect them.
    fn quarantine(&self) {
        let suffix = format!("corrupt-{}", Timestamp::now().as_millis());
        for path in [self.config.primary_path(), self.config.backup_path()] {
            if path.exists() {
                let target = sibling_with_suffix(&path, &suffix);
                if let Err(e) = fs::rename(&path, &target) {
                    tracing::warn!(file = %path.display(), error = %e, "failed to quarantine damaged ledger file");
                }
            }
        }
    }

    fn read_file(&self, path: &Path) -> Result<FileRead, LedgerError> {
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(FileRead::Missing),
            Err(e) => return Err(e.into()),
        };
        let envelope: Envelope = serde_json::from_slice(&raw)?;
        let plaintext = tally_crypto::open(&self.key, &envelope)?;
        let snapshot: LedgerSnapshot = serde_json::from_slice(&plaintext)?;
        let check = snapshot.verify(self.secret.as_bytes());
        Ok(FileRead::Loaded(snapshot, check))
    }

    fn save_locked(&self, snapshot: &mut LedgerSnapshot) -> Result<(), LedgerError> {
        let primary = self.config.primary_path();
        if primary.exists() {
            fs::copy(&primary, self.config.backup_path())?;
        }
        self.write_primary(snapshot)
    }

    /// Seal and atomically replace the primary file (write temp, then rename).
    fn write_primary(&self, snapshot: &mut LedgerSnapshot) -> Result<(), LedgerError> {
        snapshot.seal_metadata(self.secret.as_bytes(), Timestamp::now());
        let plaintext = Zeroizing::new(serde_json::to_vec(snapshot)?);
        let envelope = tally_crypto::seal(&self.key, self.config.cipher, &plaintext)?;
        let encoded = serde_json::to_vec_pretty(&envelope)?;

        let primary = self.config.primary_path();
        let tmp = sibling_with_suffix(&primary, "tmp");
        fs::write(&tmp, encoded)?;
        fs::rename(&tmp, &primary)?;
        Ok(())
    }
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}
