//! Encrypted, tamper-evident local vote ledger.
//!
//! The ledger is the disaster-recovery copy of every vote: it is written on
//! every submission regardless of endpoint outcome and never depends on the
//! network. One primary file and one backup file hold the same versioned
//! container; the backup is the primary's previous generation.

pub mod archive;
pub mod config;
pub mod error;
pub mod snapshot;
pub mod store;

pub use config::{CorruptionPolicy, LedgerConfig};
pub use error::LedgerError;
pub use snapshot::{HashCheck, LedgerMetadata, LedgerSnapshot, SCHEMA_VERSION};
pub use store::{EncryptedLedger, LedgerCounts};
