//! Nullable infrastructure for deterministic testing.
//!
//! Inspired by the "A-frame architecture" pattern from RsNano.
//! The ledger endpoints sit behind the `LedgerEndpoint` trait. This crate
//! provides a test-friendly implementation that:
//! - Holds its votes in memory
//! - Can be taken offline and brought back programmatically
//! - Never touches the network
//!
//! Usage: build the service over `NullEndpoint` in tests.

pub mod endpoint;

pub use endpoint::NullEndpoint;
