//! The ledger endpoint seam.
//!
//! An endpoint is one of the two independent ledger nodes the service writes
//! votes to. [`LedgerEndpoint`] is the contract-call surface the rest of the
//! workspace programs against; [`HttpEndpoint`] speaks it over JSON-RPC and
//! `tally-nullables` provides an in-memory implementation for tests.

pub mod address;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod state;

pub use address::validate_contract_address;
pub use endpoint::{LedgerEndpoint, TxReceipt};
pub use error::{EndpointError, ErrorKind};
pub use http::HttpEndpoint;
pub use state::{ContractStatus, EndpointState};
