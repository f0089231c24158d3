//! Election lifecycle gate.
//!
//! Holds the administrative status (`not_started → voting ⇄ paused →
//! finished`), derives emergency mode from endpoint connectivity, and decides
//! whether reconciliation and vote writes are currently permitted.

pub mod error;
pub mod gate;

pub use error::ElectionError;
pub use gate::{ElectionGate, EmergencyChange, SchedulerDirective};
