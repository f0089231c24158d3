//! Timestamp type used throughout the service.
//!
//! Timestamps are Unix epoch milliseconds (UTC). The ledger endpoints speak
//! whole seconds on the wire, so conversions in both directions live here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// A Unix timestamp in milliseconds since epoch (UTC).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The epoch (time zero).
    pub const EPOCH: Self = Self(0);

    pub fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    pub fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1000))
    }

    /// Get the current system time as a `Timestamp`.
    ///
    /// A clock set before the epoch reads as [`Timestamp::EPOCH`].
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self(millis)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Whole seconds, as carried by the endpoint contract.
    pub fn as_secs(&self) -> u64 {
        self.0 / 1000
    }

    /// This timestamp shifted forward by `millis`.
    pub fn plus_millis(&self, millis: u64) -> Self {
        Self(self.0.saturating_add(millis))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_round_down() {
        let ts = Timestamp::from_millis(1_700_000_000_999);
        assert_eq!(ts.as_secs(), 1_700_000_000);
        assert_eq!(Timestamp::from_secs(ts.as_secs()).as_millis(), 1_700_000_000_000);
    }

    #[test]
    fn plus_millis_saturates() {
        let ts = Timestamp::from_millis(10);
        assert_eq!(ts.plus_millis(15), Timestamp::from_millis(25));
        assert_eq!(Timestamp::from_millis(u64::MAX).plus_millis(1).as_millis(), u64::MAX);
    }

    #[test]
    fn now_is_after_epoch() {
        assert!(Timestamp::now() > Timestamp::EPOCH);
    }
}
