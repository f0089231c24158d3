//! Voter and ballot identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TypeError;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create an identifier from a raw string.
            ///
            /// Leading and trailing whitespace is trimmed; an empty result is rejected.
            pub fn parse(raw: impl AsRef<str>) -> Result<Self, TypeError> {
                let trimmed = raw.as_ref().trim();
                if trimmed.is_empty() {
                    return Err(TypeError::EmptyIdentifier($label));
                }
                Ok(Self(trimmed.to_string()))
            }

            /// Return the raw identifier string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = TypeError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::parse(s)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = TypeError;

            fn try_from(s: &str) -> Result<Self, Self::Error> {
                Self::parse(s)
            }
        }
    };
}

string_id!(
    /// Identifies one voter. At most one vote per voter is a system invariant.
    VoterId,
    "voter id"
);

string_id!(
    /// Identifies one cast ballot, unique across every vote store.
    BallotId,
    "ballot id"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_trimmed() {
        let id = BallotId::parse("  B1 ").unwrap();
        assert_eq!(id.as_str(), "B1");
    }

    #[test]
    fn empty_id_rejected() {
        assert!(VoterId::parse("   ").is_err());
        assert!(BallotId::try_from("").is_err());
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = VoterId::parse("V1").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"V1\"");
    }

    proptest::proptest! {
        #[test]
        fn parse_is_idempotent(raw in "\\PC{0,24}") {
            if let Ok(id) = VoterId::parse(&raw) {
                proptest::prop_assert_eq!(id.as_str(), raw.trim());
                proptest::prop_assert_eq!(VoterId::parse(id.as_str()).unwrap(), id);
            } else {
                proptest::prop_assert!(raw.trim().is_empty());
            }
        }
    }
}
