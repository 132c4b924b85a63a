//! Opaque account identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An account identity as seen by the treasury core.
///
/// Ballast treats the inner string as opaque: it may be a hex public key,
/// a checksummed EVM address, or `"vault"` in a test. Two addresses are the
/// same account iff their strings are byte-equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Wraps a string identity.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The underlying identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the empty identity, which no operation accepts as a caller
    /// or recipient.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Address {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses_compare_by_string() {
        assert_eq!(Address::from("alice"), Address::new(String::from("alice")));
        assert_ne!(Address::from("alice"), Address::from("Alice"));
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&Address::from("0xabc")).unwrap();
        assert_eq!(json, "\"0xabc\"");
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back.as_str(), "0xabc");
    }

    #[test]
    fn empty_address_detected() {
        assert!(Address::from("").is_empty());
        assert!(!Address::from("bob").is_empty());
    }
}
