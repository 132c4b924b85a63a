//! Serde adapters for 18-decimal `u128` amounts.
//!
//! JSON numbers above 2^53 silently lose precision in half the clients
//! that will ever read our API, so amounts are written as decimal strings.
//! Reading accepts either form.
//!
//! ```
//! # use serde::{Deserialize, Serialize};
//! #[derive(Serialize, Deserialize)]
//! struct Balance {
//!     #[serde(with = "ballast_protocol::amount_serde")]
//!     amount: u128,
//! }
//! let json = serde_json::to_string(&Balance { amount: 10u128.pow(24) }).unwrap();
//! assert_eq!(json, r#"{"amount":"1000000000000000000000000"}"#);
//! ```

use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};
use std::fmt;

/// Serializes a `u128` as a decimal string.
pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Deserializes a `u128` from a decimal string or an integer.
pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
    deserializer.deserialize_any(AmountVisitor)
}

struct AmountVisitor;

impl<'de> Visitor<'de> for AmountVisitor {
    type Value = u128;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative integer or a decimal string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<u128, E> {
        Ok(u128::from(v))
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> Result<u128, E> {
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<u128, E> {
        u128::try_from(v).map_err(|_| E::custom("amount must be non-negative"))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<u128, E> {
        v.trim()
            .parse::<u128>()
            .map_err(|e| E::custom(format!("invalid amount '{}': {}", v, e)))
    }
}

/// Same as the parent module, for `Option<u128>`.
pub mod option {
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serializes `Some(v)` as a decimal string and `None` as `null`.
    pub fn serialize<S: Serializer>(value: &Option<u128>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.collect_str(v),
            None => serializer.serialize_none(),
        }
    }

    /// Accepts `null`, an integer or a decimal string.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u128>, D::Error> {
        #[derive(Deserialize)]
        struct Wrapper(#[serde(with = "super")] u128);

        Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|Wrapper(v)| v))
    }
}
