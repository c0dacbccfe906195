//! Strongly-typed identifiers used across the engine.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure to parse an identifier from its textual form.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid identifier: {kind}: {value:?}")]
pub struct InvalidId {
    pub kind: &'static str,
    pub value: String,
}

/// Identifier of an authenticated principal (user, service account).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(u64);

macro_rules! impl_integer_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            pub const fn get(&self) -> u64 {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<u64> for $t {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl From<$t> for u64 {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = InvalidId;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse::<u64>().map(Self).map_err(|_| InvalidId {
                    kind: $name,
                    value: s.to_string(),
                })
            }
        }
    };
}

impl_integer_newtype!(PrincipalId, "PrincipalId");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn principal_id_display_and_parse() {
        let id = PrincipalId::new(42);
        assert_eq!(id.to_string(), "42");
        assert_eq!("42".parse::<PrincipalId>().unwrap(), id);
    }

    #[test]
    fn principal_id_rejects_garbage() {
        let err = "forty-two".parse::<PrincipalId>().unwrap_err();
        assert_eq!(err.kind, "PrincipalId");
        assert!(err.to_string().contains("forty-two"));
    }

    #[test]
    fn principal_id_serializes_transparently() {
        let json = serde_json::to_string(&PrincipalId::new(7)).unwrap();
        assert_eq!(json, "7");
        let back: PrincipalId = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get(), 7);
    }
}
