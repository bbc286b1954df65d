// SPDX-License-Identifier: MIT

//! Identifier types for services and their running instances.
//!
//! A [`ServiceId`] is assigned once, at `apply` time, and is stable across
//! restarts. An [`InstanceId`] is the host-level controller identity: it is
//! generated once per daemon data directory and persisted to the `instance`
//! file (spec.md §4.F, §6), not regenerated per service or per spawn.

use std::borrow::Borrow;
use std::fmt;

const RANDOM_ALPHABET: [char; 62] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I',
    'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', 'a', 'b',
    'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u',
    'v', 'w', 'x', 'y', 'z',
];

/// A service identifier: a 14-digit `yyyyMMddHHmmss` timestamp followed by
/// 18 random alphanumeric characters, 32 bytes total.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ServiceId(String);

impl ServiceId {
    pub const LEN: usize = 32;

    /// Builds a new id from the given epoch-millisecond timestamp, using
    /// `nanoid` for the random suffix. Exposed with an explicit timestamp so
    /// tests (and the supervisor's [`Clock`](crate::Clock) abstraction) can
    /// drive it deterministically.
    pub fn generate_at(epoch_ms: u64, timestamp: &str) -> Self {
        debug_assert_eq!(timestamp.len(), 14, "timestamp must be yyyyMMddHHmmss");
        let _ = epoch_ms;
        let suffix = nanoid::nanoid!(18, &RANDOM_ALPHABET);
        Self(format!("{timestamp}{suffix}"))
    }

    pub fn from_string(s: impl Into<String>) -> Result<Self, InvalidId> {
        let s = s.into();
        if s.len() != Self::LEN || !s.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(InvalidId {
                kind: "service id",
                value: s,
            });
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceId({})", self.0)
    }
}

impl Borrow<str> for ServiceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ServiceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for ServiceId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

/// An instance identifier: a 32-character random alphanumeric token,
/// generated once per daemon data directory and persisted to the `instance`
/// file so it survives daemon restarts.
#[derive(Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    pub const LEN: usize = 32;

    pub fn generate() -> Self {
        Self(nanoid::nanoid!(Self::LEN, &RANDOM_ALPHABET))
    }

    pub fn from_string(s: impl Into<String>) -> Result<Self, InvalidId> {
        let s = s.into();
        if s.len() != Self::LEN || !s.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(InvalidId {
                kind: "instance id",
                value: s,
            });
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceId({})", self.0)
    }
}

impl Borrow<str> for InstanceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid {kind}: {value:?}")]
pub struct InvalidId {
    kind: &'static str,
    value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_id_round_trips_through_string() {
        let id = ServiceId::generate_at(0, "20260101000000");
        assert_eq!(id.as_str().len(), ServiceId::LEN);
        let parsed = ServiceId::from_string(id.as_str()).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn service_id_rejects_wrong_length() {
        assert!(ServiceId::from_string("too-short").is_err());
    }

    #[test]
    fn instance_id_is_fresh_each_call() {
        let a = InstanceId::generate();
        let b = InstanceId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), InstanceId::LEN);
    }
}
