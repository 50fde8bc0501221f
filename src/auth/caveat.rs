//! First-party caveats
//!
//! A caveat is a single `key=value` restriction. The signature chain covers the
//! raw string, so two caveats that parse the same but differ in bytes are
//! different caveats.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Key of the expiry caveat, value is an ISO-8601 timestamp
pub const EXPIRES_AT: &str = "expires_at";

/// Key of the allowed-operations caveat, value is a comma-separated list
pub const VALID_METHODS: &str = "valid_methods";

/// A first-party caveat
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Caveat(String);

impl Caveat {
    /// Build a caveat from a key and value
    pub fn new(key: &str, value: &str) -> Self {
        Self(format!("{}={}", key, value))
    }

    /// Wrap a raw caveat string as found on the wire
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// `expires_at=<RFC 3339 UTC timestamp>`
    pub fn expires_at(at: DateTime<Utc>) -> Self {
        Self::new(EXPIRES_AT, &at.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    /// `valid_methods=<op>,<op>,...`
    pub fn valid_methods<S: AsRef<str>>(operations: &[S]) -> Self {
        let joined = operations
            .iter()
            .map(|s| s.as_ref())
            .collect::<Vec<_>>()
            .join(",");
        Self::new(VALID_METHODS, &joined)
    }

    /// Everything before the first `=`, or the whole caveat if there is none
    pub fn key(&self) -> &str {
        self.split().0
    }

    /// Everything after the first `=`, or empty
    pub fn value(&self) -> &str {
        self.split().1
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    fn split(&self) -> (&str, &str) {
        self.0.split_once('=').unwrap_or((&self.0, ""))
    }
}

impl fmt::Display for Caveat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Caveat {
    fn from(raw: &str) -> Self {
        Self::from_raw(raw)
    }
}

impl From<String> for Caveat {
    fn from(raw: String) -> Self {
        Self::from_raw(raw)
    }
}
