//! Caveat predicates
//!
//! A predicate claims caveat keys and judges their values against the request
//! being authorized. The verifier walks caveats in token order and asks the
//! registered predicates, in registration order, about each one.

use crate::auth::caveat::{EXPIRES_AT, VALID_METHODS};
use crate::auth::verifier::Denial;
use chrono::{DateTime, NaiveDateTime, Utc};

/// Live facts about the request being authorized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub current_time: DateTime<Utc>,
    pub operation: String,
}

impl RequestContext {
    pub fn new(operation: impl Into<String>, current_time: DateTime<Utc>) -> Self {
        Self {
            current_time,
            operation: operation.into(),
        }
    }

    /// Context for `operation` at the current wall-clock time
    pub fn now(operation: impl Into<String>) -> Self {
        Self::new(operation, Utc::now())
    }
}

/// A check for one family of caveats
pub trait Predicate: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Whether this predicate is responsible for caveats with `key`
    fn recognizes(&self, key: &str) -> bool;

    /// Judge a recognized caveat's value
    fn check(&self, ctx: &RequestContext, value: &str) -> Result<(), Denial>;
}

/// Parse an `expires_at` value.
///
/// Accepts RFC 3339 with an offset, or a naive ISO-8601 date-time taken as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// `expires_at=<timestamp>`: satisfied while `current_time <= timestamp`
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpiryPredicate;

impl Predicate for ExpiryPredicate {
    fn name(&self) -> &str {
        "expiry"
    }

    fn recognizes(&self, key: &str) -> bool {
        key == EXPIRES_AT
    }

    fn check(&self, ctx: &RequestContext, value: &str) -> Result<(), Denial> {
        let expires_at = parse_timestamp(value).ok_or_else(|| Denial::MalformedCaveat {
            key: EXPIRES_AT.to_string(),
            value: value.to_string(),
        })?;

        if ctx.current_time > expires_at {
            return Err(Denial::Expired {
                expires_at,
                current_time: ctx.current_time,
            });
        }

        Ok(())
    }
}

/// `valid_methods=<op>,<op>,...`: satisfied if the requested operation is listed
#[derive(Debug, Clone, Copy, Default)]
pub struct MethodsPredicate;

impl Predicate for MethodsPredicate {
    fn name(&self) -> &str {
        "methods"
    }

    fn recognizes(&self, key: &str) -> bool {
        key == VALID_METHODS
    }

    fn check(&self, ctx: &RequestContext, value: &str) -> Result<(), Denial> {
        let allowed: Vec<&str> = value
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .collect();

        if allowed.contains(&ctx.operation.as_str()) {
            return Ok(());
        }

        Err(Denial::MethodNotAllowed {
            operation: ctx.operation.clone(),
            allowed: allowed.into_iter().map(String::from).collect(),
        })
    }
}
