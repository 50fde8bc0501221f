//! Token verification
//!
//! Order of checks, each one stopping at the first failure:
//! 1. decode the token (`MalformedToken`)
//! 2. look up the root key (`UnknownToken`)
//! 3. recompute the signature chain (`SignatureInvalid`); caveats of a forged
//!    token are never looked at
//! 4. evaluate caveats in token order against the predicate set

use crate::auth::caveat::Caveat;
use crate::auth::macaroon::Macaroon;
use crate::auth::predicates::{ExpiryPredicate, MethodsPredicate, Predicate, RequestContext};
use crate::storage::{RootKeyStore, StorageError};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Why a token was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Denial {
    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("unknown token")]
    UnknownToken,

    #[error("invalid token signature")]
    SignatureInvalid,

    #[error("token expired at {expires_at}, current time is {current_time}")]
    Expired {
        expires_at: DateTime<Utc>,
        current_time: DateTime<Utc>,
    },

    #[error("operation '{operation}' not allowed, token permits [{}]", .allowed.join(", "))]
    MethodNotAllowed { operation: String, allowed: Vec<String> },

    #[error("malformed caveat value for '{key}': {value}")]
    MalformedCaveat { key: String, value: String },

    #[error("unrecognized caveat '{key}'")]
    UnrecognizedCaveat { key: String },
}

impl Denial {
    /// True for failures that say something about the credential itself
    /// rather than about the request
    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            Denial::MalformedToken(_) | Denial::UnknownToken | Denial::SignatureInvalid
        )
    }

    /// Message safe to return to the presenter of the token.
    ///
    /// Unknown and forged tokens share one message so callers cannot probe
    /// which identifiers exist.
    pub fn public_message(&self) -> String {
        if self.is_credential_failure() {
            "unauthorized".to_string()
        } else {
            self.to_string()
        }
    }
}

/// Outcome of an authorization check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied(Denial),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }

    pub fn denial(&self) -> Option<&Denial> {
        match self {
            Decision::Allowed => None,
            Decision::Denied(d) => Some(d),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Allowed => write!(f, "allowed"),
            Decision::Denied(d) => write!(f, "denied: {}", d),
        }
    }
}

/// What to do with a caveat no registered predicate recognizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownCaveatPolicy {
    /// Treat it as satisfied. Such caveats change the signature but restrict
    /// nothing, so they must not be relied on for access control.
    #[default]
    PassThrough,
    /// Refuse the token
    Deny,
}

/// Operational failures. Authorization outcomes are [`Decision`]s, never this.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("root key lookup failed: {0}")]
    Store(#[source] StorageError),
}

/// Checks tokens against the root key store and a predicate set
pub struct Verifier {
    store: Arc<dyn RootKeyStore>,
    predicates: Vec<Box<dyn Predicate>>,
    unknown_caveats: UnknownCaveatPolicy,
}

impl Verifier {
    /// A verifier with no predicates; add some before use
    pub fn new(store: Arc<dyn RootKeyStore>) -> Self {
        Self {
            store,
            predicates: Vec::new(),
            unknown_caveats: UnknownCaveatPolicy::default(),
        }
    }

    /// Register expiry then allowed-methods
    pub fn with_standard_predicates(self) -> Self {
        self.with_predicate(ExpiryPredicate).with_predicate(MethodsPredicate)
    }

    /// Register a predicate after those already present
    pub fn with_predicate(mut self, predicate: impl Predicate + 'static) -> Self {
        self.predicates.push(Box::new(predicate));
        self
    }

    pub fn unknown_caveats(mut self, policy: UnknownCaveatPolicy) -> Self {
        self.unknown_caveats = policy;
        self
    }

    /// Verify a serialized token for the request described by `ctx`
    pub fn verify(&self, ctx: &RequestContext, token: &str) -> Result<Decision, VerifyError> {
        let macaroon = match Macaroon::deserialize(token) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "Rejected malformed token");
                return Ok(Decision::Denied(Denial::MalformedToken(e.to_string())));
            }
        };

        self.verify_macaroon(ctx, &macaroon)
    }

    /// Verify an already decoded token
    pub fn verify_macaroon(&self, ctx: &RequestContext, macaroon: &Macaroon) -> Result<Decision, VerifyError> {
        let identifier = hex::encode(macaroon.identifier());

        let root_key = match self.store.get(macaroon.identifier()) {
            Ok(key) => key,
            Err(StorageError::NotFound(_)) => {
                warn!(identifier = %identifier, "Rejected token with unknown identifier");
                return Ok(Decision::Denied(Denial::UnknownToken));
            }
            Err(e) => {
                error!(identifier = %identifier, error = %e, "Root key lookup failed");
                return Err(VerifyError::Store(e));
            }
        };

        if !macaroon.verify_signature(&root_key) {
            warn!(identifier = %identifier, "Rejected token with invalid signature");
            return Ok(Decision::Denied(Denial::SignatureInvalid));
        }

        for caveat in macaroon.caveats() {
            if let Err(denial) = self.check_caveat(ctx, caveat) {
                warn!(
                    identifier = %identifier,
                    operation = %ctx.operation,
                    reason = %denial,
                    "Token denied by caveat"
                );
                return Ok(Decision::Denied(denial));
            }
        }

        debug!(identifier = %identifier, operation = %ctx.operation, "Token allowed");
        Ok(Decision::Allowed)
    }

    /// Any recognizing predicate that accepts satisfies the caveat; if every
    /// recognizing predicate rejects, the first rejection is reported
    fn check_caveat(&self, ctx: &RequestContext, caveat: &Caveat) -> Result<(), Denial> {
        let key = caveat.key();
        let mut first_denial = None;

        for predicate in self.predicates.iter().filter(|p| p.recognizes(key)) {
            match predicate.check(ctx, caveat.value()) {
                Ok(()) => {
                    debug!(predicate = predicate.name(), caveat = %caveat, "Caveat satisfied");
                    return Ok(());
                }
                Err(denial) => {
                    debug!(predicate = predicate.name(), caveat = %caveat, reason = %denial, "Caveat rejected");
                    first_denial.get_or_insert(denial);
                }
            }
        }

        match first_denial {
            Some(denial) => Err(denial),
            None => match self.unknown_caveats {
                UnknownCaveatPolicy::PassThrough => {
                    debug!(caveat = %caveat, "No predicate recognizes caveat, passing through");
                    Ok(())
                }
                UnknownCaveatPolicy::Deny => Err(Denial::UnrecognizedCaveat { key: key.to_string() }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::macaroon::RootKey;
    use crate::storage::MemoryStore;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
    }

    fn setup(caveats: &[&str]) -> (Arc<MemoryStore>, RootKey, Macaroon) {
        let store = Arc::new(MemoryStore::new());
        let key = RootKey::generate();
        store.put(b"tok", &key).unwrap();

        let mut m = Macaroon::new(&key, b"tok".to_vec(), "test");
        for c in caveats {
            m.add_first_party_caveat(Caveat::from_raw(*c));
        }
        (store, key, m)
    }

    fn verify(store: Arc<MemoryStore>, m: &Macaroon, op: &str) -> Decision {
        Verifier::new(store)
            .with_standard_predicates()
            .verify(&RequestContext::new(op, now()), &m.serialize())
            .unwrap()
    }

    #[test]
    fn test_no_caveats_allows_everything() {
        let (store, _, m) = setup(&[]);
        assert_eq!(verify(store, &m, "anything"), Decision::Allowed);
    }

    #[test]
    fn test_malformed() {
        let (store, _, _) = setup(&[]);
        let verifier = Verifier::new(store).with_standard_predicates();
        let decision = verifier.verify(&RequestContext::new("create", now()), "%%%").unwrap();
        assert!(matches!(decision, Decision::Denied(Denial::MalformedToken(_))));
    }

    #[test]
    fn test_unknown_identifier() {
        let (store, _, _) = setup(&[]);
        let stranger = Macaroon::new(&RootKey::generate(), b"other".to_vec(), "");
        assert_eq!(verify(store, &stranger, "create"), Decision::Denied(Denial::UnknownToken));
    }

    #[test]
    fn test_wrong_key_is_signature_invalid() {
        let (store, _, _) = setup(&[]);
        let forged = Macaroon::new(&RootKey::generate(), b"tok".to_vec(), "");
        assert_eq!(verify(store, &forged, "create"), Decision::Denied(Denial::SignatureInvalid));
    }

    #[test]
    fn test_forged_token_caveats_are_not_evaluated() {
        let (store, _, _) = setup(&[]);
        // Would be Expired if caveats were looked at
        let forged = Macaroon::new(&RootKey::generate(), b"tok".to_vec(), "")
            .with_caveat(Caveat::from_raw("expires_at=2000-01-01T00:00:00Z"));
        assert_eq!(verify(store, &forged, "create"), Decision::Denied(Denial::SignatureInvalid));
    }

    #[test]
    fn test_first_failing_caveat_wins() {
        let (store, _, m) = setup(&["valid_methods=create", "expires_at=2000-01-01T00:00:00Z"]);
        assert!(matches!(
            verify(store, &m, "close"),
            Decision::Denied(Denial::MethodNotAllowed { .. })
        ));
    }

    #[test]
    fn test_expired() {
        let expiry = now() - Duration::seconds(1);
        let caveat = Caveat::expires_at(expiry);
        let (store, _, m) = setup(&[caveat.as_str()]);

        match verify(store, &m, "create") {
            Decision::Denied(Denial::Expired { expires_at, current_time }) => {
                assert_eq!(expires_at, expiry);
                assert_eq!(current_time, now());
            }
            other => panic!("expected Expired, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_caveat_passes_through_by_default() {
        let (store, _, m) = setup(&["color=blue", "valid_methods=create"]);
        assert_eq!(verify(store, &m, "create"), Decision::Allowed);
    }

    #[test]
    fn test_unknown_caveat_deny_policy() {
        let (store, _, m) = setup(&["color=blue"]);
        let decision = Verifier::new(store)
            .with_standard_predicates()
            .unknown_caveats(UnknownCaveatPolicy::Deny)
            .verify(&RequestContext::new("create", now()), &m.serialize())
            .unwrap();
        assert_eq!(
            decision,
            Decision::Denied(Denial::UnrecognizedCaveat { key: "color".to_string() })
        );
    }

    #[test]
    fn test_without_predicates_every_caveat_is_inert() {
        let (store, _, m) = setup(&["valid_methods=create"]);
        let decision = Verifier::new(store)
            .verify(&RequestContext::new("close", now()), &m.serialize())
            .unwrap();
        assert_eq!(decision, Decision::Allowed);
    }

    struct AlwaysOk;

    impl Predicate for AlwaysOk {
        fn name(&self) -> &str {
            "always-ok"
        }

        fn recognizes(&self, key: &str) -> bool {
            key == "valid_methods"
        }

        fn check(&self, _ctx: &RequestContext, _value: &str) -> Result<(), Denial> {
            Ok(())
        }
    }

    #[test]
    fn test_any_recognizing_predicate_may_satisfy() {
        let (store, _, m) = setup(&["valid_methods=create"]);
        let decision = Verifier::new(store)
            .with_standard_predicates()
            .with_predicate(AlwaysOk)
            .verify(&RequestContext::new("close", now()), &m.serialize())
            .unwrap();
        assert_eq!(decision, Decision::Allowed);
    }

    struct BrokenStore;

    impl RootKeyStore for BrokenStore {
        fn put(&self, _: &[u8], _: &RootKey) -> Result<(), StorageError> {
            unreachable!()
        }

        fn put_new(&self, _: &[u8], _: &RootKey) -> Result<bool, StorageError> {
            unreachable!()
        }

        fn get(&self, _: &[u8]) -> Result<RootKey, StorageError> {
            Err(StorageError::Io {
                path: "keys.json".to_string(),
                source: std::io::Error::other("disk on fire"),
            })
        }

        fn len(&self) -> usize {
            0
        }
    }

    #[test]
    fn test_store_failure_is_an_error_not_a_denial() {
        let m = Macaroon::new(&RootKey::generate(), b"tok".to_vec(), "");
        let result = Verifier::new(Arc::new(BrokenStore))
            .with_standard_predicates()
            .verify(&RequestContext::new("create", now()), &m.serialize());
        assert!(matches!(result, Err(VerifyError::Store(_))));
    }

    #[test]
    fn test_public_message_hides_credential_failures() {
        assert_eq!(Denial::UnknownToken.public_message(), "unauthorized");
        assert_eq!(Denial::SignatureInvalid.public_message(), "unauthorized");
        assert_eq!(Denial::MalformedToken("x".into()).public_message(), "unauthorized");

        let denial = Denial::MethodNotAllowed {
            operation: "close".to_string(),
            allowed: vec!["create".to_string(), "solve".to_string()],
        };
        assert_eq!(
            denial.public_message(),
            "operation 'close' not allowed, token permits [create, solve]"
        );
    }
}
