//! Issue/authorize facade for request handlers
//!
//! Handlers only need two calls: [`TokenService::issue_token`] when a client
//! asks for a credential and [`TokenService::authorize`] in front of every
//! protected operation.

use crate::auth::issuer::{IssueError, Issuer, IssuerConfig};
use crate::auth::predicates::RequestContext;
use crate::auth::verifier::{Decision, UnknownCaveatPolicy, Verifier, VerifyError};
use crate::storage::RootKeyStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// An issuer and a verifier sharing one root key store
pub struct TokenService {
    issuer: Issuer,
    verifier: Verifier,
}

impl TokenService {
    /// Service with the standard expiry and allowed-methods predicates
    pub fn new(store: Arc<dyn RootKeyStore>, config: IssuerConfig) -> Self {
        Self {
            issuer: Issuer::new(store.clone(), config),
            verifier: Verifier::new(store).with_standard_predicates(),
        }
    }

    /// Replace the verifier, e.g. to register extra predicates
    pub fn with_verifier(mut self, verifier: Verifier) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn unknown_caveats(mut self, policy: UnknownCaveatPolicy) -> Self {
        self.verifier = self.verifier.unknown_caveats(policy);
        self
    }

    pub fn issuer(&self) -> &Issuer {
        &self.issuer
    }

    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }

    /// Mint a token restricted to `allowed_operations` until `expires_at`
    pub fn issue_token(
        &self,
        expires_at: Option<DateTime<Utc>>,
        allowed_operations: Option<&str>,
    ) -> Result<String, IssueError> {
        self.issuer.issue_token(expires_at, allowed_operations)
    }

    /// Decide whether `token` may perform `operation` at `current_time`
    pub fn authorize(
        &self,
        token: &str,
        operation: &str,
        current_time: DateTime<Utc>,
    ) -> Result<Decision, VerifyError> {
        self.verifier
            .verify(&RequestContext::new(operation, current_time), token)
    }
}

/// Pull the token out of an `Authorization` header value.
///
/// The `Bearer ` prefix is optional; `None` if nothing is left after it.
pub fn bearer_token(header: &str) -> Option<&str> {
    let header = header.trim();
    let token = match header.get(..6) {
        Some(scheme) if scheme.eq_ignore_ascii_case("bearer") => {
            let rest = &header[6..];
            // `Bearerxyz` is a bare token that happens to start with the scheme name
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                rest.trim()
            } else {
                header
            }
        }
        _ => header,
    };

    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}
