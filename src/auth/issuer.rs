//! Token issuance

use crate::auth::caveat::{Caveat, VALID_METHODS};
use crate::auth::macaroon::{Macaroon, RootKey};
use crate::storage::{RootKeyStore, StorageError};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

/// Identifier length in bytes
pub const IDENTIFIER_LEN: usize = 16;

pub const DEFAULT_LOCATION: &str = "https://example.com";
pub const DEFAULT_TTL_SECS: i64 = 60;
pub const DEFAULT_OPERATIONS: &[&str] = &["create", "solve", "close"];

#[derive(Debug, Error)]
pub enum IssueError {
    #[error("failed to store root key: {0}")]
    Store(#[from] StorageError),

    #[error("identifier collision: {0}")]
    IdentifierCollision(String),

    #[error("invalid constraint key: {0:?}")]
    InvalidConstraint(String),
}

/// Issuer settings
#[derive(Debug, Clone)]
pub struct IssuerConfig {
    /// Advisory location written into every token
    pub location: String,
    /// Lifetime used when a request gives no expiry; `None` issues non-expiring tokens
    pub default_ttl: Option<Duration>,
    /// Operations allowed when a request names none; empty means no restriction
    pub default_operations: Vec<String>,
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            location: DEFAULT_LOCATION.to_string(),
            default_ttl: Some(Duration::seconds(DEFAULT_TTL_SECS)),
            default_operations: DEFAULT_OPERATIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Mints tokens and registers their root keys
pub struct Issuer {
    store: Arc<dyn RootKeyStore>,
    config: IssuerConfig,
}

impl Issuer {
    pub fn new(store: Arc<dyn RootKeyStore>, config: IssuerConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &IssuerConfig {
        &self.config
    }

    /// Mint a token carrying `constraints` as caveats, in order.
    ///
    /// Values are not interpreted here. Keys must be non-empty and free of
    /// `=`, otherwise the caveat would read back under a different key.
    pub fn mint<K, V>(&self, constraints: &[(K, V)]) -> Result<String, IssueError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let caveats = constraints
            .iter()
            .map(|(k, v)| {
                let key = k.as_ref();
                if key.is_empty() || key.contains('=') {
                    return Err(IssueError::InvalidConstraint(key.to_string()));
                }
                Ok(Caveat::new(key, v.as_ref()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(self.mint_macaroon(caveats)?.serialize())
    }

    /// Mint a token and return it undecoded
    pub fn mint_macaroon<I>(&self, caveats: I) -> Result<Macaroon, IssueError>
    where
        I: IntoIterator<Item = Caveat>,
    {
        let mut identifier = vec![0u8; IDENTIFIER_LEN];
        rand::rng().fill(identifier.as_mut_slice());
        let root_key = RootKey::generate();
        let id_hex = hex::encode(&identifier);

        // The key must be durable before anyone holds a token naming it
        match self.store.put_new(&identifier, &root_key) {
            Ok(true) => {}
            Ok(false) => {
                error!(identifier = %id_hex, "Freshly generated identifier already in store");
                return Err(IssueError::IdentifierCollision(id_hex));
            }
            Err(e) => {
                error!(identifier = %id_hex, error = %e, "Failed to register root key");
                return Err(e.into());
            }
        }

        let mut macaroon = Macaroon::new(&root_key, identifier, self.config.location.clone());
        for caveat in caveats {
            macaroon.add_first_party_caveat(caveat);
        }

        info!(identifier = %id_hex, caveats = macaroon.caveats().len(), "Minted token");

        Ok(macaroon)
    }

    /// Issue a token with an expiry and allowed-operation list, falling back to
    /// the configured defaults for whichever is missing
    pub fn issue_token(
        &self,
        expires_at: Option<DateTime<Utc>>,
        allowed_operations: Option<&str>,
    ) -> Result<String, IssueError> {
        self.issue_token_at(expires_at, allowed_operations, Utc::now())
    }

    /// [`Issuer::issue_token`] with an explicit notion of "now"
    pub fn issue_token_at(
        &self,
        expires_at: Option<DateTime<Utc>>,
        allowed_operations: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<String, IssueError> {
        let mut caveats = Vec::with_capacity(2);

        if let Some(at) = expires_at.or_else(|| self.config.default_ttl.map(|ttl| now + ttl)) {
            caveats.push(Caveat::expires_at(at));
        }

        match allowed_operations {
            Some(ops) => caveats.push(Caveat::new(VALID_METHODS, ops)),
            None if !self.config.default_operations.is_empty() => {
                caveats.push(Caveat::valid_methods(self.config.default_operations.as_slice()))
            }
            None => {}
        }

        Ok(self.mint_macaroon(caveats)?.serialize())
    }
}
