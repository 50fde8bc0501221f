//! Mintgate - attenuable bearer capability tokens
//!
//! Issues macaroons whose authority is narrowed by an HMAC-chained list of
//! caveats, and verifies them against a durable root key store.

pub mod auth;
pub mod config;
pub mod storage;

pub use auth::{
    attenuate, Caveat, Decision, Denial, IssueError, Issuer, IssuerConfig, Macaroon, Predicate,
    RequestContext, RootKey, TokenError, TokenService, Verifier, VerifyError,
};
pub use config::GateConfig;
pub use storage::{FileStore, MemoryStore, RootKeyStore, StorageError};
