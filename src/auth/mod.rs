//! Macaroon issuance and verification
//!
//! Token lifecycle:
//! - `Issuer` mints a token and registers its root key in a `RootKeyStore`
//! - holders may append caveats (`attenuate`) without the root key
//! - `Verifier` recomputes the signature chain and checks caveats
//!
//! Standard caveats:
//! - `expires_at=<timestamp>`: valid until that instant, inclusive
//! - `valid_methods=<op>,<op>`: only the listed operations

mod caveat;
mod codec;
mod issuer;
mod macaroon;
mod predicates;
mod service;
mod verifier;

pub use caveat::{Caveat, EXPIRES_AT, VALID_METHODS};
pub use codec::VERSION;
pub use issuer::{IssueError, Issuer, IssuerConfig, IDENTIFIER_LEN};
pub use macaroon::{attenuate, compute_signature, Macaroon, RootKey, TokenError, TokenSummary, SIGNATURE_LEN};
pub use predicates::{parse_timestamp, ExpiryPredicate, MethodsPredicate, Predicate, RequestContext};
pub use service::{bearer_token, TokenService};
pub use verifier::{Decision, Denial, UnknownCaveatPolicy, Verifier, VerifyError};

pub mod defaults {
    pub use super::issuer::{DEFAULT_LOCATION, DEFAULT_OPERATIONS, DEFAULT_TTL_SECS};
}
