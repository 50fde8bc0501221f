//! Macaroon token model and signature chain
//!
//! ```text
//! sig[0] = HMAC-SHA256(root_key, identifier)
//! sig[i] = HMAC-SHA256(sig[i-1], caveats[i-1])
//! ```
//!
//! Appending a caveat only needs the current signature, so any holder can
//! attenuate a token. Removing or reordering caveats needs the root key.

use crate::auth::caveat::Caveat;
use crate::auth::codec::{self, Fields};
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::Serialize;
use sha2::Sha256;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

type HmacSha256 = Hmac<Sha256>;

/// Length of an HMAC-SHA256 tag
pub const SIGNATURE_LEN: usize = 32;

/// Token parse errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("empty token")]
    Empty,

    #[error("token decode error: {0}")]
    DecodeError(String),

    #[error("unsupported token version {0}")]
    UnsupportedVersion(u8),

    #[error("unexpected field tag {tag} at offset {offset}")]
    UnexpectedField { tag: u8, offset: usize },

    #[error("token truncated")]
    Truncated,

    #[error("{0} trailing bytes after signature")]
    TrailingBytes(usize),

    #[error("invalid varint")]
    InvalidVarint,

    #[error("{0} is not valid UTF-8")]
    InvalidUtf8(&'static str),

    #[error("third-party caveats are not supported")]
    ThirdPartyCaveat,

    #[error("invalid signature length: expected {SIGNATURE_LEN}, got {0}")]
    SignatureLength(usize),
}

const ROOT_KEY_LEN: usize = 32;

/// Secret seed of a token's signature chain
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct RootKey([u8; ROOT_KEY_LEN]);

impl RootKey {
    pub const LEN: usize = ROOT_KEY_LEN;

    /// Generate a fresh random root key
    pub fn generate() -> Self {
        let mut bytes = [0u8; Self::LEN];
        rand::rng().fill(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    /// `None` unless `bytes` is exactly [`RootKey::LEN`] long
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for RootKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RootKey([REDACTED])")
    }
}

fn keyed(key: &[u8]) -> HmacSha256 {
    HmacSha256::new_from_slice(key).expect("HMAC can take key of any size")
}

/// Run the chain up to, but not including, finalizing the last step
fn final_step(root_key: &[u8], identifier: &[u8], caveats: &[Caveat]) -> HmacSha256 {
    let mut mac = keyed(root_key);
    mac.update(identifier);

    for caveat in caveats {
        let sig = mac.finalize().into_bytes();
        mac = keyed(&sig);
        mac.update(caveat.as_bytes());
    }

    mac
}

/// Compute the signature for `(root_key, identifier, caveats)`
pub fn compute_signature(root_key: &RootKey, identifier: &[u8], caveats: &[Caveat]) -> [u8; SIGNATURE_LEN] {
    final_step(root_key.as_bytes(), identifier, caveats)
        .finalize()
        .into_bytes()
        .into()
}

/// A first-party macaroon
#[derive(Clone, PartialEq, Eq)]
pub struct Macaroon {
    location: String,
    identifier: Vec<u8>,
    caveats: Vec<Caveat>,
    signature: [u8; SIGNATURE_LEN],
}

impl Macaroon {
    /// Create a caveat-free macaroon signed by `root_key`
    pub fn new(root_key: &RootKey, identifier: Vec<u8>, location: impl Into<String>) -> Self {
        let signature = compute_signature(root_key, &identifier, &[]);
        Self {
            location: location.into(),
            identifier,
            caveats: Vec::new(),
            signature,
        }
    }

    /// Append a caveat, chaining the signature forward. Needs no root key.
    pub fn add_first_party_caveat(&mut self, caveat: Caveat) {
        let mut mac = keyed(&self.signature);
        mac.update(caveat.as_bytes());
        self.signature = mac.finalize().into_bytes().into();
        self.caveats.push(caveat);
    }

    /// Builder form of [`Macaroon::add_first_party_caveat`]
    pub fn with_caveat(mut self, caveat: Caveat) -> Self {
        self.add_first_party_caveat(caveat);
        self
    }

    /// Recompute the chain from `root_key` and compare in constant time
    pub fn verify_signature(&self, root_key: &RootKey) -> bool {
        final_step(root_key.as_bytes(), &self.identifier, &self.caveats)
            .verify_slice(&self.signature)
            .is_ok()
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn identifier(&self) -> &[u8] {
        &self.identifier
    }

    pub fn caveats(&self) -> &[Caveat] {
        &self.caveats
    }

    pub fn signature(&self) -> &[u8; SIGNATURE_LEN] {
        &self.signature
    }

    /// Binary wire form
    pub fn to_bytes(&self) -> Vec<u8> {
        codec::encode(&Fields {
            location: self.location.clone(),
            identifier: self.identifier.clone(),
            caveats: self.caveats.iter().map(|c| c.as_str().to_string()).collect(),
            signature: self.signature,
        })
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, TokenError> {
        let fields = codec::decode(data)?;
        Ok(Self {
            location: fields.location,
            identifier: fields.identifier,
            caveats: fields.caveats.into_iter().map(Caveat::from_raw).collect(),
            signature: fields.signature,
        })
    }

    /// Bearer-safe text form
    pub fn serialize(&self) -> String {
        codec::to_text(&self.to_bytes())
    }

    pub fn deserialize(token: &str) -> Result<Self, TokenError> {
        Self::from_bytes(&codec::from_text(token)?)
    }

    /// Human-readable view of the token fields
    pub fn inspect(&self) -> TokenSummary {
        TokenSummary {
            version: codec::VERSION,
            location: self.location.clone(),
            identifier: hex::encode(&self.identifier),
            caveats: self.caveats.iter().map(|c| c.as_str().to_string()).collect(),
            signature: hex::encode(self.signature),
        }
    }
}

impl fmt::Debug for Macaroon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The signature is what makes the token usable, keep it out of logs
        f.debug_struct("Macaroon")
            .field("location", &self.location)
            .field("identifier", &hex::encode(&self.identifier))
            .field("caveats", &self.caveats)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Macaroon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.serialize())
    }
}

impl FromStr for Macaroon {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::deserialize(s)
    }
}

/// Decoded token fields for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenSummary {
    pub version: u8,
    pub location: String,
    pub identifier: String,
    pub caveats: Vec<String>,
    pub signature: String,
}

/// Append caveats to a serialized token without contacting the issuer
pub fn attenuate<I>(token: &str, caveats: I) -> Result<String, TokenError>
where
    I: IntoIterator<Item = Caveat>,
{
    let mut macaroon = Macaroon::deserialize(token)?;
    for caveat in caveats {
        macaroon.add_first_party_caveat(caveat);
    }
    Ok(macaroon.serialize())
}
