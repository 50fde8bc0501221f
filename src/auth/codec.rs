//! Token wire format
//!
//! Binary layout (version 2):
//!
//! ```text
//! 0x02
//! [LOCATION]? IDENTIFIER EOS          header
//! ( IDENTIFIER EOS )*                 one section per caveat
//! EOS                                 end of caveats
//! SIGNATURE                           32 bytes
//! ```
//!
//! Each field is `tag, varint(len), bytes`; varints are unsigned LEB128. The
//! binary form travels as unpadded base64url so it can sit in a bearer header.

use crate::auth::macaroon::{TokenError, SIGNATURE_LEN};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

/// Current (and only) wire version
pub const VERSION: u8 = 2;

const FIELD_EOS: u8 = 0;
const FIELD_LOCATION: u8 = 1;
const FIELD_IDENTIFIER: u8 = 2;
const FIELD_VID: u8 = 4;
const FIELD_SIGNATURE: u8 = 6;

/// Decoded token fields, before any signature check
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Fields {
    pub location: String,
    pub identifier: Vec<u8>,
    pub caveats: Vec<String>,
    pub signature: [u8; SIGNATURE_LEN],
}

pub(crate) fn encode(fields: &Fields) -> Vec<u8> {
    let mut out = Vec::with_capacity(
        64 + fields.identifier.len() + fields.caveats.iter().map(|c| c.len() + 4).sum::<usize>(),
    );

    out.push(VERSION);

    if !fields.location.is_empty() {
        put_field(&mut out, FIELD_LOCATION, fields.location.as_bytes());
    }
    put_field(&mut out, FIELD_IDENTIFIER, &fields.identifier);
    out.push(FIELD_EOS);

    for caveat in &fields.caveats {
        put_field(&mut out, FIELD_IDENTIFIER, caveat.as_bytes());
        out.push(FIELD_EOS);
    }
    out.push(FIELD_EOS);

    put_field(&mut out, FIELD_SIGNATURE, &fields.signature);
    out
}

pub(crate) fn decode(data: &[u8]) -> Result<Fields, TokenError> {
    let mut reader = Reader { data, pos: 0 };

    let version = reader.byte()?;
    if version != VERSION {
        return Err(TokenError::UnsupportedVersion(version));
    }

    // Header
    let mut tag = reader.byte()?;
    let mut location = String::new();
    if tag == FIELD_LOCATION {
        location = utf8(reader.field_data()?, "location")?;
        tag = reader.byte()?;
    }
    if tag != FIELD_IDENTIFIER {
        return Err(TokenError::UnexpectedField { tag, offset: reader.pos - 1 });
    }
    let identifier = reader.field_data()?.to_vec();
    reader.expect_eos()?;

    // Caveat sections until the closing EOS
    let mut caveats = Vec::new();
    loop {
        match reader.byte()? {
            FIELD_EOS => break,
            FIELD_IDENTIFIER => {
                caveats.push(utf8(reader.field_data()?, "caveat")?);
                reader.expect_eos()?;
            }
            FIELD_LOCATION | FIELD_VID => return Err(TokenError::ThirdPartyCaveat),
            tag => return Err(TokenError::UnexpectedField { tag, offset: reader.pos - 1 }),
        }
    }

    let tag = reader.byte()?;
    if tag != FIELD_SIGNATURE {
        return Err(TokenError::UnexpectedField { tag, offset: reader.pos - 1 });
    }
    let sig = reader.field_data()?;
    let signature: [u8; SIGNATURE_LEN] = sig
        .try_into()
        .map_err(|_| TokenError::SignatureLength(sig.len()))?;

    if reader.pos != data.len() {
        return Err(TokenError::TrailingBytes(data.len() - reader.pos));
    }

    Ok(Fields {
        location,
        identifier,
        caveats,
        signature,
    })
}

/// Binary -> bearer-safe text
pub fn to_text(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Bearer text -> binary; also accepts padding and the standard alphabet
pub fn from_text(text: &str) -> Result<Vec<u8>, TokenError> {
    let normalized: String = text
        .trim()
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            c => c,
        })
        .collect();

    if normalized.is_empty() {
        return Err(TokenError::Empty);
    }

    URL_SAFE_NO_PAD
        .decode(normalized.as_bytes())
        .map_err(|e| TokenError::DecodeError(e.to_string()))
}

fn put_field(out: &mut Vec<u8>, tag: u8, data: &[u8]) {
    out.push(tag);
    put_varint(out, data.len() as u64);
    out.extend_from_slice(data);
}

fn put_varint(out: &mut Vec<u8>, mut n: u64) {
    while n >= 0x80 {
        out.push((n as u8) | 0x80);
        n >>= 7;
    }
    out.push(n as u8);
}

fn utf8(data: &[u8], what: &'static str) -> Result<String, TokenError> {
    String::from_utf8(data.to_vec()).map_err(|_| TokenError::InvalidUtf8(what))
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn byte(&mut self) -> Result<u8, TokenError> {
        let b = *self.data.get(self.pos).ok_or(TokenError::Truncated)?;
        self.pos += 1;
        Ok(b)
    }

    fn expect_eos(&mut self) -> Result<(), TokenError> {
        match self.byte()? {
            FIELD_EOS => Ok(()),
            FIELD_LOCATION | FIELD_VID => Err(TokenError::ThirdPartyCaveat),
            tag => Err(TokenError::UnexpectedField { tag, offset: self.pos - 1 }),
        }
    }

    /// Minimal-length LEB128; overlong encodings are rejected so every
    /// accepted token re-encodes to the same bytes
    fn varint(&mut self) -> Result<u64, TokenError> {
        let mut n: u64 = 0;
        for i in 0..10 {
            let b = self.byte()?;
            if i == 9 && b > 1 {
                return Err(TokenError::InvalidVarint);
            }
            n |= u64::from(b & 0x7f) << (7 * i);
            if b & 0x80 == 0 {
                if i > 0 && b == 0 {
                    return Err(TokenError::InvalidVarint);
                }
                return Ok(n);
            }
        }
        Err(TokenError::InvalidVarint)
    }

    fn field_data(&mut self) -> Result<&'a [u8], TokenError> {
        let len = usize::try_from(self.varint()?).map_err(|_| TokenError::Truncated)?;
        let end = self.pos.checked_add(len).ok_or(TokenError::Truncated)?;
        let data = self.data.get(self.pos..end).ok_or(TokenError::Truncated)?;
        self.pos = end;
        Ok(data)
    }
}
