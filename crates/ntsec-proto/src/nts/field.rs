// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Typed NTS extension fields (RFC 8915 §5).

use byteorder::{BigEndian, ByteOrder};

use super::{NTS_AUTHENTICATOR, NTS_COOKIE, NTS_COOKIE_PLACEHOLDER, UNIQUE_IDENTIFIER};
use crate::error::ParseError;
use crate::extension::{ExtensionField, ExtensionFieldRef, padded_len};

/// The body of an NTS Authenticator and Encrypted Extension Fields field.
///
/// ```text
/// +-------------------------------+-------------------------------+
/// |         Nonce Length          |      Ciphertext Length        |
/// +-------------------------------+-------------------------------+
/// .            Nonce (padded to a multiple of 4 bytes)            .
/// +---------------------------------------------------------------+
/// .          Ciphertext (padded to a multiple of 4 bytes)         .
/// +---------------------------------------------------------------+
/// ```
///
/// The ciphertext is the AES-SIV output, so it starts with the 16-byte SIV.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Authenticator {
    /// The S2V nonce.
    pub nonce: Vec<u8>,
    /// `SIV || ciphertext` of the encrypted extension fields.
    pub ciphertext: Vec<u8>,
}

impl Authenticator {
    /// Parse the field body.
    pub fn parse(body: &[u8]) -> Result<Self, ParseError> {
        if body.len() < 4 {
            return Err(ParseError::BufferTooShort {
                needed: 4,
                available: body.len(),
            });
        }
        let nonce_len = BigEndian::read_u16(&body[0..2]) as usize;
        let ct_len = BigEndian::read_u16(&body[2..4]) as usize;

        let nonce_start = 4;
        let ct_start = nonce_start + padded_len(nonce_len);
        let needed = ct_start + ct_len;
        if body.len() < needed {
            return Err(ParseError::BufferTooShort {
                needed,
                available: body.len(),
            });
        }

        Ok(Authenticator {
            nonce: body[nonce_start..nonce_start + nonce_len].to_vec(),
            ciphertext: body[ct_start..needed].to_vec(),
        })
    }

    /// Encode the field body with both parts zero-padded.
    pub fn to_body(&self) -> Result<Vec<u8>, ParseError> {
        let nonce_len = u16::try_from(self.nonce.len()).map_err(|_| {
            ParseError::ExtensionTooLarge {
                length: self.nonce.len(),
            }
        })?;
        let ct_len = u16::try_from(self.ciphertext.len()).map_err(|_| {
            ParseError::ExtensionTooLarge {
                length: self.ciphertext.len(),
            }
        })?;

        let mut body = Vec::with_capacity(
            4 + padded_len(self.nonce.len()) + padded_len(self.ciphertext.len()),
        );
        body.extend_from_slice(&nonce_len.to_be_bytes());
        body.extend_from_slice(&ct_len.to_be_bytes());
        body.extend_from_slice(&self.nonce);
        body.resize(4 + padded_len(self.nonce.len()), 0);
        body.extend_from_slice(&self.ciphertext);
        body.resize(body.len() + padded_len(self.ciphertext.len()) - self.ciphertext.len(), 0);
        Ok(body)
    }
}

/// An extension field classified by its NTS meaning.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NtsField {
    /// Unique Identifier (0x0104): client-chosen correlation token echoed by the server.
    UniqueIdentifier(Vec<u8>),
    /// NTS Cookie (0x0204): opaque to the client.
    Cookie(Vec<u8>),
    /// NTS Cookie Placeholder (0x0304): asks for one more cookie; the body is padding
    /// whose length should match a cookie.
    CookiePlaceholder {
        /// Body length in bytes.
        len: usize,
    },
    /// NTS Authenticator and Encrypted Extension Fields (0x0404).
    Authenticator(Authenticator),
    /// Any other field type, passed through untouched.
    Unknown(ExtensionField),
}

impl NtsField {
    /// Classify a framed field by type code.
    pub fn from_ref(field: &ExtensionFieldRef<'_>) -> Result<Self, ParseError> {
        Ok(match field.field_type {
            UNIQUE_IDENTIFIER => NtsField::UniqueIdentifier(field.body.to_vec()),
            NTS_COOKIE => NtsField::Cookie(field.body.to_vec()),
            NTS_COOKIE_PLACEHOLDER => NtsField::CookiePlaceholder {
                len: field.body.len(),
            },
            NTS_AUTHENTICATOR => NtsField::Authenticator(Authenticator::parse(field.body)?),
            _ => NtsField::Unknown(ExtensionField::from(*field)),
        })
    }

    /// The type code written on the wire.
    pub fn field_type(&self) -> u16 {
        match self {
            NtsField::UniqueIdentifier(_) => UNIQUE_IDENTIFIER,
            NtsField::Cookie(_) => NTS_COOKIE,
            NtsField::CookiePlaceholder { .. } => NTS_COOKIE_PLACEHOLDER,
            NtsField::Authenticator(_) => NTS_AUTHENTICATOR,
            NtsField::Unknown(field) => field.field_type,
        }
    }

    /// Convert into a generic framed field.
    pub fn to_extension(&self) -> Result<ExtensionField, ParseError> {
        let body = match self {
            NtsField::UniqueIdentifier(uid) => uid.clone(),
            NtsField::Cookie(cookie) => cookie.clone(),
            NtsField::CookiePlaceholder { len } => vec![0u8; *len],
            NtsField::Authenticator(auth) => auth.to_body()?,
            NtsField::Unknown(field) => return Ok(field.clone()),
        };
        Ok(ExtensionField::new(self.field_type(), body))
    }

    /// Append the padded wire form to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), ParseError> {
        self.to_extension()?.encode_into(out)
    }
}
