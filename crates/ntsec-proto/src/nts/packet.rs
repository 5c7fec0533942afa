// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Parsing of NTS-protected NTP packets.
//!
//! The walk classifies every extension field after the header. When it meets
//! the first Authenticator field it verifies and decrypts it with the caller's
//! key, using everything before the authenticator as associated data, and
//! splices the decrypted fields into the list right after it. Any
//! authentication failure aborts the whole parse.

use tracing::debug;

use super::MAX_NESTING_DEPTH;
use super::field::{Authenticator, NtsField};
use crate::crypto::AesSivKey;
use crate::error::{NtsError, ParseError};
use crate::extension::iter_extension_fields;
use crate::protocol::{HEADER_LEN, Header, KissCode};

/// How the bytes preceding an authenticator are handed to S2V as associated data.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum AadLayout {
    /// The header and each preceding extension field (as framed on the wire)
    /// are separate S2V strings.
    #[default]
    PerField,
    /// The whole prefix is a single S2V string, as RFC 8915 deployments expect.
    Contiguous,
}

impl AadLayout {
    /// Arrange the prefix into S2V associated-data strings.
    ///
    /// `spans` are the wire slices of the header and each preceding field;
    /// `prefix` is the same bytes as one contiguous slice.
    pub(crate) fn strings<'a>(self, prefix: &'a [u8], spans: &[&'a [u8]]) -> Vec<&'a [u8]> {
        match self {
            AadLayout::PerField => spans.to_vec(),
            AadLayout::Contiguous => vec![prefix],
        }
    }
}

/// How much of a field the authenticator vouches for.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Protection {
    /// Not covered by any verified authenticator.
    Unauthenticated,
    /// Sent in the clear but covered by the associated data of a verified authenticator.
    Authenticated,
    /// Recovered from the ciphertext of a verified authenticator.
    Encrypted,
}

/// One extension field of a parsed packet together with its protection level.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PacketExtension {
    /// The typed field.
    pub field: NtsField,
    /// Whether an authenticator covered it.
    pub protection: Protection,
}

/// Options that control packet parsing.
///
/// Supplying a packet with an authenticator but no key is an error, never
/// a silently unauthenticated result.
#[derive(Clone, Copy, Debug, Default)]
pub struct DecodeOptions<'a> {
    /// Key used to verify and decrypt the authenticator.
    pub key: Option<&'a AesSivKey>,
    /// When set, every Unique Identifier field must equal this value.
    pub expected_unique_id: Option<&'a [u8]>,
    /// Associated data layout for the authenticator.
    pub aad_layout: AadLayout,
}

impl<'a> DecodeOptions<'a> {
    /// Options carrying a verification key.
    pub fn with_key(key: &'a AesSivKey) -> Self {
        DecodeOptions {
            key: Some(key),
            ..DecodeOptions::default()
        }
    }

    /// Require Unique Identifier fields to match `uid`.
    pub fn expect_unique_id(mut self, uid: &'a [u8]) -> Self {
        self.expected_unique_id = Some(uid);
        self
    }

    /// Select the associated data layout.
    pub fn aad_layout(mut self, layout: AadLayout) -> Self {
        self.aad_layout = layout;
        self
    }
}

/// A parsed NTP packet: the header and its extension fields in wire order.
///
/// Decrypted fields appear immediately after the authenticator that carried them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NtpPacket {
    /// The fixed header.
    pub header: Header,
    /// Extension fields, flattened.
    pub extensions: Vec<PacketExtension>,
}

impl NtpPacket {
    /// The first Unique Identifier field, if any.
    pub fn unique_identifier(&self) -> Option<&[u8]> {
        self.extensions.iter().find_map(|ext| match &ext.field {
            NtsField::UniqueIdentifier(uid) => Some(uid.as_slice()),
            _ => None,
        })
    }

    /// Every cookie with at least the given protection.
    pub fn cookies(&self, min: Protection) -> impl Iterator<Item = &[u8]> {
        self.extensions
            .iter()
            .filter(move |ext| ext.protection >= min)
            .filter_map(|ext| match &ext.field {
                NtsField::Cookie(cookie) => Some(cookie.as_slice()),
                _ => None,
            })
    }

    /// Number of cookie placeholder fields.
    pub fn placeholder_count(&self) -> usize {
        self.extensions
            .iter()
            .filter(|ext| matches!(ext.field, NtsField::CookiePlaceholder { .. }))
            .count()
    }

    /// Whether an authenticator was present and verified.
    pub fn is_authenticated(&self) -> bool {
        self.extensions.iter().any(|ext| {
            matches!(ext.field, NtsField::Authenticator(_))
                && ext.protection == Protection::Authenticated
        })
    }

    /// Re-encode the packet.
    ///
    /// Decrypted fields are represented by their authenticator and are not
    /// written again. The result equals the parsed input whenever that input
    /// was canonically padded.
    pub fn encode(&self) -> Result<Vec<u8>, ParseError> {
        let mut out = self.header.encode().to_vec();
        for ext in &self.extensions {
            if ext.protection != Protection::Encrypted {
                ext.field.encode_into(&mut out)?;
            }
        }
        Ok(out)
    }
}

fn check_unique_id(field: &NtsField, opts: &DecodeOptions<'_>) -> Result<(), NtsError> {
    if let (NtsField::UniqueIdentifier(uid), Some(expected)) = (field, opts.expected_unique_id)
        && uid.as_slice() != expected
    {
        debug!(len = uid.len(), "unique identifier mismatch");
        return Err(NtsError::UnexpectedUniqueId);
    }
    Ok(())
}

fn open(
    key: &AesSivKey,
    auth: &Authenticator,
    aad: &[&[u8]],
) -> Result<Vec<u8>, NtsError> {
    key.decrypt(aad, &auth.nonce, &auth.ciphertext)
        .map_err(|e| {
            debug!(error = %e, "authenticator verification failed");
            NtsError::Crypto(e)
        })
}

// Decrypted plaintext: extension fields with no header in front.
fn parse_nested(
    data: &[u8],
    depth: usize,
    opts: &DecodeOptions<'_>,
    out: &mut Vec<PacketExtension>,
) -> Result<(), NtsError> {
    for item in iter_extension_fields(data) {
        let field = NtsField::from_ref(&item?)?;
        if matches!(field, NtsField::Authenticator(_)) && depth >= MAX_NESTING_DEPTH {
            return Err(ParseError::ExtensionNestingTooDeep {
                limit: MAX_NESTING_DEPTH,
            }
            .into());
        }
        check_unique_id(&field, opts)?;
        out.push(PacketExtension {
            field,
            protection: Protection::Encrypted,
        });
    }
    Ok(())
}

fn walk(buf: &[u8], opts: &DecodeOptions<'_>, verify: bool) -> Result<NtpPacket, NtsError> {
    let header = Header::decode(buf)?;
    let mut extensions: Vec<PacketExtension> = Vec::new();
    let mut spans: Vec<&[u8]> = vec![&buf[..HEADER_LEN]];
    let mut sealed = false;

    for item in iter_extension_fields(&buf[HEADER_LEN..]) {
        let item = item?;
        let field = NtsField::from_ref(&item)?;
        check_unique_id(&field, opts)?;

        match field {
            NtsField::Authenticator(auth) if verify && !sealed => {
                let key = opts.key.ok_or(NtsError::MissingKey)?;
                let prefix = &buf[..HEADER_LEN + item.offset];
                let aad = opts.aad_layout.strings(prefix, &spans);
                let plaintext = open(key, &auth, &aad)?;

                for ext in &mut extensions {
                    ext.protection = Protection::Authenticated;
                }
                extensions.push(PacketExtension {
                    field: NtsField::Authenticator(auth),
                    protection: Protection::Authenticated,
                });
                parse_nested(&plaintext, 1, opts, &mut extensions)?;
                sealed = true;
            }
            field => {
                if sealed {
                    debug!(
                        field_type = field.field_type(),
                        "extension field after authenticator is not covered"
                    );
                }
                spans.push(item.wire);
                extensions.push(PacketExtension {
                    field,
                    protection: Protection::Unauthenticated,
                });
            }
        }
    }

    Ok(NtpPacket { header, extensions })
}

/// Parse a packet, verifying and decrypting its authenticator if present.
///
/// Fails with [`NtsError::MissingKey`] when an authenticator is present but
/// `opts.key` is `None`, and with `NtsError::Crypto(AuthenticationFailed)`
/// when it does not verify.
pub fn parse_packet(buf: &[u8], opts: &DecodeOptions<'_>) -> Result<NtpPacket, NtsError> {
    walk(buf, opts, true)
}

/// Parse the outer fields of a packet without verifying anything.
///
/// Every field is reported as [`Protection::Unauthenticated`]. Servers use
/// this to find the cookie that yields the request key; clients use it to
/// match the Unique Identifier of a Kiss-o'-Death.
pub fn peek_packet(buf: &[u8]) -> Result<NtpPacket, NtsError> {
    walk(buf, &DecodeOptions::default(), false)
}

/// Parse a server response, mapping Kiss-o'-Death before anything else.
///
/// A stratum-0 response yields [`NtsError::KissOfDeath`]. If
/// `opts.expected_unique_id` is set, the Kiss-o'-Death must echo it or the
/// response is rejected with [`NtsError::UnexpectedUniqueId`], so spoofed
/// rejections cannot tear down a session.
pub fn parse_response(buf: &[u8], opts: &DecodeOptions<'_>) -> Result<NtpPacket, NtsError> {
    let header = Header::decode(buf)?;
    if let Some(code) = header.kiss_code() {
        if let Some(expected) = opts.expected_unique_id {
            let peeked = peek_packet(buf)?;
            if peeked.unique_identifier() != Some(expected) {
                return Err(NtsError::UnexpectedUniqueId);
            }
        }
        debug!(code = %code, reason = code.reason(), "kiss-o'-death received");
        return Err(NtsError::KissOfDeath(code));
    }
    parse_packet(buf, opts)
}

/// Kiss code carried by `buf`, if it is a Kiss-o'-Death.
pub fn kiss_code(buf: &[u8]) -> Result<Option<KissCode>, ParseError> {
    Ok(Header::decode(buf)?.kiss_code())
}
