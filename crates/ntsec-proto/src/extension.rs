// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Generic NTP extension field framing (RFC 7822).
//!
//! Extension fields are appended after the 48-byte NTP header. This module
//! knows nothing about their meaning; [`crate::nts`] assigns NTS semantics
//! to specific type codes.
//!
//! # Extension Field Format
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |          Field Type           |        Field Length           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! .                                                               .
//! .                       Field Value (variable)                  .
//! .                                                               .
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The encoder writes `Field Length = 4 + value length` and zero-pads the
//! field on the wire to a 4-byte boundary. The decoder advances by the
//! declared length rounded up to 4, so it accepts both padded and unpadded
//! length conventions.
//!
//! A field whose declared length runs past the end of the buffer ends the
//! walk without an error: the fields before it are returned and the
//! truncated trailer is ignored.

use byteorder::{BigEndian, ByteOrder};
use tracing::debug;

use crate::error::ParseError;

/// Size of the type/length header that starts every extension field.
pub const EXTENSION_HEADER_LEN: usize = 4;

/// Round `len` up to the next multiple of 4.
pub const fn padded_len(len: usize) -> usize {
    (len + 3) & !3
}

/// A borrowed view of an extension field inside a packet buffer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ExtensionFieldRef<'a> {
    /// The extension field type code.
    pub field_type: u16,
    /// The value bytes (declared length minus the 4-byte header).
    pub body: &'a [u8],
    /// The whole field as it appeared on the wire, header and padding included.
    pub wire: &'a [u8],
    /// Offset of the field from the start of the walked buffer.
    pub offset: usize,
}

/// Iterator over the extension fields in a byte buffer.
///
/// Yields at most one error, after which it is exhausted. Created by
/// [`iter_extension_fields`].
#[derive(Clone, Debug)]
pub struct ExtensionFieldIter<'a> {
    data: &'a [u8],
    offset: usize,
    done: bool,
}

impl<'a> ExtensionFieldIter<'a> {
    /// Offset of the first byte not yet consumed.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl<'a> Iterator for ExtensionFieldIter<'a> {
    type Item = Result<ExtensionFieldRef<'a>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let remaining = &self.data[self.offset..];
        if remaining.len() < EXTENSION_HEADER_LEN {
            self.done = true;
            return None;
        }

        let field_type = BigEndian::read_u16(&remaining[0..2]);
        let declared = BigEndian::read_u16(&remaining[2..4]);
        if (declared as usize) < EXTENSION_HEADER_LEN {
            self.done = true;
            return Some(Err(ParseError::InvalidExtensionLength { declared }));
        }

        let length = declared as usize;
        if length > remaining.len() {
            debug!(
                offset = self.offset,
                field_type,
                declared = length,
                available = remaining.len(),
                "extension field overruns buffer, ignoring trailer"
            );
            self.done = true;
            return None;
        }

        let wire_len = padded_len(length).min(remaining.len());
        let field = ExtensionFieldRef {
            field_type,
            body: &remaining[EXTENSION_HEADER_LEN..length],
            wire: &remaining[..wire_len],
            offset: self.offset,
        };
        self.offset += wire_len;
        Some(Ok(field))
    }
}

/// Walk the extension fields in `data` without allocating.
pub fn iter_extension_fields(data: &[u8]) -> ExtensionFieldIter<'_> {
    ExtensionFieldIter {
        data,
        offset: 0,
        done: false,
    }
}

/// An owned, generic NTP extension field.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExtensionField {
    /// The extension field type code.
    pub field_type: u16,
    /// The value bytes, excluding the 4-byte header and any wire padding.
    pub body: Vec<u8>,
}

impl ExtensionField {
    /// Build a field from a type code and value.
    pub fn new(field_type: u16, body: impl Into<Vec<u8>>) -> Self {
        ExtensionField {
            field_type,
            body: body.into(),
        }
    }

    /// The value written into the length field: header plus body, unpadded.
    pub fn declared_len(&self) -> Result<u16, ParseError> {
        let length = EXTENSION_HEADER_LEN + self.body.len();
        u16::try_from(length).map_err(|_| ParseError::ExtensionTooLarge { length })
    }

    /// Bytes this field occupies on the wire, padding included.
    pub fn wire_len(&self) -> usize {
        padded_len(EXTENSION_HEADER_LEN + self.body.len())
    }

    /// Append the padded wire encoding of this field to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), ParseError> {
        let declared = self.declared_len()?;
        out.extend_from_slice(&self.field_type.to_be_bytes());
        out.extend_from_slice(&declared.to_be_bytes());
        out.extend_from_slice(&self.body);
        let pad = self.wire_len() - declared as usize;
        out.resize(out.len() + pad, 0);
        Ok(())
    }

    /// The padded wire encoding of this field.
    pub fn to_wire(&self) -> Result<Vec<u8>, ParseError> {
        let mut out = Vec::with_capacity(self.wire_len());
        self.encode_into(&mut out)?;
        Ok(out)
    }
}

impl From<ExtensionFieldRef<'_>> for ExtensionField {
    fn from(field: ExtensionFieldRef<'_>) -> Self {
        ExtensionField::new(field.field_type, field.body)
    }
}

/// Parse every extension field in `data` into owned values.
pub fn parse_extension_fields(data: &[u8]) -> Result<Vec<ExtensionField>, ParseError> {
    iter_extension_fields(data)
        .map(|r| r.map(ExtensionField::from))
        .collect()
}

/// Serialize extension fields, each padded to a 4-byte boundary.
pub fn write_extension_fields(fields: &[ExtensionField]) -> Result<Vec<u8>, ParseError> {
    let total = fields.iter().map(ExtensionField::wire_len).sum();
    let mut out = Vec::with_capacity(total);
    for field in fields {
        field.encode_into(&mut out)?;
    }
    Ok(out)
}

/// Serialize extension fields into `buf`, returning the number of bytes written.
pub fn write_extension_fields_buf(
    fields: &[ExtensionField],
    buf: &mut [u8],
) -> Result<usize, ParseError> {
    let encoded = write_extension_fields(fields)?;
    if encoded.len() > buf.len() {
        return Err(ParseError::BufferTooShort {
            needed: encoded.len(),
            available: buf.len(),
        });
    }
    buf[..encoded.len()].copy_from_slice(&encoded);
    Ok(encoded.len())
}
