// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! NTS-KE record framing.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |C|         Record Type         |          Body Length          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! .                         Record Body                           .
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use byteorder::{BigEndian, ByteOrder};

use super::{
    AEAD_ALGORITHM, END_OF_MESSAGE, ERROR, KeError, MAX_MESSAGE_LEN, NEW_COOKIE, NEXT_PROTOCOL,
    PORT, SERVER, WARNING,
};
use crate::crypto::AeadAlgorithm;
use crate::error::ParseError;

const CRITICAL_BIT: u16 = 0x8000;
const RECORD_HEADER_LEN: usize = 4;

/// A single NTS-KE record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeRecord {
    /// Whether the critical bit is set.
    pub critical: bool,
    /// The 15-bit record type.
    pub record_type: u16,
    /// The record body.
    pub body: Vec<u8>,
}

fn u16_body(values: impl IntoIterator<Item = u16>) -> Vec<u8> {
    values.into_iter().flat_map(u16::to_be_bytes).collect()
}

impl KeRecord {
    /// Build a record. Only the low 15 bits of `record_type` are kept.
    pub fn new(critical: bool, record_type: u16, body: impl Into<Vec<u8>>) -> Self {
        KeRecord {
            critical,
            record_type: record_type & !CRITICAL_BIT,
            body: body.into(),
        }
    }

    /// End of Message (critical, empty body).
    pub fn end_of_message() -> Self {
        KeRecord::new(true, END_OF_MESSAGE, Vec::new())
    }

    /// Next Protocol Negotiation (critical).
    pub fn next_protocol(protocols: &[u16]) -> Self {
        KeRecord::new(true, NEXT_PROTOCOL, u16_body(protocols.iter().copied()))
    }

    /// AEAD Algorithm Negotiation listing `algorithms` in preference order.
    pub fn aead_algorithms(algorithms: &[AeadAlgorithm]) -> Self {
        KeRecord::new(
            true,
            AEAD_ALGORITHM,
            u16_body(algorithms.iter().map(|a| a.id())),
        )
    }

    /// Error (critical).
    pub fn error(code: u16) -> Self {
        KeRecord::new(true, ERROR, code.to_be_bytes())
    }

    /// Warning (critical).
    pub fn warning(code: u16) -> Self {
        KeRecord::new(true, WARNING, code.to_be_bytes())
    }

    /// New Cookie for NTPv4.
    pub fn new_cookie(cookie: impl Into<Vec<u8>>) -> Self {
        KeRecord::new(false, NEW_COOKIE, cookie)
    }

    /// NTPv4 Server Negotiation.
    pub fn server(host: &str) -> Self {
        KeRecord::new(false, SERVER, host.as_bytes())
    }

    /// NTPv4 Port Negotiation.
    pub fn port(port: u16) -> Self {
        KeRecord::new(false, PORT, port.to_be_bytes())
    }

    /// Whether this is the End of Message record.
    pub fn is_end_of_message(&self) -> bool {
        self.record_type == END_OF_MESSAGE
    }

    /// Interpret the body as a list of big-endian 16-bit values.
    pub fn u16_list(&self) -> Result<Vec<u16>, KeError> {
        if self.body.len() % 2 != 0 {
            return Err(KeError::InvalidRecord {
                record_type: self.record_type,
                reason: "body is not a list of 16-bit values",
            });
        }
        Ok(self.body.chunks_exact(2).map(BigEndian::read_u16).collect())
    }

    /// Interpret the body as exactly one big-endian 16-bit value.
    pub fn single_u16(&self) -> Result<u16, KeError> {
        match self.body.as_slice() {
            [hi, lo] => Ok(u16::from_be_bytes([*hi, *lo])),
            _ => Err(KeError::InvalidRecord {
                record_type: self.record_type,
                reason: "body must be a single 16-bit value",
            }),
        }
    }

    /// Append the wire encoding to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), KeError> {
        let length = u16::try_from(self.body.len()).map_err(|_| KeError::RecordTooLarge {
            length: self.body.len(),
        })?;
        let raw_type = if self.critical {
            self.record_type | CRITICAL_BIT
        } else {
            self.record_type
        };
        out.extend_from_slice(&raw_type.to_be_bytes());
        out.extend_from_slice(&length.to_be_bytes());
        out.extend_from_slice(&self.body);
        Ok(())
    }

    /// Decode one record from the front of `buf`, returning it and the bytes consumed.
    ///
    /// Fails with [`ParseError::BufferTooShort`] when `buf` does not yet hold
    /// a whole record.
    pub fn decode(buf: &[u8]) -> Result<(KeRecord, usize), ParseError> {
        if buf.len() < RECORD_HEADER_LEN {
            return Err(ParseError::BufferTooShort {
                needed: RECORD_HEADER_LEN,
                available: buf.len(),
            });
        }
        let raw_type = BigEndian::read_u16(&buf[0..2]);
        let length = BigEndian::read_u16(&buf[2..4]) as usize;
        let total = RECORD_HEADER_LEN + length;
        if buf.len() < total {
            return Err(ParseError::BufferTooShort {
                needed: total,
                available: buf.len(),
            });
        }
        let record = KeRecord {
            critical: raw_type & CRITICAL_BIT != 0,
            record_type: raw_type & !CRITICAL_BIT,
            body: buf[RECORD_HEADER_LEN..total].to_vec(),
        };
        Ok((record, total))
    }
}

/// Encode a sequence of records.
pub fn encode_records(records: &[KeRecord]) -> Result<Vec<u8>, KeError> {
    let mut out = Vec::new();
    for record in records {
        record.encode_into(&mut out)?;
    }
    Ok(out)
}

/// Decode a complete message, stopping after End of Message.
///
/// Fails with [`KeError::UnexpectedEof`] if the buffer ends first.
pub fn decode_message(buf: &[u8]) -> Result<Vec<KeRecord>, KeError> {
    let mut reader = KeRecordReader::new();
    reader.push(buf)?;
    let mut records = Vec::new();
    while let Some(record) = reader.next_record()? {
        let done = record.is_end_of_message();
        records.push(record);
        if done {
            return Ok(records);
        }
    }
    Err(KeError::UnexpectedEof)
}

/// Assembles records from a byte stream that arrives in arbitrary chunks.
#[derive(Clone, Debug, Default)]
pub struct KeRecordReader {
    buf: Vec<u8>,
    received: usize,
}

impl KeRecordReader {
    /// An empty reader.
    pub fn new() -> Self {
        KeRecordReader::default()
    }

    /// Append bytes read from the stream.
    ///
    /// Fails once more than [`MAX_MESSAGE_LEN`] bytes have been pushed in total.
    pub fn push(&mut self, data: &[u8]) -> Result<(), KeError> {
        self.received += data.len();
        if self.received > MAX_MESSAGE_LEN {
            return Err(KeError::MessageTooLarge);
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Take the next complete record, or `None` if more bytes are needed.
    pub fn next_record(&mut self) -> Result<Option<KeRecord>, KeError> {
        match KeRecord::decode(&self.buf) {
            Ok((record, used)) => {
                self.buf.drain(..used);
                Ok(Some(record))
            }
            Err(ParseError::BufferTooShort { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Bytes buffered but not yet returned as records.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_critical_bit() {
        let mut out = Vec::new();
        KeRecord::end_of_message().encode_into(&mut out).unwrap();
        assert_eq!(out, vec![0x80, 0x00, 0x00, 0x00]);

        let (record, used) = KeRecord::decode(&[0x80, 0x04, 0x00, 0x02, 0x00, 0x0f]).unwrap();
        assert_eq!(used, 6);
        assert!(record.critical);
        assert_eq!(record.record_type, AEAD_ALGORITHM);
        assert_eq!(record.u16_list().unwrap(), vec![15]);
    }

    #[test]
    fn test_new_masks_critical_bit_from_type() {
        let record = KeRecord::new(false, 0x8005, Vec::new());
        assert_eq!(record.record_type, NEW_COOKIE);
        assert!(!record.critical);
    }

    #[test]
    fn test_client_request_bytes() {
        let bytes = encode_records(&[
            KeRecord::next_protocol(&[0]),
            KeRecord::aead_algorithms(&[AeadAlgorithm::AesSivCmac256]),
            KeRecord::end_of_message(),
        ])
        .unwrap();
        assert_eq!(
            bytes,
            vec![
                0x80, 0x01, 0x00, 0x02, 0x00, 0x00, // next protocol: NTPv4
                0x80, 0x04, 0x00, 0x02, 0x00, 0x0f, // AEAD: 15
                0x80, 0x00, 0x00, 0x00, // end of message
            ]
        );
    }

    #[test]
    fn test_decode_incomplete() {
        assert_eq!(
            KeRecord::decode(&[0x00, 0x05, 0x00, 0x08, 1, 2]).unwrap_err(),
            ParseError::BufferTooShort {
                needed: 12,
                available: 6
            }
        );
    }

    #[test]
    fn test_reader_reassembles_chunks() {
        let bytes = encode_records(&[
            KeRecord::new_cookie(vec![9; 10]),
            KeRecord::port(123),
            KeRecord::end_of_message(),
        ])
        .unwrap();

        let mut reader = KeRecordReader::new();
        let mut records = Vec::new();
        for chunk in bytes.chunks(3) {
            reader.push(chunk).unwrap();
            while let Some(record) = reader.next_record().unwrap() {
                records.push(record);
            }
        }
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].body, vec![9; 10]);
        assert_eq!(records[1].single_u16().unwrap(), 123);
        assert!(records[2].is_end_of_message());
        assert_eq!(reader.buffered(), 0);
    }

    #[test]
    fn test_reader_limit() {
        let mut reader = KeRecordReader::new();
        reader.push(&vec![0; MAX_MESSAGE_LEN]).unwrap();
        assert_eq!(reader.push(&[0]).unwrap_err(), KeError::MessageTooLarge);
    }

    #[test]
    fn test_decode_message_requires_eom() {
        let bytes = encode_records(&[KeRecord::new_cookie(vec![1; 4])]).unwrap();
        assert_eq!(decode_message(&bytes).unwrap_err(), KeError::UnexpectedEof);
    }

    #[test]
    fn test_odd_u16_list() {
        let record = KeRecord::new(true, NEXT_PROTOCOL, vec![0, 0, 1]);
        assert!(matches!(
            record.u16_list(),
            Err(KeError::InvalidRecord { record_type: 1, .. })
        ));
    }

    #[test]
    fn test_record_too_large() {
        let record = KeRecord::new_cookie(vec![0; 70_000]);
        assert_eq!(
            record.encode_into(&mut Vec::new()).unwrap_err(),
            KeError::RecordTooLarge { length: 70_000 }
        );
    }
}
