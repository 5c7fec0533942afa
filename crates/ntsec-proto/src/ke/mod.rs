// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! NTS Key Establishment (RFC 8915 §4).
//!
//! NTS-KE runs over TLS 1.3 with ALPN `ntske/1`. Each side sends a sequence
//! of records terminated by End of Message. The server answers with the
//! negotiated protocol and AEAD algorithm and a batch of cookies. Both sides
//! then derive the session keys from the TLS exporter.
//!
//! This module is transport-free: [`record`] frames records, [`negotiate`]
//! implements both sides of the negotiation, and [`export`] derives keys
//! through the narrow [`KeyingMaterialExporter`] trait.

use std::fmt;
use std::io;

use crate::error::{CryptoError, ParseError};

/// Record framing and incremental stream assembly.
pub mod record;

/// Client and server negotiation logic.
pub mod negotiate;

/// Session key derivation from the TLS exporter.
pub mod export;

pub use export::{
    Direction, KeyingMaterialExporter, SessionKeys, export_session_keys, exporter_context,
};
pub use negotiate::{
    KeOutcome, ServerDecision, ServerNegotiation, client_request, error_response,
    process_client_request, process_server_response, server_response,
};
pub use record::{KeRecord, KeRecordReader, decode_message, encode_records};

/// End of Message record type.
pub const END_OF_MESSAGE: u16 = 0;
/// NTS Next Protocol Negotiation record type.
pub const NEXT_PROTOCOL: u16 = 1;
/// Error record type.
pub const ERROR: u16 = 2;
/// Warning record type.
pub const WARNING: u16 = 3;
/// AEAD Algorithm Negotiation record type.
pub const AEAD_ALGORITHM: u16 = 4;
/// New Cookie for NTPv4 record type.
pub const NEW_COOKIE: u16 = 5;
/// NTPv4 Server Negotiation record type.
pub const SERVER: u16 = 6;
/// NTPv4 Port Negotiation record type.
pub const PORT: u16 = 7;

/// NTPv4 protocol ID for Next Protocol Negotiation.
pub const PROTOCOL_NTPV4: u16 = 0;

/// Error code: unrecognized critical record.
pub const ERROR_UNRECOGNIZED_CRITICAL: u16 = 0;
/// Error code: bad request.
pub const ERROR_BAD_REQUEST: u16 = 1;

/// Default NTS-KE port.
pub const DEFAULT_PORT: u16 = 4460;

/// TLS ALPN protocol identifier.
pub const ALPN_NTSKE: &[u8] = b"ntske/1";

/// TLS exporter label.
pub const EXPORTER_LABEL: &[u8] = b"EXPORTER-network-time-security";

/// Upper bound on the bytes one side may send before End of Message.
pub const MAX_MESSAGE_LEN: usize = 64 * 1024;

/// Errors from NTS-KE framing, negotiation and key export.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum KeError {
    /// A record could not be framed.
    Parse(ParseError),
    /// A record body exceeded 65535 bytes.
    RecordTooLarge {
        /// The body length that did not fit.
        length: usize,
    },
    /// The peer sent more than [`MAX_MESSAGE_LEN`] bytes without End of Message.
    MessageTooLarge,
    /// The stream ended before End of Message.
    UnexpectedEof,
    /// A record with the critical bit set had an unknown type.
    UnrecognizedCritical {
        /// The unrecognized type.
        record_type: u16,
    },
    /// The server answered with an Error record.
    ServerError {
        /// The error code.
        code: u16,
    },
    /// A record required by the exchange was absent.
    MissingRecord {
        /// Name of the missing record.
        record: &'static str,
    },
    /// A record body was malformed.
    InvalidRecord {
        /// The record type.
        record_type: u16,
        /// What was wrong.
        reason: &'static str,
    },
    /// No mutually supported next protocol.
    NoCommonProtocol,
    /// The server selected an AEAD algorithm this side does not support.
    UnsupportedAead {
        /// The algorithm identifier.
        algorithm: u16,
    },
    /// The TLS exporter failed.
    Export(String),
    /// An exported key was rejected.
    Crypto(CryptoError),
}

impl fmt::Display for KeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeError::Parse(e) => write!(f, "NTS-KE framing error: {}", e),
            KeError::RecordTooLarge { length } => {
                write!(f, "NTS-KE record body too large: {} bytes", length)
            }
            KeError::MessageTooLarge => write!(f, "NTS-KE message too large"),
            KeError::UnexpectedEof => write!(f, "NTS-KE stream ended before End of Message"),
            KeError::UnrecognizedCritical { record_type } => {
                write!(f, "unrecognized critical NTS-KE record type {}", record_type)
            }
            KeError::ServerError { code } => write!(f, "NTS-KE server error code {}", code),
            KeError::MissingRecord { record } => write!(f, "NTS-KE response missing {}", record),
            KeError::InvalidRecord {
                record_type,
                reason,
            } => write!(f, "invalid NTS-KE record type {}: {}", record_type, reason),
            KeError::NoCommonProtocol => write!(f, "no common NTS next protocol"),
            KeError::UnsupportedAead { algorithm } => {
                write!(f, "unsupported AEAD algorithm: {}", algorithm)
            }
            KeError::Export(e) => write!(f, "TLS key export failed: {}", e),
            KeError::Crypto(e) => write!(f, "exported key rejected: {}", e),
        }
    }
}

impl std::error::Error for KeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            KeError::Parse(e) => Some(e),
            KeError::Crypto(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ParseError> for KeError {
    fn from(err: ParseError) -> Self {
        KeError::Parse(err)
    }
}

impl From<CryptoError> for KeError {
    fn from(err: CryptoError) -> Self {
        KeError::Crypto(err)
    }
}

impl From<KeError> for io::Error {
    fn from(err: KeError) -> io::Error {
        let kind = match &err {
            KeError::UnexpectedEof => io::ErrorKind::UnexpectedEof,
            KeError::ServerError { .. } => io::ErrorKind::ConnectionRefused,
            KeError::Export(_) => io::ErrorKind::Other,
            _ => io::ErrorKind::InvalidData,
        };
        io::Error::new(kind, err)
    }
}
