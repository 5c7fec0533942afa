// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! NTS extension field semantics (RFC 8915 §5).
//!
//! - [`field`]: the typed variants layered over generic extension framing.
//! - [`packet`]: parsing with authenticator verification, decryption and
//!   Kiss-o'-Death mapping.
//! - [`builder`]: packet construction and sealing.
//! - [`exchange`]: client request construction and response validation.

/// Packet construction and sealing.
pub mod builder;
/// Client request construction and response validation.
pub mod exchange;
/// Typed NTS extension fields.
pub mod field;
/// Packet parsing and verification.
pub mod packet;

pub use builder::{CountingEntropy, EntropySource, OsEntropy, PacketBuilder};
pub use exchange::{ClientRequest, ServerResponse, build_client_request, validate_server_response};
pub use field::{Authenticator, NtsField};
pub use packet::{
    AadLayout, DecodeOptions, NtpPacket, PacketExtension, Protection, kiss_code, parse_packet,
    parse_response, peek_packet,
};

/// Unique Identifier extension field type.
pub const UNIQUE_IDENTIFIER: u16 = 0x0104;

/// NTS Cookie extension field type.
pub const NTS_COOKIE: u16 = 0x0204;

/// NTS Cookie Placeholder extension field type.
pub const NTS_COOKIE_PLACEHOLDER: u16 = 0x0304;

/// NTS Authenticator and Encrypted Extension Fields extension field type.
pub const NTS_AUTHENTICATOR: u16 = 0x0404;

/// Length of the Unique Identifier this crate generates (RFC 8915 requires at least 32).
pub const UNIQUE_ID_LEN: usize = 32;

/// Authenticator nonce length used when sealing.
pub const NONCE_LEN: usize = 16;

/// Encrypted extension fields may not themselves contain an authenticator.
pub const MAX_NESTING_DEPTH: usize = 1;
