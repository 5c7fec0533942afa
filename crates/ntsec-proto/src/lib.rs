// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! NTP packet format, NTS extension fields, NTS-KE records and AES-SIV.
//!
//! This crate is the pure core shared by the NTS server and client crates:
//! every function here operates on complete byte buffers, performs no I/O and
//! is safe to call concurrently from any number of tasks.
//!
//! - [`crypto`]: AES-CMAC, GF(2^128) doubling, AES-CTR and the AES-SIV AEAD
//!   (RFC 5297) assembled from them.
//! - [`protocol`]: the fixed 48-byte NTP header (RFC 5905).
//! - [`extension`]: generic extension field framing (RFC 7822).
//! - [`nts`]: typed NTS extension fields, authenticator sealing/opening and
//!   Kiss-o'-Death mapping (RFC 8915 §5).
//! - [`ke`]: NTS-KE records, negotiation and TLS key export (RFC 8915 §4).

#![warn(missing_docs)]

/// Error types for wire-format parsing, cryptography and NTS processing.
pub mod error;

/// Block cipher primitives and the AES-SIV AEAD.
pub mod crypto;

/// NTP extension field framing (type/length/value, 4-byte aligned).
pub mod extension;

/// NTP header types and constants (RFC 5905).
pub mod protocol;

/// Conversions between NTP timestamps and system time.
pub mod unix_time;

/// NTS extension semantics: typed fields, packet parse/build, Kiss-o'-Death.
pub mod nts;

/// NTS Key Establishment: records, negotiation and key export.
pub mod ke;

pub use crypto::{AeadAlgorithm, AesSivKey};
pub use error::{CryptoError, NtsError, ParseError};
