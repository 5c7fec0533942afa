// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Custom error types for the NTS server.
//!
//! Public transport APIs return `io::Result<T>`. Internally, errors are
//! constructed as [`NtpServerError`] variants and converted to `io::Error`
//! via `From<NtpServerError> for io::Error`, so callers who need the detail
//! can downcast through `io::Error::get_ref()`:
//!
//! ```no_run
//! use ntsec_server::error::NtpServerError;
//!
//! # fn example(result: std::io::Result<()>) {
//! if let Err(e) = result {
//!     match e.get_ref().and_then(|inner| inner.downcast_ref::<NtpServerError>()) {
//!         Some(NtpServerError::Config(c)) => eprintln!("bad configuration: {c}"),
//!         Some(other) => eprintln!("server error: {other}"),
//!         None => eprintln!("I/O error: {e}"),
//!     }
//! }
//! # }
//! ```

use std::fmt;
use std::io;

use ntsec_proto::ke::KeError;

/// Errors that can occur during NTS server operations.
#[derive(Debug)]
pub enum NtpServerError {
    /// The request failed NTP header validation.
    Protocol(ProtocolError),
    /// NTS key establishment or packet authentication failed.
    Nts(NtsError),
    /// Invalid configuration (bad addresses, invalid TLS credentials).
    Config(ConfigError),
    /// Underlying I/O error.
    Io(io::Error),
}

/// NTP header validation errors for incoming client requests.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ProtocolError {
    /// Request shorter than the 48-byte header.
    RequestTooShort {
        /// Number of bytes received.
        received: usize,
    },
    /// Request mode is not Client.
    UnexpectedMode {
        /// The mode value received.
        mode: u8,
    },
    /// NTP version other than 3 or 4.
    UnsupportedVersion {
        /// The version value received.
        version: u8,
    },
    /// Client transmit timestamp is zero.
    ZeroTransmitTimestamp,
    /// The server requires NTS but the request carries no cookie.
    NtsRequired,
}

/// Server-side NTS failures.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NtsError {
    /// A required NTS extension field was missing or not covered by the authenticator.
    MissingExtension {
        /// Name of the missing field.
        field: &'static str,
    },
    /// No master key could open the cookie (expired, forged or corrupted).
    CookieDecryptionFailed,
    /// The request failed to parse or verify under the cookie's C2S key.
    Packet(ntsec_proto::NtsError),
    /// NTS-KE negotiation, framing or key export failed.
    KeyExchange(KeError),
    /// The peer did not negotiate the `ntske/1` ALPN protocol.
    AlpnMismatch,
    /// Master key store lock poisoned.
    KeyStorePoisoned,
}

/// Server configuration errors.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConfigError {
    /// Invalid listen address.
    InvalidListenAddress {
        /// The address that was invalid.
        address: String,
        /// Detail about why it is invalid.
        detail: String,
    },
    /// Invalid TLS certificate or private key.
    InvalidTlsCredentials {
        /// Detail about the failure.
        detail: String,
    },
    /// Generic configuration error.
    Other(String),
}

// ── Display implementations ─────────────────────────────────────────

impl fmt::Display for NtpServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NtpServerError::Protocol(e) => write!(f, "NTP server protocol error: {e}"),
            NtpServerError::Nts(e) => write!(f, "NTS server error: {e}"),
            NtpServerError::Config(e) => write!(f, "NTS server config error: {e}"),
            NtpServerError::Io(e) => write!(f, "{e}"),
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::RequestTooShort { received } => {
                write!(f, "NTP request too short ({received} bytes)")
            }
            ProtocolError::UnexpectedMode { mode } => {
                write!(f, "unexpected request mode: {mode}")
            }
            ProtocolError::UnsupportedVersion { version } => {
                write!(f, "unsupported NTP version: {version}")
            }
            ProtocolError::ZeroTransmitTimestamp => {
                write!(f, "client transmit timestamp is zero")
            }
            ProtocolError::NtsRequired => write!(f, "request is not NTS-protected"),
        }
    }
}

impl fmt::Display for NtsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NtsError::MissingExtension { field } => {
                write!(f, "missing NTS extension field: {field}")
            }
            NtsError::CookieDecryptionFailed => {
                write!(f, "failed to decrypt NTS cookie (expired or invalid)")
            }
            NtsError::Packet(e) => write!(f, "{e}"),
            NtsError::KeyExchange(e) => write!(f, "{e}"),
            NtsError::AlpnMismatch => write!(f, "client did not negotiate ntske/1"),
            NtsError::KeyStorePoisoned => write!(f, "master key store lock poisoned"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidListenAddress { address, detail } => {
                write!(f, "invalid listen address '{address}': {detail}")
            }
            ConfigError::InvalidTlsCredentials { detail } => {
                write!(f, "invalid TLS credentials: {detail}")
            }
            ConfigError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

// ── Error trait implementations ─────────────────────────────────────

impl std::error::Error for NtpServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NtpServerError::Io(e) => Some(e),
            NtpServerError::Nts(NtsError::Packet(e)) => Some(e),
            NtpServerError::Nts(NtsError::KeyExchange(e)) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for ProtocolError {}
impl std::error::Error for NtsError {}
impl std::error::Error for ConfigError {}

// ── From conversions ────────────────────────────────────────────────

impl From<NtpServerError> for io::Error {
    fn from(err: NtpServerError) -> io::Error {
        let kind = match &err {
            NtpServerError::Protocol(_) => io::ErrorKind::InvalidData,
            NtpServerError::Nts(NtsError::KeyExchange(KeError::UnexpectedEof)) => {
                io::ErrorKind::UnexpectedEof
            }
            NtpServerError::Nts(NtsError::KeyExchange(KeError::Export(_))) => io::ErrorKind::Other,
            NtpServerError::Nts(NtsError::KeyStorePoisoned) => io::ErrorKind::Other,
            NtpServerError::Nts(_) => io::ErrorKind::InvalidData,
            NtpServerError::Config(_) => io::ErrorKind::InvalidInput,
            NtpServerError::Io(e) => e.kind(),
        };
        // Preserve the original io::Error directly for the Io variant.
        if let NtpServerError::Io(e) = err {
            return e;
        }
        io::Error::new(kind, err)
    }
}

impl From<io::Error> for NtpServerError {
    fn from(err: io::Error) -> NtpServerError {
        NtpServerError::Io(err)
    }
}

impl From<ProtocolError> for NtpServerError {
    fn from(err: ProtocolError) -> NtpServerError {
        NtpServerError::Protocol(err)
    }
}

impl From<NtsError> for NtpServerError {
    fn from(err: NtsError) -> NtpServerError {
        NtpServerError::Nts(err)
    }
}

impl From<ConfigError> for NtpServerError {
    fn from(err: ConfigError) -> NtpServerError {
        NtpServerError::Config(err)
    }
}

impl From<KeError> for NtpServerError {
    fn from(err: KeError) -> NtpServerError {
        NtpServerError::Nts(NtsError::KeyExchange(err))
    }
}

impl From<ntsec_proto::NtsError> for NtpServerError {
    fn from(err: ntsec_proto::NtsError) -> NtpServerError {
        NtpServerError::Nts(NtsError::Packet(err))
    }
}

// ── Tests ───────────────────────────────────────────────────────────
