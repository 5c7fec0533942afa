// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Error types for the packet core.
//!
//! Three families are kept apart so callers can react to each differently:
//!
//! - [`ParseError`]: malformed wire data (short buffers, bad extension lengths).
//! - [`CryptoError`]: size contract violations in the primitives and AES-SIV
//!   authentication failures.
//! - [`NtsError`]: NTS-level outcomes, wrapping the two above plus missing keys,
//!   unique identifier mismatches and Kiss-o'-Death rejections.
//!
//! All of them convert into [`std::io::Error`] for the transport crates.

use std::fmt;
use std::io;

use crate::protocol::KissCode;

/// Errors that can occur while parsing or serializing NTP wire data.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ParseError {
    /// The buffer is too short for the expected data.
    BufferTooShort {
        /// Number of bytes needed.
        needed: usize,
        /// Number of bytes available.
        available: usize,
    },
    /// An invalid or unrecognized field value was encountered.
    InvalidField {
        /// Name of the field that was invalid.
        field: &'static str,
        /// The invalid value.
        value: u32,
    },
    /// Extension field declares a length shorter than its own 4-byte header.
    InvalidExtensionLength {
        /// The declared length that was invalid.
        declared: u16,
    },
    /// Encrypted extension fields nest deeper than the protocol allows.
    ExtensionNestingTooDeep {
        /// The maximum permitted depth.
        limit: usize,
    },
    /// An extension field body is too large for the 16-bit length field.
    ExtensionTooLarge {
        /// The length that did not fit.
        length: usize,
    },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::BufferTooShort { needed, available } => {
                write!(
                    f,
                    "buffer too short: needed {} bytes, got {}",
                    needed, available
                )
            }
            ParseError::InvalidField { field, value } => {
                write!(f, "invalid {} value: {}", field, value)
            }
            ParseError::InvalidExtensionLength { declared } => {
                write!(
                    f,
                    "invalid extension field: length less than 4: {}",
                    declared
                )
            }
            ParseError::ExtensionNestingTooDeep { limit } => {
                write!(
                    f,
                    "invalid extension field: encrypted nesting exceeds depth {}",
                    limit
                )
            }
            ParseError::ExtensionTooLarge { length } => {
                write!(f, "extension field too large to encode: {} bytes", length)
            }
        }
    }
}

impl std::error::Error for ParseError {}

impl From<ParseError> for io::Error {
    fn from(err: ParseError) -> io::Error {
        let kind = match &err {
            ParseError::BufferTooShort { .. } => io::ErrorKind::UnexpectedEof,
            ParseError::ExtensionTooLarge { .. } => io::ErrorKind::InvalidInput,
            _ => io::ErrorKind::InvalidData,
        };
        io::Error::new(kind, err)
    }
}

/// Errors raised by the block primitives and the AES-SIV construction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CryptoError {
    /// A key had a length the operation does not accept.
    KeySize {
        /// The rejected key length in bytes.
        len: usize,
    },
    /// A block-sized input had the wrong length.
    BlockSize {
        /// The rejected length in bytes.
        len: usize,
    },
    /// Two operands that must be the same length were not.
    LengthMismatch {
        /// Length of the left operand.
        left: usize,
        /// Length of the right operand.
        right: usize,
    },
    /// Input violated a structural precondition (e.g. ciphertext shorter than the SIV).
    InvalidInput {
        /// What was wrong with the input.
        reason: &'static str,
    },
    /// S2V was given more strings than RFC 5297 permits.
    TooManyComponents {
        /// The number of strings supplied.
        count: usize,
    },
    /// The synthetic IV did not match: the ciphertext or associated data was altered.
    AuthenticationFailed,
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoError::KeySize { len } => write!(f, "invalid key size: {} bytes", len),
            CryptoError::BlockSize { len } => {
                write!(f, "invalid block size: {} bytes", len)
            }
            CryptoError::LengthMismatch { left, right } => {
                write!(f, "operand length mismatch: {} vs {}", left, right)
            }
            CryptoError::InvalidInput { reason } => write!(f, "invalid input: {}", reason),
            CryptoError::TooManyComponents { count } => {
                write!(f, "too many S2V components: {}", count)
            }
            CryptoError::AuthenticationFailed => write!(f, "authentication failed"),
        }
    }
}

impl std::error::Error for CryptoError {}

impl From<CryptoError> for io::Error {
    fn from(err: CryptoError) -> io::Error {
        let kind = match &err {
            CryptoError::AuthenticationFailed => io::ErrorKind::PermissionDenied,
            _ => io::ErrorKind::InvalidInput,
        };
        io::Error::new(kind, err)
    }
}

/// Errors produced while interpreting NTS-protected NTP packets.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NtsError {
    /// The packet or one of its extension fields was malformed.
    Parse(ParseError),
    /// A cryptographic operation failed; `Crypto(AuthenticationFailed)` means the
    /// whole packet must be treated as untrusted.
    Crypto(CryptoError),
    /// An authenticator was present but no key was supplied to verify it.
    MissingKey,
    /// The Unique Identifier did not match the expected value.
    UnexpectedUniqueId,
    /// The response is a Kiss-o'-Death carrying the given code.
    KissOfDeath(KissCode),
    /// A field required by the protocol exchange was absent.
    MissingField {
        /// Name of the missing field.
        field: &'static str,
    },
}

impl NtsError {
    /// Returns true if this error means the packet failed AEAD verification.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, NtsError::Crypto(CryptoError::AuthenticationFailed))
    }
}

impl fmt::Display for NtsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NtsError::Parse(e) => write!(f, "malformed NTS packet: {e}"),
            NtsError::Crypto(CryptoError::AuthenticationFailed) => {
                write!(f, "NTS authenticator verification failed")
            }
            NtsError::Crypto(e) => write!(f, "NTS crypto error: {e}"),
            NtsError::MissingKey => {
                write!(f, "authenticator present but no key supplied")
            }
            NtsError::UnexpectedUniqueId => write!(f, "unique identifier mismatch"),
            NtsError::KissOfDeath(code) => {
                write!(f, "kiss-o'-death {}: {}", code, code.reason())
            }
            NtsError::MissingField { field } => write!(f, "missing {field}"),
        }
    }
}

impl std::error::Error for NtsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NtsError::Parse(e) => Some(e),
            NtsError::Crypto(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ParseError> for NtsError {
    fn from(err: ParseError) -> Self {
        NtsError::Parse(err)
    }
}

impl From<CryptoError> for NtsError {
    fn from(err: CryptoError) -> Self {
        NtsError::Crypto(err)
    }
}

impl From<NtsError> for io::Error {
    fn from(err: NtsError) -> io::Error {
        let kind = match &err {
            NtsError::Parse(ParseError::BufferTooShort { .. }) => io::ErrorKind::UnexpectedEof,
            NtsError::Crypto(CryptoError::AuthenticationFailed) => {
                io::ErrorKind::PermissionDenied
            }
            NtsError::KissOfDeath(_) => io::ErrorKind::ConnectionRefused,
            _ => io::ErrorKind::InvalidData,
        };
        io::Error::new(kind, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_buffer_too_short() {
        let err = ParseError::BufferTooShort {
            needed: 48,
            available: 10,
        };
        assert_eq!(err.to_string(), "buffer too short: needed 48 bytes, got 10");
    }

    #[test]
    fn test_display_invalid_extension_length() {
        let err = ParseError::InvalidExtensionLength { declared: 2 };
        assert_eq!(
            err.to_string(),
            "invalid extension field: length less than 4: 2"
        );
    }

    #[test]
    fn test_display_nesting() {
        let err = ParseError::ExtensionNestingTooDeep { limit: 1 };
        assert!(err.to_string().contains("depth 1"));
    }

    #[test]
    fn test_parse_error_into_io_error() {
        let io_err: io::Error = ParseError::BufferTooShort {
            needed: 48,
            available: 0,
        }
        .into();
        assert_eq!(io_err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_crypto_error_display() {
        assert_eq!(
            CryptoError::KeySize { len: 31 }.to_string(),
            "invalid key size: 31 bytes"
        );
        assert_eq!(
            CryptoError::AuthenticationFailed.to_string(),
            "authentication failed"
        );
    }

    #[test]
    fn test_authentication_failure_maps_to_permission_denied() {
        let io_err: io::Error = NtsError::Crypto(CryptoError::AuthenticationFailed).into();
        assert_eq!(io_err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_kiss_of_death_display_names_reason() {
        let err = NtsError::KissOfDeath(KissCode::Rate);
        assert_eq!(err.to_string(), "kiss-o'-death RATE: rate exceeded");
    }

    #[test]
    fn test_nts_error_downcast_through_io() {
        let io_err: io::Error = NtsError::UnexpectedUniqueId.into();
        let inner = io_err
            .get_ref()
            .and_then(|e| e.downcast_ref::<NtsError>())
            .unwrap();
        assert_eq!(*inner, NtsError::UnexpectedUniqueId);
    }
}
