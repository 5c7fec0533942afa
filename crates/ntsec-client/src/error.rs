// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Error types for the NTS client.
//!
//! Public APIs return `io::Result<T>`. Internally, errors are built as
//! [`NtsClientError`] variants and converted with `From<NtsClientError> for
//! io::Error`, so callers can match on them by downcasting:
//!
//! ```no_run
//! # async fn example() {
//! use ntsec_client::error::NtsClientError;
//! use ntsec_client::nts::NtsSession;
//! use ntsec_client::nts_ke::NtsKeConfig;
//!
//! match NtsSession::from_ke(&NtsKeConfig::new("time.cloudflare.com")).await {
//!     Ok(session) => println!("{} cookies", session.cookie_count()),
//!     Err(e) => match e.get_ref().and_then(|i| i.downcast_ref::<NtsClientError>()) {
//!         Some(NtsClientError::Timeout(t)) => eprintln!("timeout: {t}"),
//!         Some(other) => eprintln!("NTS error: {other}"),
//!         None => eprintln!("I/O error: {e}"),
//!     },
//! }
//! # }
//! ```

use std::fmt;
use std::io;

use ntsec_proto::ke::KeError;
use ntsec_proto::protocol::{KissCode, RetryPolicy};

/// Errors that can occur during NTS client operations.
#[derive(Debug)]
pub enum NtsClientError {
    /// The NTP response header failed validation.
    Protocol(ProtocolError),
    /// An operation timed out.
    Timeout(TimeoutError),
    /// Invalid configuration.
    Config(ConfigError),
    /// NTS key establishment or packet authentication failed.
    Nts(NtsError),
    /// The server answered with a Kiss-o'-Death packet.
    KissOfDeath(KissOfDeathError),
    /// Underlying I/O error (socket bind, DNS resolution, TLS).
    Io(io::Error),
}

/// NTP response header validation errors.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ProtocolError {
    /// Response datagram shorter than an NTP header.
    ResponseTooShort {
        /// Number of bytes received.
        received: usize,
    },
    /// Server transmit timestamp is zero.
    ZeroTransmitTimestamp,
    /// Server reports an unsynchronized clock (LI=3 or stratum 16 and above).
    UnsynchronizedServer,
}

/// Which operation ran out of time.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TimeoutError {
    /// Waiting for the NTP response.
    Request,
    /// The NTS-KE exchange.
    NtsKe,
}

/// Configuration errors.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConfigError {
    /// Address resolved to no socket addresses.
    NoAddresses {
        /// The address that failed to resolve.
        address: String,
    },
    /// Invalid server name for TLS.
    InvalidServerName {
        /// Detail about the invalid name.
        detail: String,
    },
    /// The TLS client configuration could not be built.
    InvalidTlsConfig {
        /// Detail from rustls.
        detail: String,
    },
}

/// NTS errors.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NtsError {
    /// NTS-KE framing, negotiation or key export failed.
    KeyExchange(KeError),
    /// The NTS-protected response was rejected.
    Packet(ntsec_proto::NtsError),
    /// The TLS peer did not agree to ALPN `ntske/1`.
    AlpnMismatch,
    /// The server chose an AEAD algorithm this client did not offer.
    UnofferedAlgorithm {
        /// The IANA identifier.
        algorithm: u16,
    },
    /// No cookies are left; run key establishment again.
    NoCookies,
}

/// A Kiss-o'-Death received from the server.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct KissOfDeathError {
    /// The kiss code carried in the reference ID.
    pub code: KissCode,
}

impl KissOfDeathError {
    /// What the client may do next.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.code.retry_policy()
    }
}

impl fmt::Display for KissOfDeathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "server sent Kiss-o'-Death {}: {}",
            self.code,
            self.code.reason()
        )
    }
}

impl fmt::Display for NtsClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NtsClientError::Protocol(e) => write!(f, "NTP protocol error: {e}"),
            NtsClientError::Timeout(e) => write!(f, "timeout: {e}"),
            NtsClientError::Config(e) => write!(f, "config error: {e}"),
            NtsClientError::Nts(e) => write!(f, "NTS error: {e}"),
            NtsClientError::KissOfDeath(e) => write!(f, "{e}"),
            NtsClientError::Io(e) => write!(f, "{e}"),
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::ResponseTooShort { received } => {
                write!(f, "NTP response too short ({received} bytes)")
            }
            ProtocolError::ZeroTransmitTimestamp => {
                write!(f, "server transmit timestamp is zero")
            }
            ProtocolError::UnsynchronizedServer => {
                write!(f, "server reports unsynchronized clock")
            }
        }
    }
}

impl fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutError::Request => write!(f, "NTS request timed out"),
            TimeoutError::NtsKe => write!(f, "NTS-KE exchange timed out"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NoAddresses { address } => {
                write!(f, "address resolved to no socket addresses: {address}")
            }
            ConfigError::InvalidServerName { detail } => {
                write!(f, "invalid server name: {detail}")
            }
            ConfigError::InvalidTlsConfig { detail } => {
                write!(f, "invalid TLS configuration: {detail}")
            }
        }
    }
}

impl fmt::Display for NtsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NtsError::KeyExchange(e) => write!(f, "{e}"),
            NtsError::Packet(e) => write!(f, "{e}"),
            NtsError::AlpnMismatch => write!(f, "server did not negotiate ALPN ntske/1"),
            NtsError::UnofferedAlgorithm { algorithm } => {
                write!(f, "server chose AEAD algorithm {algorithm} which was not offered")
            }
            NtsError::NoCookies => write!(f, "no NTS cookies remaining"),
        }
    }
}

impl std::error::Error for NtsClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NtsClientError::Nts(e) => Some(e),
            NtsClientError::KissOfDeath(e) => Some(e),
            NtsClientError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for ProtocolError {}
impl std::error::Error for TimeoutError {}
impl std::error::Error for ConfigError {}
impl std::error::Error for KissOfDeathError {}

impl std::error::Error for NtsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NtsError::KeyExchange(e) => Some(e),
            NtsError::Packet(e) => Some(e),
            _ => None,
        }
    }
}

impl From<NtsClientError> for io::Error {
    fn from(err: NtsClientError) -> io::Error {
        let kind = match &err {
            NtsClientError::Protocol(_) => io::ErrorKind::InvalidData,
            NtsClientError::Timeout(_) => io::ErrorKind::TimedOut,
            NtsClientError::Config(_) => io::ErrorKind::InvalidInput,
            NtsClientError::Nts(NtsError::KeyExchange(KeError::ServerError { .. })) => {
                io::ErrorKind::ConnectionRefused
            }
            NtsClientError::Nts(NtsError::KeyExchange(KeError::UnexpectedEof)) => {
                io::ErrorKind::UnexpectedEof
            }
            NtsClientError::Nts(_) => io::ErrorKind::InvalidData,
            NtsClientError::KissOfDeath(_) => io::ErrorKind::ConnectionRefused,
            NtsClientError::Io(e) => e.kind(),
        };
        if let NtsClientError::Io(e) = err {
            return e;
        }
        io::Error::new(kind, err)
    }
}

impl From<io::Error> for NtsClientError {
    fn from(err: io::Error) -> Self {
        NtsClientError::Io(err)
    }
}

impl From<ProtocolError> for NtsClientError {
    fn from(err: ProtocolError) -> Self {
        NtsClientError::Protocol(err)
    }
}

impl From<ConfigError> for NtsClientError {
    fn from(err: ConfigError) -> Self {
        NtsClientError::Config(err)
    }
}

impl From<NtsError> for NtsClientError {
    fn from(err: NtsError) -> Self {
        NtsClientError::Nts(err)
    }
}

impl From<KeError> for NtsClientError {
    fn from(err: KeError) -> Self {
        NtsClientError::Nts(NtsError::KeyExchange(err))
    }
}

impl From<ntsec_proto::NtsError> for NtsClientError {
    fn from(err: ntsec_proto::NtsError) -> Self {
        match err {
            ntsec_proto::NtsError::KissOfDeath(code) => {
                NtsClientError::KissOfDeath(KissOfDeathError { code })
            }
            other => NtsClientError::Nts(NtsError::Packet(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ntsec_proto::CryptoError;

    #[test]
    fn test_display() {
        assert_eq!(
            ProtocolError::ResponseTooShort { received: 10 }.to_string(),
            "NTP response too short (10 bytes)"
        );
        assert_eq!(TimeoutError::NtsKe.to_string(), "NTS-KE exchange timed out");
        assert_eq!(NtsError::NoCookies.to_string(), "no NTS cookies remaining");
        assert_eq!(
            KissOfDeathError {
                code: KissCode::Rate
            }
            .to_string(),
            format!("server sent Kiss-o'-Death RATE: {}", KissCode::Rate.reason())
        );
    }

    #[test]
    fn test_io_error_kinds() {
        let cases: Vec<(NtsClientError, io::ErrorKind)> = vec![
            (
                ProtocolError::UnsynchronizedServer.into(),
                io::ErrorKind::InvalidData,
            ),
            (
                NtsClientError::Timeout(TimeoutError::Request),
                io::ErrorKind::TimedOut,
            ),
            (
                ConfigError::NoAddresses {
                    address: "x".into(),
                }
                .into(),
                io::ErrorKind::InvalidInput,
            ),
            (
                KeError::ServerError { code: 1 }.into(),
                io::ErrorKind::ConnectionRefused,
            ),
            (KeError::UnexpectedEof.into(), io::ErrorKind::UnexpectedEof),
            (NtsError::NoCookies.into(), io::ErrorKind::InvalidData),
            (
                ntsec_proto::NtsError::KissOfDeath(KissCode::Deny).into(),
                io::ErrorKind::ConnectionRefused,
            ),
        ];
        for (err, kind) in cases {
            let io_err: io::Error = err.into();
            assert_eq!(io_err.kind(), kind);
        }
    }

    #[test]
    fn test_kiss_of_death_is_lifted() {
        let err: NtsClientError = ntsec_proto::NtsError::KissOfDeath(KissCode::Ntsn).into();
        match err {
            NtsClientError::KissOfDeath(kod) => {
                assert_eq!(kod.code, KissCode::Ntsn);
                assert_eq!(kod.retry_policy(), RetryPolicy::AfterKeyExchange);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_downcast_roundtrip() {
        let err: NtsClientError =
            ntsec_proto::NtsError::Crypto(CryptoError::AuthenticationFailed).into();
        let io_err: io::Error = err.into();
        let inner = io_err
            .get_ref()
            .and_then(|e| e.downcast_ref::<NtsClientError>())
            .unwrap();
        assert!(matches!(
            inner,
            NtsClientError::Nts(NtsError::Packet(e)) if e.is_authentication_failure()
        ));
    }

    #[test]
    fn test_io_error_passthrough() {
        let orig = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        let io_err: io::Error = NtsClientError::Io(orig).into();
        assert_eq!(io_err.kind(), io::ErrorKind::ConnectionReset);
        assert_eq!(io_err.to_string(), "reset");
    }
}
