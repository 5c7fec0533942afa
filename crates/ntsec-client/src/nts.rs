// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! NTS-protected NTP requests (RFC 8915 §5).
//!
//! An [`NtsSession`] holds the session keys and the cookie pool from one
//! key establishment. Each request spends one cookie and asks for enough
//! placeholders to refill the pool; the server's fresh cookies are taken
//! only from the authenticated, encrypted part of its response.
//!
//! ```no_run
//! # async fn example() -> std::io::Result<()> {
//! use ntsec_client::nts::NtsSession;
//! use ntsec_client::nts_ke::NtsKeConfig;
//!
//! let mut session = NtsSession::from_ke(&NtsKeConfig::new("time.cloudflare.com")).await?;
//! let result = session.request().await?;
//! println!("NTS offset: {:.6}s", result.offset_seconds);
//! # Ok(())
//! # }
//! ```

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tracing::{debug, warn};

use ntsec_proto::crypto::AeadAlgorithm;
use ntsec_proto::ke::SessionKeys;
use ntsec_proto::nts::{AadLayout, OsEntropy, build_client_request, validate_server_response};
use ntsec_proto::protocol::{HEADER_LEN, NtpTimestamp, RetryPolicy};

use crate::error::{ConfigError, NtsClientError, NtsError, ProtocolError, TimeoutError};
use crate::nts_ke::{NtsKeConfig, NtsKeResult, nts_ke};
use crate::request::{NtpResult, compute_offset_delay, validate_response_header};

/// Cookies a session tries to keep on hand.
pub const COOKIE_POOL_TARGET: usize = 8;

/// Default limit on waiting for an NTP response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

const RECV_BUF_LEN: usize = 2048;

/// An NTS session for sending authenticated NTP requests.
///
/// Created via [`NtsSession::from_ke`], which performs key establishment.
pub struct NtsSession {
    keys: SessionKeys,
    cookies: Vec<Vec<u8>>,
    ntp_addr: SocketAddr,
    aad_layout: AadLayout,
}

impl std::fmt::Debug for NtsSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NtsSession")
            .field("algorithm", &self.keys.algorithm)
            .field("cookies", &self.cookies.len())
            .field("ntp_addr", &self.ntp_addr)
            .field("aad_layout", &self.aad_layout)
            .finish_non_exhaustive()
    }
}

impl NtsSession {
    /// Run key establishment as described by `config` and open a session.
    pub async fn from_ke(config: &NtsKeConfig) -> io::Result<Self> {
        let ke = nts_ke(config).await?;
        Self::from_ke_result(ke).await
    }

    /// Open a session from a previously obtained [`NtsKeResult`].
    ///
    /// Resolves the NTP server address once; requests go to the first
    /// address it resolves to.
    pub async fn from_ke_result(ke: NtsKeResult) -> io::Result<Self> {
        let address = format!("{}:{}", ke.ntp_server, ke.ntp_port);
        let ntp_addr = tokio::net::lookup_host(address.as_str())
            .await?
            .next()
            .ok_or_else(|| {
                NtsClientError::Config(ConfigError::NoAddresses {
                    address: address.clone(),
                })
            })?;

        Ok(NtsSession {
            keys: ke.keys,
            cookies: ke.cookies,
            ntp_addr,
            aad_layout: AadLayout::default(),
        })
    }

    /// Select how the authenticator's associated data is laid out.
    ///
    /// Must match the server's setting.
    pub fn with_aad_layout(mut self, layout: AadLayout) -> Self {
        self.aad_layout = layout;
        self
    }

    /// The number of unused cookies.
    pub fn cookie_count(&self) -> usize {
        self.cookies.len()
    }

    /// The AEAD algorithm negotiated during key establishment.
    pub fn aead_algorithm(&self) -> AeadAlgorithm {
        self.keys.algorithm
    }

    /// The NTP server address used for requests.
    pub fn ntp_addr(&self) -> SocketAddr {
        self.ntp_addr
    }

    /// Send an NTS-protected NTP request with a 5 second timeout.
    pub async fn request(&mut self) -> io::Result<NtpResult> {
        self.request_with_timeout(DEFAULT_REQUEST_TIMEOUT).await
    }

    /// Send an NTS-protected NTP request, waiting at most `timeout` for the
    /// response.
    ///
    /// Consumes one cookie. Fresh cookies from the response are added to the
    /// pool. An NTS NAK empties the pool, since none of its cookies will be
    /// accepted; key establishment must be run again.
    pub async fn request_with_timeout(&mut self, timeout: Duration) -> io::Result<NtpResult> {
        match self.request_inner(timeout).await {
            Ok(result) => Ok(result),
            Err(NtsClientError::KissOfDeath(kod)) => {
                warn!(code = %kod.code, reason = kod.code.reason(), "server sent kiss-o'-death");
                if kod.retry_policy() == RetryPolicy::AfterKeyExchange {
                    self.cookies.clear();
                }
                Err(NtsClientError::KissOfDeath(kod).into())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn placeholders_wanted(&self) -> usize {
        // The server returns one cookie for the one spent plus one per placeholder.
        COOKIE_POOL_TARGET
            .saturating_sub(self.cookies.len())
            .saturating_sub(1)
    }

    async fn request_inner(&mut self, timeout: Duration) -> Result<NtpResult, NtsClientError> {
        let cookie = self.cookies.pop().ok_or(NtsError::NoCookies)?;
        let placeholders = self.placeholders_wanted();
        let request = build_client_request(
            &self.keys.c2s,
            &cookie,
            placeholders,
            self.aad_layout,
            &mut OsEntropy,
        )?;

        let bind_addr = if self.ntp_addr.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let sock = UdpSocket::bind(bind_addr).await?;
        sock.connect(self.ntp_addr).await?;

        let mut recv_buf = [0u8; RECV_BUF_LEN];
        let recv_len = tokio::time::timeout(timeout, async {
            sock.send(&request.bytes).await?;
            sock.recv(&mut recv_buf).await
        })
        .await
        .map_err(|_| NtsClientError::Timeout(TimeoutError::Request))??;
        let t4 = NtpTimestamp::now();

        if recv_len < HEADER_LEN {
            return Err(ProtocolError::ResponseTooShort { received: recv_len }.into());
        }

        let response = validate_server_response(
            &recv_buf[..recv_len],
            &self.keys.s2c,
            &request,
            self.aad_layout,
        )?;
        let t3 = validate_response_header(&response.header)?;

        let fresh = response.cookies.len();
        self.cookies.extend(response.cookies);
        debug!(
            fresh,
            remaining = self.cookies.len(),
            "NTS request successful"
        );

        let (offset_seconds, delay_seconds) = compute_offset_delay(
            request.transmit,
            response.header.receive_timestamp,
            t3,
            t4,
        );

        Ok(NtpResult {
            header: response.header,
            destination_timestamp: t4,
            offset_seconds,
            delay_seconds,
        })
    }
}
