// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! NTS Key Establishment over TLS 1.3 (RFC 8915 §4).
//!
//! Connects to the NTS-KE server, offers NTPv4 and the configured AEAD
//! algorithms, collects cookies and the advertised NTP server, then derives
//! the session keys from the TLS exporter.
//!
//! ```no_run
//! # async fn example() -> std::io::Result<()> {
//! use ntsec_client::nts_ke::{NtsKeConfig, nts_ke};
//!
//! let ke = nts_ke(&NtsKeConfig::new("time.cloudflare.com")).await?;
//! println!("{} cookies for {}:{}", ke.cookies.len(), ke.ntp_server, ke.ntp_port);
//! # Ok(())
//! # }
//! ```

use std::io;
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

use ntsec_proto::crypto::AeadAlgorithm;
use ntsec_proto::ke::{
    self, DEFAULT_PORT, KeError, KeRecord, KeRecordReader, SessionKeys, export_session_keys,
    process_server_response,
};

use crate::error::{ConfigError, NtsClientError, NtsError, TimeoutError};
use crate::tls_config::{nts_client_config, webpki_root_store};

/// Default NTP port used when the server sends no Port record.
pub const DEFAULT_NTP_PORT: u16 = 123;

/// Default limit on the whole NTS-KE exchange.
pub const DEFAULT_KE_TIMEOUT: Duration = Duration::from_secs(10);

/// Where and how to run NTS key establishment.
#[derive(Clone, Debug)]
pub struct NtsKeConfig {
    server: String,
    port: u16,
    algorithms: Vec<AeadAlgorithm>,
    timeout: Duration,
    tls_config: Option<Arc<rustls::ClientConfig>>,
}

impl NtsKeConfig {
    /// Key establishment with `server` on port 4460, offering both
    /// AES-SIV-CMAC algorithms and trusting the WebPKI roots.
    pub fn new(server: impl Into<String>) -> Self {
        NtsKeConfig {
            server: server.into(),
            port: DEFAULT_PORT,
            algorithms: AeadAlgorithm::SUPPORTED.to_vec(),
            timeout: DEFAULT_KE_TIMEOUT,
            tls_config: None,
        }
    }

    /// Set the NTS-KE port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the AEAD algorithms to offer, most preferred first.
    pub fn algorithms(mut self, algorithms: &[AeadAlgorithm]) -> Self {
        self.algorithms = algorithms.to_vec();
        self
    }

    /// Set the limit on the whole exchange (default: 10 s).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Trust `roots` instead of the WebPKI roots.
    pub fn root_certificates(self, roots: rustls::RootCertStore) -> io::Result<Self> {
        let config = nts_client_config(roots)?;
        Ok(self.tls_config(Arc::new(config)))
    }

    /// Use a prepared TLS client configuration.
    ///
    /// The configuration should offer ALPN `ntske/1` and allow TLS 1.3;
    /// the exchange fails if the server does not negotiate `ntske/1`.
    pub fn tls_config(mut self, config: Arc<rustls::ClientConfig>) -> Self {
        self.tls_config = Some(config);
        self
    }

    /// The NTS-KE server hostname.
    pub fn server(&self) -> &str {
        &self.server
    }

    fn connector(&self) -> Result<TlsConnector, NtsClientError> {
        let config = match &self.tls_config {
            Some(config) => Arc::clone(config),
            None => Arc::new(nts_client_config(webpki_root_store())?),
        };
        Ok(TlsConnector::from(config))
    }
}

/// Result of NTS key establishment.
#[derive(Clone, Debug)]
pub struct NtsKeResult {
    /// Session keys derived from the TLS exporter.
    pub keys: SessionKeys,
    /// Cookies for NTP requests, each to be used once.
    pub cookies: Vec<Vec<u8>>,
    /// NTP server host: the Server record if present, otherwise the NTS-KE host.
    pub ntp_server: String,
    /// NTP server port: the Port record if present, otherwise 123.
    pub ntp_port: u16,
}

/// Perform NTS key establishment as described by `config`.
pub async fn nts_ke(config: &NtsKeConfig) -> io::Result<NtsKeResult> {
    let result = tokio::time::timeout(config.timeout, exchange(config))
        .await
        .map_err(|_| NtsClientError::Timeout(TimeoutError::NtsKe))??;
    Ok(result)
}

async fn exchange(config: &NtsKeConfig) -> Result<NtsKeResult, NtsClientError> {
    let connector = config.connector()?;
    let server_name = ServerName::try_from(config.server.clone()).map_err(|e| {
        ConfigError::InvalidServerName {
            detail: e.to_string(),
        }
    })?;

    debug!(server = %config.server, port = config.port, "NTS-KE connecting");
    let tcp_stream = TcpStream::connect((config.server.as_str(), config.port)).await?;
    let mut tls_stream = connector.connect(server_name, tcp_stream).await?;

    let (_, conn) = tls_stream.get_ref();
    if conn.alpn_protocol() != Some(ke::ALPN_NTSKE) {
        return Err(NtsError::AlpnMismatch.into());
    }

    let request = ke::client_request(&config.algorithms)?;
    tls_stream.write_all(&request).await?;
    tls_stream.flush().await?;

    let records = read_response(&mut tls_stream).await?;
    let outcome = process_server_response(&records)?;
    if !config.algorithms.contains(&outcome.algorithm) {
        return Err(NtsError::UnofferedAlgorithm {
            algorithm: outcome.algorithm.id(),
        }
        .into());
    }

    let (_, conn) = tls_stream.get_ref();
    let keys = export_session_keys(conn, outcome.protocol, outcome.algorithm)?;

    let _ = tls_stream.shutdown().await;

    let ntp_server = outcome.server.unwrap_or_else(|| config.server.clone());
    let ntp_port = outcome.port.unwrap_or(DEFAULT_NTP_PORT);
    debug!(
        algorithm = outcome.algorithm.id(),
        cookies = outcome.cookies.len(),
        %ntp_server,
        ntp_port,
        "NTS-KE complete"
    );

    Ok(NtsKeResult {
        keys,
        cookies: outcome.cookies,
        ntp_server,
        ntp_port,
    })
}

/// Read records until End of Message.
async fn read_response<S>(stream: &mut S) -> Result<Vec<KeRecord>, NtsClientError>
where
    S: AsyncRead + Unpin,
{
    let mut reader = KeRecordReader::new();
    let mut records = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        while let Some(record) = reader.next_record()? {
            let done = record.is_end_of_message();
            records.push(record);
            if done {
                return Ok(records);
            }
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(KeError::UnexpectedEof.into());
        }
        reader.push(&chunk[..n])?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ntsec_proto::ke::{ServerNegotiation, encode_records, server_response};

    #[test]
    fn test_config_defaults() {
        let config = NtsKeConfig::new("time.example");
        assert_eq!(config.server(), "time.example");
        assert_eq!(config.port, 4460);
        assert_eq!(config.algorithms, AeadAlgorithm::SUPPORTED.to_vec());
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert!(config.tls_config.is_none());
    }

    #[test]
    fn test_config_setters() {
        let config = NtsKeConfig::new("time.example")
            .port(14460)
            .algorithms(&[AeadAlgorithm::AesSivCmac512])
            .timeout(Duration::from_secs(2))
            .root_certificates(rustls::RootCertStore::empty())
            .unwrap();
        assert_eq!(config.port, 14460);
        assert_eq!(config.algorithms, vec![AeadAlgorithm::AesSivCmac512]);
        assert_eq!(config.timeout, Duration::from_secs(2));
        assert!(config.tls_config.is_some());
    }

    #[tokio::test]
    async fn test_read_response_across_chunks() {
        let negotiation = ServerNegotiation {
            protocol: 0,
            algorithm: AeadAlgorithm::AesSivCmac256,
        };
        let bytes = server_response(&negotiation, &[vec![5; 100]], None, Some(123)).unwrap();

        let (mut client, mut server) = tokio::io::duplex(7);
        let writer = tokio::spawn(async move {
            server.write_all(&bytes).await.unwrap();
        });
        let records = read_response(&mut client).await.unwrap();
        writer.await.unwrap();

        let outcome = process_server_response(&records).unwrap();
        assert_eq!(outcome.cookies, vec![vec![5; 100]]);
        assert_eq!(outcome.port, Some(123));
    }

    #[tokio::test]
    async fn test_read_response_eof() {
        let bytes = encode_records(&[KeRecord::new_cookie(vec![1; 8])]).unwrap();
        let (mut client, mut server) = tokio::io::duplex(64);
        server.write_all(&bytes).await.unwrap();
        drop(server);
        let err = read_response(&mut client).await.unwrap_err();
        assert!(matches!(
            err,
            NtsClientError::Nts(NtsError::KeyExchange(KeError::UnexpectedEof))
        ));
    }

    #[tokio::test]
    async fn test_connection_refused_is_io_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = NtsKeConfig::new("127.0.0.1")
            .port(port)
            .root_certificates(rustls::RootCertStore::empty())
            .unwrap();
        let err = nts_ke(&config).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
    }
}
