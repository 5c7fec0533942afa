// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! NTS-KE (Key Establishment) server using the Tokio runtime (RFC 8915).
//!
//! Accepts TLS 1.3 connections from NTS clients, negotiates NTPv4 and an
//! AEAD algorithm, exports the session keys, seals them into cookies and
//! sends the cookies back.
//!
//! # Example
//!
//! ```no_run
//! # async fn example() -> std::io::Result<()> {
//! use ntsec_server::cookie::MasterKeyStore;
//! use ntsec_server::nts_ke_server::{NtsKeServer, NtsKeServerConfig};
//! use std::sync::{Arc, RwLock};
//! use std::time::Duration;
//!
//! let key_store = Arc::new(RwLock::new(MasterKeyStore::new(Duration::from_secs(86400))));
//!
//! // Load your TLS certificate and private key.
//! let cert_pem = std::fs::read("server.crt")?;
//! let key_pem = std::fs::read("server.key")?;
//!
//! let config = NtsKeServerConfig::from_pem(&cert_pem, &key_pem)?;
//!
//! let server = NtsKeServer::bind(config, key_store).await?;
//! server.run().await
//! # }
//! ```

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls_pki_types::pem::PemObject;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info};

use ntsec_proto::crypto::AeadAlgorithm;
use ntsec_proto::ke::{
    self, ALPN_NTSKE, DEFAULT_PORT, KeError, KeRecord, KeRecordReader, KeyingMaterialExporter,
    ServerDecision,
};
use ntsec_proto::nts::OsEntropy;

use crate::cookie::MasterKeyStore;
use crate::error::{ConfigError, NtpServerError, NtsError};

/// Configuration for an NTS-KE server.
pub struct NtsKeServerConfig {
    /// TLS certificate chain (DER encoded).
    pub cert_chain: Vec<CertificateDer<'static>>,
    /// Private key corresponding to the certificate (DER encoded).
    pub private_key: PrivateKeyDer<'static>,
    /// Listen address (default: `"[::]:4460"`).
    pub listen_addr: String,
    /// NTP server hostname to advertise to clients via the Server record.
    /// If `None`, clients use the NTS-KE server hostname.
    pub ntp_server: Option<String>,
    /// NTP port to advertise to clients via the Port record.
    /// If `None`, clients use the default port 123.
    pub ntp_port: Option<u16>,
    /// Number of cookies to issue per NTS-KE session (default: 8).
    pub cookie_count: usize,
    /// Limit on each TLS handshake, record read and response write (default: 10 s).
    pub io_timeout: Duration,
    /// AEAD algorithms the server accepts (default: both AES-SIV-CMAC variants).
    pub algorithms: Vec<AeadAlgorithm>,
}

impl std::fmt::Debug for NtsKeServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NtsKeServerConfig")
            .field("cert_chain", &self.cert_chain.len())
            .field("listen_addr", &self.listen_addr)
            .field("ntp_server", &self.ntp_server)
            .field("ntp_port", &self.ntp_port)
            .field("cookie_count", &self.cookie_count)
            .field("io_timeout", &self.io_timeout)
            .field("algorithms", &self.algorithms)
            .finish_non_exhaustive()
    }
}

impl NtsKeServerConfig {
    /// Create a config from PEM-encoded certificate and private key bytes.
    ///
    /// Input without any certificate block is rejected.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> io::Result<Self> {
        let invalid = |detail: String| -> io::Error {
            NtpServerError::Config(ConfigError::InvalidTlsCredentials { detail }).into()
        };

        let certs: Vec<CertificateDer<'static>> = CertificateDer::pem_slice_iter(cert_pem)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| invalid(e.to_string()))?;
        if certs.is_empty() {
            return Err(invalid("no certificate found in PEM input".to_string()));
        }

        let key = PrivateKeyDer::from_pem_slice(key_pem).map_err(|e| invalid(e.to_string()))?;

        Ok(NtsKeServerConfig {
            cert_chain: certs,
            private_key: key,
            listen_addr: format!("[::]:{DEFAULT_PORT}"),
            ntp_server: None,
            ntp_port: None,
            cookie_count: 8,
            io_timeout: Duration::from_secs(10),
            algorithms: AeadAlgorithm::SUPPORTED.to_vec(),
        })
    }
}

/// Per-server settings every connection task needs.
struct KeSettings {
    key_store: Arc<RwLock<MasterKeyStore>>,
    ntp_server: Option<String>,
    ntp_port: Option<u16>,
    cookie_count: usize,
    io_timeout: Duration,
    algorithms: Vec<AeadAlgorithm>,
}

/// An NTS-KE server that accepts TLS connections and issues NTS cookies.
pub struct NtsKeServer {
    listener: TcpListener,
    tls_acceptor: TlsAcceptor,
    settings: Arc<KeSettings>,
}

impl NtsKeServer {
    /// Build the TLS configuration and bind the listener.
    pub async fn bind(
        config: NtsKeServerConfig,
        key_store: Arc<RwLock<MasterKeyStore>>,
    ) -> io::Result<Self> {
        let tls_config =
            crate::tls_config::nts_server_config(config.cert_chain, config.private_key)?;
        let listener = TcpListener::bind(&config.listen_addr).await.map_err(|e| {
            NtpServerError::Config(ConfigError::InvalidListenAddress {
                address: config.listen_addr.clone(),
                detail: e.to_string(),
            })
        })?;
        info!(addr = %listener.local_addr()?, "NTS-KE server listening");

        Ok(NtsKeServer {
            listener,
            tls_acceptor: TlsAcceptor::from(Arc::new(tls_config)),
            settings: Arc::new(KeSettings {
                key_store,
                ntp_server: config.ntp_server,
                ntp_port: config.ntp_port,
                cookie_count: config.cookie_count,
                io_timeout: config.io_timeout,
                algorithms: config.algorithms,
            }),
        })
    }

    /// The local address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the NTS-KE server, accepting connections indefinitely.
    pub async fn run(self) -> io::Result<()> {
        let (_tx, rx) = watch::channel(false);
        self.run_until(rx).await
    }

    /// Accept connections until `shutdown` carries `true`.
    ///
    /// Connections already accepted run to completion on their own tasks.
    pub async fn run_until(self, mut shutdown: watch::Receiver<bool>) -> io::Result<()> {
        let mut shutdown_open = true;
        loop {
            if *shutdown.borrow() {
                break;
            }
            let (tcp_stream, peer_addr) = tokio::select! {
                accepted = self.listener.accept() => accepted?,
                changed = shutdown.changed(), if shutdown_open => {
                    shutdown_open = changed.is_ok();
                    continue;
                }
            };
            debug!(%peer_addr, "NTS-KE connection");

            let acceptor = self.tls_acceptor.clone();
            let settings = Arc::clone(&self.settings);
            tokio::spawn(async move {
                if let Err(e) = handle_connection(acceptor, tcp_stream, &settings).await {
                    debug!(%peer_addr, error = %e, "NTS-KE session failed");
                }
            });
        }
        info!("NTS-KE server stopped");
        Ok(())
    }
}

async fn with_timeout<T>(
    limit: Duration,
    what: &'static str,
    fut: impl Future<Output = io::Result<T>>,
) -> io::Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, format!("NTS-KE {what} timed out")))?
}

/// Read records until End of Message.
async fn read_request<S>(stream: &mut S) -> io::Result<Vec<KeRecord>>
where
    S: AsyncRead + Unpin,
{
    let mut reader = KeRecordReader::new();
    let mut records = Vec::new();
    let mut chunk = [0u8; 1024];
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

/// Handle a single NTS-KE client connection.
async fn handle_connection(
    acceptor: TlsAcceptor,
    tcp_stream: TcpStream,
    settings: &KeSettings,
) -> io::Result<()> {
    let limit = settings.io_timeout;
    let mut tls_stream = with_timeout(limit, "handshake", acceptor.accept(tcp_stream)).await?;

    let (_, conn) = tls_stream.get_ref();
    if conn.alpn_protocol() != Some(ALPN_NTSKE) {
        return Err(NtpServerError::Nts(NtsError::AlpnMismatch).into());
    }

    let records = with_timeout(limit, "request read", read_request(&mut tls_stream)).await?;
    let (_, conn) = tls_stream.get_ref();
    let response = respond(&records, conn, settings)?;

    with_timeout(limit, "response write", async {
        tls_stream.write_all(&response).await?;
        tls_stream.flush().await?;
        tls_stream.shutdown().await
    })
    .await
}

/// Evaluate one client request and encode the reply.
///
/// Session keys are exported before anything is written back, so they come
/// from a handshake that is complete and unchanged.
fn respond(
    records: &[KeRecord],
    exporter: &(impl KeyingMaterialExporter + ?Sized),
    settings: &KeSettings,
) -> Result<Vec<u8>, NtpServerError> {
    let negotiation = match ke::process_client_request(records, &settings.algorithms) {
        ServerDecision::Accept(negotiation) => negotiation,
        ServerDecision::Reject { code } => {
            debug!(code, "rejecting NTS-KE request");
            return Ok(ke::error_response(code)?);
        }
    };

    let keys = ke::export_session_keys(exporter, negotiation.protocol, negotiation.algorithm)?;
    let cookies = {
        let store = settings
            .key_store
            .read()
            .map_err(|_| NtsError::KeyStorePoisoned)?;
        let mut entropy = OsEntropy;
        (0..settings.cookie_count)
            .map(|_| store.encrypt_cookie(&keys, &mut entropy))
            .collect::<Result<Vec<_>, _>>()
            .map_err(ntsec_proto::NtsError::from)?
    };

    debug!(
        algorithm = negotiation.algorithm.id(),
        cookies = cookies.len(),
        "NTS-KE session established"
    );
    Ok(ke::server_response(
        &negotiation,
        &cookies,
        settings.ntp_server.as_deref(),
        settings.ntp_port,
    )?)
}
