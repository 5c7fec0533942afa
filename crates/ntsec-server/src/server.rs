// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! NTP/NTS server using the Tokio runtime.
//!
//! One receive loop per socket; each datagram is handed to its own task
//! (parse, process, encode, send), so a slow NTS request never delays the
//! next `recv_from`.
//!
//! # Examples
//!
//! ```no_run
//! # async fn example() -> std::io::Result<()> {
//! use std::sync::{Arc, RwLock};
//! use ntsec_server::cookie::{DEFAULT_GRACE_PERIOD, MasterKeyStore};
//! use ntsec_server::server::NtpServer;
//!
//! let keys = Arc::new(RwLock::new(MasterKeyStore::new(DEFAULT_GRACE_PERIOD)));
//! let server = NtpServer::builder()
//!     .listen("[::]:123")
//!     .stratum(ntsec_server::protocol::Stratum(2))
//!     .nts(keys)
//!     .build()
//!     .await?;
//!
//! server.run().await
//! # }
//! ```

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use ntsec_proto::nts::{AadLayout, OsEntropy};
use ntsec_proto::protocol::{LeapIndicator, ReferenceId, ShortFormat, Stratum};

use crate::config::{ConfigHandle, ServerConfig};
use crate::cookie::MasterKeyStore;
use crate::error::{ConfigError, NtpServerError};
use crate::handler::{HandleResult, RequestContext, handle_request};
use crate::rate_limit::{ClientTable, RateLimitConfig};
use crate::state::ServerSystemState;

/// Largest datagram the server reads.
const RECV_BUF_LEN: usize = 4096;

/// Builder for configuring and creating an [`NtpServer`].
#[derive(Debug)]
pub struct NtpServerBuilder {
    listen_addr: String,
    system_state: ServerSystemState,
    config: ServerConfig,
    max_clients: usize,
    key_store: Option<Arc<RwLock<MasterKeyStore>>>,
}

impl NtpServerBuilder {
    fn new() -> Self {
        NtpServerBuilder {
            listen_addr: "[::]:123".to_string(),
            system_state: ServerSystemState::default(),
            config: ServerConfig::default(),
            max_clients: 100_000,
            key_store: None,
        }
    }

    /// Set the listen address (default: `"[::]:123"`).
    pub fn listen(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = addr.into();
        self
    }

    /// Set the server's stratum level.
    pub fn stratum(mut self, stratum: Stratum) -> Self {
        self.system_state.stratum = stratum;
        self
    }

    /// Set the server's reference identifier.
    pub fn reference_id(mut self, id: ReferenceId) -> Self {
        self.system_state.reference_id = id;
        self
    }

    /// Set the server's clock precision in log2 seconds (e.g., -20 ≈ 1μs).
    pub fn precision(mut self, precision: i8) -> Self {
        self.system_state.precision = precision;
        self
    }

    /// Set the server's leap indicator.
    pub fn leap_indicator(mut self, li: LeapIndicator) -> Self {
        self.system_state.leap_indicator = li;
        self
    }

    /// Set the server's root delay.
    pub fn root_delay(mut self, delay: ShortFormat) -> Self {
        self.system_state.root_delay = delay;
        self
    }

    /// Set the server's root dispersion.
    pub fn root_dispersion(mut self, dispersion: ShortFormat) -> Self {
        self.system_state.root_dispersion = dispersion;
        self
    }

    /// Enable per-client rate limiting.
    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.config.rate_limit = Some(config);
        self
    }

    /// Maximum number of clients tracked for rate limiting (default: 100 000).
    pub fn max_clients(mut self, max: usize) -> Self {
        self.max_clients = max;
        self
    }

    /// Associated data layout for NTS authenticators (default: per field).
    pub fn aad_layout(mut self, layout: AadLayout) -> Self {
        self.config.aad_layout = layout;
        self
    }

    /// Drop requests that are not NTS-protected.
    pub fn require_nts(mut self, require: bool) -> Self {
        self.config.require_nts = require;
        self
    }

    /// Serve NTS requests with cookies sealed under `key_store`.
    ///
    /// Share the same store with the [`NtsKeServer`](crate::nts_ke_server::NtsKeServer)
    /// that issues the cookies.
    pub fn nts(mut self, key_store: Arc<RwLock<MasterKeyStore>>) -> Self {
        self.key_store = Some(key_store);
        self
    }

    /// Build the server. Binds to the configured listen address.
    pub async fn build(self) -> io::Result<NtpServer> {
        if self.config.require_nts && self.key_store.is_none() {
            return Err(NtpServerError::Config(ConfigError::Other(
                "require_nts set without a master key store".to_string(),
            ))
            .into());
        }
        let sock = UdpSocket::bind(&self.listen_addr).await.map_err(|e| {
            NtpServerError::Config(ConfigError::InvalidListenAddress {
                address: self.listen_addr.clone(),
                detail: e.to_string(),
            })
        })?;
        info!(addr = %sock.local_addr()?, nts = self.key_store.is_some(), "NTP server listening");

        Ok(NtpServer {
            sock: Arc::new(sock),
            shared: Arc::new(Shared {
                system_state: Arc::new(RwLock::new(self.system_state)),
                config: Arc::new(RwLock::new(self.config)),
                clients: Mutex::new(ClientTable::new(self.max_clients)),
                key_store: self.key_store,
            }),
        })
    }
}

/// State shared by every datagram task.
struct Shared {
    system_state: Arc<RwLock<ServerSystemState>>,
    config: Arc<RwLock<ServerConfig>>,
    clients: Mutex<ClientTable>,
    key_store: Option<Arc<RwLock<MasterKeyStore>>>,
}

impl Shared {
    fn handle(&self, buf: &[u8], src: SocketAddr) -> HandleResult {
        // Snapshot so no lock is held while cookies are sealed.
        let state = self
            .system_state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let config = self
            .config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let ctx = RequestContext {
            state: &state,
            config: &config,
            clients: &self.clients,
            key_store: self.key_store.as_deref(),
        };
        handle_request(buf, src.ip(), &ctx, &mut OsEntropy)
    }
}

/// An NTP server that responds to client requests, with NTS when configured.
///
/// Created via [`NtpServer::builder()`].
pub struct NtpServer {
    sock: Arc<UdpSocket>,
    shared: Arc<Shared>,
}

impl NtpServer {
    /// Create a builder for configuring the server.
    pub fn builder() -> NtpServerBuilder {
        NtpServerBuilder::new()
    }

    /// The server's system state, for updates when the upstream reference changes.
    pub fn system_state(&self) -> &Arc<RwLock<ServerSystemState>> {
        &self.shared.system_state
    }

    /// A handle for updating server configuration at runtime.
    ///
    /// Updates take effect on the next incoming request.
    pub fn config_handle(&self) -> ConfigHandle {
        ConfigHandle::new(self.shared.config.clone())
    }

    /// The local address the server is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.sock.local_addr()
    }

    /// Run the server indefinitely.
    ///
    /// Returns only when the socket fails.
    pub async fn run(self) -> io::Result<()> {
        let (_tx, rx) = watch::channel(false);
        self.run_until(rx).await
    }

    /// Run the server until `shutdown` carries `true`.
    ///
    /// The flag is checked between datagrams; tasks already spawned are
    /// left to finish.
    pub async fn run_until(self, mut shutdown: watch::Receiver<bool>) -> io::Result<()> {
        let mut recv_buf = [0u8; RECV_BUF_LEN];
        let mut shutdown_open = true;
        loop {
            if *shutdown.borrow() {
                break;
            }
            let (len, src) = tokio::select! {
                received = self.sock.recv_from(&mut recv_buf) => received?,
                changed = shutdown.changed(), if shutdown_open => {
                    // With every sender gone nobody can ask us to stop.
                    shutdown_open = changed.is_ok();
                    continue;
                }
            };
            self.dispatch(&recv_buf[..len], src);
        }
        info!("NTP server stopped");
        Ok(())
    }

    fn dispatch(&self, datagram: &[u8], src: SocketAddr) {
        trace!(%src, len = datagram.len(), "datagram received");
        let datagram = datagram.to_vec();
        let sock = Arc::clone(&self.sock);
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            match shared.handle(&datagram, src) {
                HandleResult::Response(buf) => {
                    if let Err(e) = sock.send_to(&buf, src).await {
                        debug!(%src, error = %e, "failed to send response");
                    }
                }
                HandleResult::Drop => trace!(%src, "dropped datagram"),
            }
        });
    }
}

/// Rotate `key_store` every `interval` until `shutdown` carries `true`.
///
/// Each rotation also purges retired keys past their grace period.
pub fn spawn_key_rotation(
    key_store: Arc<RwLock<MasterKeyStore>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match key_store.write() {
                        Ok(mut store) => store.rotate(),
                        Err(_) => {
                            warn!("master key store lock poisoned; stopping rotation");
                            return;
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    })
}
