// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! NTS server library on the tokio runtime: an NTS-KE listener over TLS 1.3
//! and an NTP server that answers NTS-authenticated requests (RFC 8915).
//!
//! The two servers share a [`cookie::MasterKeyStore`]: the NTS-KE server
//! seals each session's keys into cookies, and the NTP server opens them to
//! verify requests and seal responses. Neither keeps per-client session state.
//!
//! ```no_run
//! # async fn example() -> std::io::Result<()> {
//! use std::sync::{Arc, RwLock};
//! use ntsec_server::cookie::{DEFAULT_GRACE_PERIOD, MasterKeyStore};
//! use ntsec_server::nts_ke_server::{NtsKeServer, NtsKeServerConfig};
//! use ntsec_server::server::NtpServer;
//!
//! let keys = Arc::new(RwLock::new(MasterKeyStore::new(DEFAULT_GRACE_PERIOD)));
//! let ke_config = NtsKeServerConfig::from_pem(
//!     &std::fs::read("server.crt")?,
//!     &std::fs::read("server.key")?,
//! )?;
//! let ke = NtsKeServer::bind(ke_config, keys.clone()).await?;
//! let ntp = NtpServer::builder().nts(keys).build().await?;
//!
//! tokio::try_join!(ke.run(), ntp.run())?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

// Re-export protocol types from ntsec_proto for convenience.
pub use ntsec_proto::{ke, nts, protocol};

/// Server error types.
pub mod error;

/// Master key store and cookie sealing.
pub mod cookie;

/// Runtime-updatable server configuration.
pub mod config;

/// Per-client rate limiting.
pub mod rate_limit;

/// Server-wide system variables.
pub mod state;

mod handler;
mod response;
mod tls_config;

/// NTP server using the Tokio runtime.
pub mod server;

/// NTS-KE server using the Tokio runtime (RFC 8915).
pub mod nts_ke_server;
