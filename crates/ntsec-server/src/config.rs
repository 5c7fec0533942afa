// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Runtime-updatable server configuration.
//!
//! [`ServerConfig`] bundles rate limiting, the authenticator AAD layout and
//! the NTS requirement behind an `Arc<RwLock<>>` so they can be changed while
//! the server is running.
//!
//! # Examples
//!
//! ```no_run
//! # async fn example() -> std::io::Result<()> {
//! use ntsec_server::server::NtpServer;
//!
//! let server = NtpServer::builder()
//!     .listen("[::]:1234")
//!     .build()
//!     .await?;
//!
//! let config = server.config_handle();
//! config.update(|c| c.require_nts = true);
//! assert!(config.snapshot().require_nts);
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, PoisonError, RwLock};

use ntsec_proto::nts::AadLayout;

use crate::rate_limit::RateLimitConfig;

/// Runtime-updatable server configuration.
///
/// Read once per incoming request (synchronous read lock, never held across
/// an `await` point).
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ServerConfig {
    /// Optional per-client rate limiting.
    pub rate_limit: Option<RateLimitConfig>,
    /// How the authenticator's associated data is split.
    pub aad_layout: AadLayout,
    /// Drop requests that carry no NTS cookie.
    pub require_nts: bool,
}

/// A cloneable handle for updating server configuration at runtime.
///
/// Cloning this handle is cheap (it shares the inner `Arc`).
#[derive(Clone, Debug)]
pub struct ConfigHandle {
    inner: Arc<RwLock<ServerConfig>>,
}

impl ConfigHandle {
    /// Wrap shared configuration.
    pub fn new(inner: Arc<RwLock<ServerConfig>>) -> Self {
        Self { inner }
    }

    /// Apply a mutation to the server configuration.
    ///
    /// The write lock is held only for the duration of the closure. A lock
    /// poisoned by a panicking writer is recovered, since every field is
    /// valid on its own.
    pub fn update(&self, f: impl FnOnce(&mut ServerConfig)) {
        let mut config = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut config);
    }

    /// A point-in-time copy of the configuration.
    pub fn snapshot(&self) -> ServerConfig {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
