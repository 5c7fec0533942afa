// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! NTS client library on the tokio runtime (RFC 8915).
//!
//! Key establishment runs over TLS 1.3 with [`nts_ke`]; the resulting keys
//! and cookies feed an [`nts::NtsSession`] that sends authenticated NTP
//! requests and reports clock offset and round-trip delay.
//!
//! ```no_run
//! # async fn example() -> std::io::Result<()> {
//! use ntsec_client::nts::NtsSession;
//! use ntsec_client::nts_ke::NtsKeConfig;
//!
//! let config = NtsKeConfig::new("time.cloudflare.com");
//! let mut session = NtsSession::from_ke(&config).await?;
//! let result = session.request().await?;
//! println!(
//!     "offset {:+.6}s delay {:.6}s stratum {}",
//!     result.offset_seconds, result.delay_seconds, result.stratum.0
//! );
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

// Re-export protocol types from ntsec_proto for convenience.
pub use ntsec_proto::{ke, protocol};

/// Client error types.
pub mod error;

/// NTS key establishment over TLS.
pub mod nts_ke;

/// NTS-protected NTP requests.
pub mod nts;

mod request;
mod tls_config;

pub use request::{NtpResult, compute_offset_delay};
