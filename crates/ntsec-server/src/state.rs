// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

use ntsec_proto::protocol::{LeapIndicator, NtpTimestamp, ReferenceId, ShortFormat, Stratum};

/// Server-wide system variables (RFC 5905 Section 11).
///
/// Included in every response. They can be updated at runtime (for example
/// when the server synchronizes to a new upstream source) through the
/// `Arc<RwLock<ServerSystemState>>` returned by
/// [`NtpServer::system_state()`](crate::server::NtpServer::system_state).
#[derive(Clone, Debug)]
pub struct ServerSystemState {
    /// Leap indicator warning of impending leap second.
    pub leap_indicator: LeapIndicator,
    /// Stratum level of this server.
    pub stratum: Stratum,
    /// Precision of the server's clock, in log2 seconds (e.g., -20 ≈ 1μs).
    pub precision: i8,
    /// Total round-trip delay to the primary reference source.
    pub root_delay: ShortFormat,
    /// Total dispersion to the primary reference source.
    pub root_dispersion: ShortFormat,
    /// Reference clock identifier (e.g., GPS, LOCL, or upstream server IP).
    pub reference_id: ReferenceId,
    /// Time when the system clock was last set or corrected.
    pub reference_timestamp: NtpTimestamp,
}

impl Default for ServerSystemState {
    fn default() -> Self {
        ServerSystemState {
            leap_indicator: LeapIndicator::NoWarning,
            stratum: Stratum::PRIMARY,
            precision: -20,
            root_delay: ShortFormat::default(),
            root_dispersion: ShortFormat::default(),
            reference_id: ReferenceId::from_ascii(*b"LOCL"),
            reference_timestamp: NtpTimestamp::now(),
        }
    }
}
