// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Conversions between [`NtpTimestamp`] and [`SystemTime`].
//!
//! NTP seconds count from 1900-01-01 and wrap every 2^32 seconds (an "era").
//! [`NtpTimestamp::to_system_time`] assumes era 0 (1900-2036);
//! [`NtpTimestamp::to_system_time_with_pivot`] picks the era that places the
//! result within half an era of a known-good pivot time.
//!
//! Fractions are truncated when converting to NTP and rounded up when
//! converting back, so a `SystemTime` survives the round trip exactly and an
//! NTP fraction moves by at most 2^32 / 10^9 units.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::protocol::NtpTimestamp;

/// The number of seconds from 1st January 1900 UTC to the start of the Unix epoch.
pub const EPOCH_DELTA: i64 = 2_208_988_800;

/// The number of seconds in one NTP era (2^32 seconds, approximately 136 years).
pub const ERA_SECONDS: i64 = 1 << 32;

const NANOS_PER_SEC: u64 = 1_000_000_000;

fn fraction_to_nanos(fraction: u32) -> u32 {
    let nanos = (fraction as u64 * NANOS_PER_SEC).div_ceil(1 << 32);
    nanos.min(NANOS_PER_SEC - 1) as u32
}

fn nanos_to_fraction(nanos: u32) -> u32 {
    (((nanos as u64) << 32) / NANOS_PER_SEC) as u32
}

// Candidate in the pivot's era, moved to a neighbouring era when more than
// half an era away.
fn era_aware_ntp_seconds(raw_seconds: u32, pivot_ntp: i64) -> i64 {
    let pivot_era = pivot_ntp.div_euclid(ERA_SECONDS);
    let candidate = pivot_era * ERA_SECONDS + raw_seconds as i64;
    let diff = candidate - pivot_ntp;
    if diff > ERA_SECONDS / 2 {
        candidate - ERA_SECONDS
    } else if diff < -(ERA_SECONDS / 2) {
        candidate + ERA_SECONDS
    } else {
        candidate
    }
}

/// Signed seconds and nanoseconds since the Unix epoch.
fn unix_parts(time: SystemTime) -> (i64, u32) {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => (d.as_secs() as i64, d.subsec_nanos()),
        Err(e) => {
            let d = e.duration();
            let (secs, nanos) = (d.as_secs() as i64, d.subsec_nanos());
            if nanos == 0 {
                (-secs, 0)
            } else {
                (-secs - 1, NANOS_PER_SEC as u32 - nanos)
            }
        }
    }
}

fn system_time_from_unix(secs: i64, nanos: u32) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::new(secs as u64, nanos)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs()) + Duration::from_nanos(nanos as u64)
    }
}

impl NtpTimestamp {
    /// The current system time as an NTP timestamp.
    pub fn now() -> Self {
        NtpTimestamp::from_system_time(SystemTime::now())
    }

    /// Convert a system time, wrapping the seconds into the 32-bit era field.
    pub fn from_system_time(time: SystemTime) -> Self {
        let (secs, nanos) = unix_parts(time);
        let ntp_secs = (secs + EPOCH_DELTA).rem_euclid(ERA_SECONDS) as u32;
        NtpTimestamp::new(ntp_secs, nanos_to_fraction(nanos))
    }

    /// Convert to system time assuming era 0 (1900-01-01 to 2036-02-07).
    pub fn to_system_time(self) -> SystemTime {
        let unix = self.seconds() as i64 - EPOCH_DELTA;
        system_time_from_unix(unix, fraction_to_nanos(self.fraction()))
    }

    /// Convert to system time, choosing the era closest to `pivot`.
    pub fn to_system_time_with_pivot(self, pivot: SystemTime) -> SystemTime {
        let (pivot_secs, _) = unix_parts(pivot);
        let ntp = era_aware_ntp_seconds(self.seconds(), pivot_secs + EPOCH_DELTA);
        system_time_from_unix(ntp - EPOCH_DELTA, fraction_to_nanos(self.fraction()))
    }
}

impl From<SystemTime> for NtpTimestamp {
    fn from(time: SystemTime) -> Self {
        NtpTimestamp::from_system_time(time)
    }
}
