// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

use std::ops::Deref;

use ntsec_proto::protocol::{Header, LeapIndicator, NtpTimestamp, Stratum};

use crate::error::ProtocolError;

/// The result of an NTP request: the server's response header plus the
/// computed timing information.
///
/// Derefs to [`Header`], so header fields can be read directly
/// (e.g. `result.stratum`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NtpResult {
    /// The validated response header.
    pub header: Header,
    /// The destination timestamp (T4): local time when the response arrived.
    pub destination_timestamp: NtpTimestamp,
    /// Clock offset, `((T2 - T1) + (T3 - T4)) / 2` (RFC 5905 §8).
    ///
    /// Positive when the local clock is behind the server.
    pub offset_seconds: f64,
    /// Round-trip delay, `(T4 - T1) - (T3 - T2)` (RFC 5905 §8).
    pub delay_seconds: f64,
}

impl Deref for NtpResult {
    type Target = Header;
    fn deref(&self) -> &Self::Target {
        &self.header
    }
}

/// Compute `(offset, delay)` in seconds from the four on-wire timestamps.
pub fn compute_offset_delay(
    t1: NtpTimestamp,
    t2: NtpTimestamp,
    t3: NtpTimestamp,
    t4: NtpTimestamp,
) -> (f64, f64) {
    let offset = (t2.diff_secs(t1) + t3.diff_secs(t4)) / 2.0;
    let delay = t4.diff_secs(t1) - t3.diff_secs(t2);
    (offset, delay)
}

/// Check the header fields a usable time response must carry and return T3.
pub(crate) fn validate_response_header(header: &Header) -> Result<NtpTimestamp, ProtocolError> {
    if header.leap_indicator == LeapIndicator::Unknown
        || header.stratum >= Stratum::UNSYNCHRONIZED
    {
        return Err(ProtocolError::UnsynchronizedServer);
    }
    match header.transmit_timestamp {
        Some(t3) if t3 != NtpTimestamp::ZERO => Ok(t3),
        _ => Err(ProtocolError::ZeroTransmitTimestamp),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(seconds: u32, millis: u32) -> NtpTimestamp {
        NtpTimestamp::new(seconds, ((millis as u64) << 32).div_ceil(1000) as u32)
    }

    #[test]
    fn test_offset_delay_symmetric_path() {
        // Server 1 s ahead, 100 ms each way, 10 ms processing.
        let t1 = ts(1000, 0);
        let t2 = ts(1001, 100);
        let t3 = ts(1001, 110);
        let t4 = ts(1000, 210);
        let (offset, delay) = compute_offset_delay(t1, t2, t3, t4);
        assert!((offset - 1.0).abs() < 1e-6, "offset {offset}");
        assert!((delay - 0.2).abs() < 1e-6, "delay {delay}");
    }

    #[test]
    fn test_offset_negative_when_local_clock_ahead() {
        let t1 = ts(2000, 0);
        let t2 = ts(1995, 5);
        let t3 = ts(1995, 5);
        let t4 = ts(2000, 10);
        let (offset, delay) = compute_offset_delay(t1, t2, t3, t4);
        assert!((offset + 5.0).abs() < 1e-6, "offset {offset}");
        assert!((delay - 0.010).abs() < 1e-6, "delay {delay}");
    }

    #[test]
    fn test_offset_across_era_boundary() {
        let t1 = ts(u32::MAX, 900);
        let t2 = ts(0, 0);
        let t3 = ts(0, 0);
        let t4 = ts(0, 100);
        let (offset, delay) = compute_offset_delay(t1, t2, t3, t4);
        assert!(offset.abs() < 1e-6, "offset {offset}");
        assert!((delay - 0.2).abs() < 1e-6, "delay {delay}");
    }

    fn synced_header() -> Header {
        let mut header = Header::client_request(ts(1, 0));
        header.leap_indicator = LeapIndicator::NoWarning;
        header.stratum = Stratum(2);
        header
    }

    #[test]
    fn test_validate_response_header() {
        let header = synced_header();
        assert_eq!(validate_response_header(&header), Ok(ts(1, 0)));

        let mut unsynced = header;
        unsynced.leap_indicator = LeapIndicator::Unknown;
        assert_eq!(
            validate_response_header(&unsynced),
            Err(ProtocolError::UnsynchronizedServer)
        );

        let mut stratum16 = header;
        stratum16.stratum = Stratum::UNSYNCHRONIZED;
        assert_eq!(
            validate_response_header(&stratum16),
            Err(ProtocolError::UnsynchronizedServer)
        );

        let mut zero = header;
        zero.transmit_timestamp = Some(NtpTimestamp::ZERO);
        assert_eq!(
            validate_response_header(&zero),
            Err(ProtocolError::ZeroTransmitTimestamp)
        );
    }
}
