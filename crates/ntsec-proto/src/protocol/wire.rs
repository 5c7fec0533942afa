// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Big-endian encoding of the header types.

use byteorder::{BigEndian, ByteOrder};

use super::traits::ensure_len;
use super::{
    ConstPackedSizeBytes, FromBytes, Header, LeapIndicator, Mode, NtpTimestamp, ReferenceId,
    ShortFormat, Stratum, ToBytes, Version,
};
use crate::error::ParseError;

impl ConstPackedSizeBytes for ShortFormat {
    const PACKED_SIZE_BYTES: usize = 4;
}

impl ConstPackedSizeBytes for NtpTimestamp {
    const PACKED_SIZE_BYTES: usize = 8;
}

impl ConstPackedSizeBytes for ReferenceId {
    const PACKED_SIZE_BYTES: usize = 4;
}

impl ConstPackedSizeBytes for Header {
    const PACKED_SIZE_BYTES: usize = 48;
}

impl FromBytes for NtpTimestamp {
    fn from_bytes(buf: &[u8]) -> Result<(Self, usize), ParseError> {
        ensure_len(buf, Self::PACKED_SIZE_BYTES)?;
        Ok((NtpTimestamp::from_bits(BigEndian::read_u64(buf)), 8))
    }
}

impl ToBytes for NtpTimestamp {
    fn to_bytes(&self, buf: &mut [u8]) -> Result<usize, ParseError> {
        ensure_len(buf, Self::PACKED_SIZE_BYTES)?;
        BigEndian::write_u64(buf, self.to_bits());
        Ok(8)
    }
}

impl FromBytes for ShortFormat {
    fn from_bytes(buf: &[u8]) -> Result<(Self, usize), ParseError> {
        ensure_len(buf, Self::PACKED_SIZE_BYTES)?;
        Ok((ShortFormat::from_bits(BigEndian::read_u32(buf)), 4))
    }
}

impl ToBytes for ShortFormat {
    fn to_bytes(&self, buf: &mut [u8]) -> Result<usize, ParseError> {
        ensure_len(buf, Self::PACKED_SIZE_BYTES)?;
        BigEndian::write_u32(buf, self.to_bits());
        Ok(4)
    }
}

impl FromBytes for Header {
    fn from_bytes(buf: &[u8]) -> Result<(Self, usize), ParseError> {
        ensure_len(buf, Self::PACKED_SIZE_BYTES)?;
        let b0 = buf[0];
        let header = Header {
            leap_indicator: LeapIndicator::from_bits(b0 >> 6),
            version: Version::from_bits(b0 >> 3),
            mode: Mode::from_bits(b0),
            stratum: Stratum(buf[1]),
            poll: buf[2] as i8,
            precision: buf[3] as i8,
            root_delay: ShortFormat::from_bits(BigEndian::read_u32(&buf[4..8])),
            root_dispersion: ShortFormat::from_bits(BigEndian::read_u32(&buf[8..12])),
            reference_id: ReferenceId([buf[12], buf[13], buf[14], buf[15]]),
            reference_timestamp: NtpTimestamp::from_bits(BigEndian::read_u64(&buf[16..24])),
            origin_timestamp: NtpTimestamp::from_bits(BigEndian::read_u64(&buf[24..32])),
            receive_timestamp: NtpTimestamp::from_bits(BigEndian::read_u64(&buf[32..40])),
            transmit_timestamp: Some(NtpTimestamp::from_bits(BigEndian::read_u64(
                &buf[40..48],
            ))),
        };
        Ok((header, Self::PACKED_SIZE_BYTES))
    }
}

impl ToBytes for Header {
    fn to_bytes(&self, buf: &mut [u8]) -> Result<usize, ParseError> {
        ensure_len(buf, Self::PACKED_SIZE_BYTES)?;
        buf[0] = ((self.leap_indicator as u8) << 6)
            | ((self.version.value() & 0b111) << 3)
            | (self.mode as u8);
        buf[1] = self.stratum.0;
        buf[2] = self.poll as u8;
        buf[3] = self.precision as u8;
        BigEndian::write_u32(&mut buf[4..8], self.root_delay.to_bits());
        BigEndian::write_u32(&mut buf[8..12], self.root_dispersion.to_bits());
        buf[12..16].copy_from_slice(&self.reference_id.0);
        BigEndian::write_u64(&mut buf[16..24], self.reference_timestamp.to_bits());
        BigEndian::write_u64(&mut buf[24..32], self.origin_timestamp.to_bits());
        BigEndian::write_u64(&mut buf[32..40], self.receive_timestamp.to_bits());
        let transmit = self.transmit_timestamp.unwrap_or_else(NtpTimestamp::now);
        BigEndian::write_u64(&mut buf[40..48], transmit.to_bits());
        Ok(Self::PACKED_SIZE_BYTES)
    }
}

impl Header {
    /// Decode the first 48 bytes of `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self, ParseError> {
        Header::from_bytes(buf).map(|(header, _)| header)
    }

    /// Encode into a fresh 48-byte array, stamping the current time if no
    /// transmit timestamp is set.
    pub fn encode(&self) -> [u8; 48] {
        let mut buf = [0u8; 48];
        // The array is exactly PACKED_SIZE_BYTES, so this cannot fail.
        let _ = self.to_bytes(&mut buf);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::KissCode;

    #[test]
    fn test_all_zero_header() {
        let header = Header::decode(&[0u8; 48]).unwrap();
        assert_eq!(header.leap_indicator, LeapIndicator::NoWarning);
        assert_eq!(header.version.value(), 0);
        assert_eq!(header.mode, Mode::Reserved);
        assert_eq!(header.stratum, Stratum(0));
        assert_eq!(header.reference_timestamp, NtpTimestamp::ZERO);
        assert_eq!(header.origin_timestamp, NtpTimestamp::ZERO);
        assert_eq!(header.receive_timestamp, NtpTimestamp::ZERO);
        assert_eq!(header.transmit_timestamp, Some(NtpTimestamp::ZERO));
    }

    #[test]
    fn test_short_buffer() {
        assert_eq!(
            Header::decode(&[0u8; 47]).unwrap_err(),
            ParseError::BufferTooShort {
                needed: 48,
                available: 47
            }
        );
    }

    #[test]
    fn test_field_offsets() {
        let mut buf = [0u8; 48];
        buf[0] = 0b11_100_100; // LI=3, VN=4, Mode=4
        buf[1] = 2;
        buf[2] = 6;
        buf[3] = 0xec; // -20
        buf[4..8].copy_from_slice(&[0, 1, 0x80, 0]);
        buf[12..16].copy_from_slice(b"GPS\0");
        buf[16] = 0x11;
        buf[24] = 0x22;
        buf[32] = 0x33;
        buf[40] = 0x44;
        buf[47] = 0x55;

        let h = Header::decode(&buf).unwrap();
        assert_eq!(h.leap_indicator, LeapIndicator::Unknown);
        assert_eq!(h.version, Version::V4);
        assert_eq!(h.mode, Mode::Server);
        assert_eq!(h.stratum, Stratum(2));
        assert_eq!(h.poll, 6);
        assert_eq!(h.precision, -20);
        assert_eq!(h.root_delay.as_secs_f64(), 1.5);
        assert_eq!(h.reference_id, ReferenceId(*b"GPS\0"));
        assert_eq!(h.reference_timestamp.seconds(), 0x1100_0000);
        assert_eq!(h.origin_timestamp.seconds(), 0x2200_0000);
        assert_eq!(h.receive_timestamp.seconds(), 0x3300_0000);
        let tx = h.transmit_timestamp.unwrap();
        assert_eq!(tx.seconds(), 0x4400_0000);
        assert_eq!(tx.fraction(), 0x55);

        assert_eq!(h.encode(), buf);
    }

    #[test]
    fn test_encode_fills_transmit_with_now() {
        let header = Header {
            transmit_timestamp: None,
            ..Header::default()
        };
        let before = NtpTimestamp::now();
        let decoded = Header::decode(&header.encode()).unwrap();
        let tx = decoded.transmit_timestamp.unwrap();
        assert!(tx >= before);
        assert!(tx.diff_secs(before) < 5.0);
    }

    #[test]
    fn test_kiss_of_death_reference_id() {
        let mut buf = [0u8; 48];
        buf[0] = 0b11_100_100;
        buf[12..16].copy_from_slice(b"RATE");
        let h = Header::decode(&buf).unwrap();
        assert_eq!(h.kiss_code(), Some(KissCode::Rate));
    }

    #[test]
    fn test_to_bytes_rejects_short_output() {
        let mut buf = [0u8; 40];
        assert!(matches!(
            Header::default().to_bytes(&mut buf),
            Err(ParseError::BufferTooShort { needed: 48, .. })
        ));
    }
}
